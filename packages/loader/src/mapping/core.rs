//! Rule registry mapping element paths to rules.

use std::collections::HashMap;

use super::rules::Rule;

/// Registry of rules keyed by element path.
///
/// Paths are slash-joined local element names starting at the document
/// root. A pattern starting with `*/` matches any path ending in the rest of
/// the pattern. Exact patterns win over wildcards and the longest wildcard
/// wins among wildcards.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    exact: HashMap<String, Vec<Rule>>,
    wildcards: Vec<(String, Vec<Rule>)>,
}

impl RuleRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `rule` to the rules of `pattern`.
    pub fn add(&mut self, pattern: &str, rule: Rule) {
        match pattern.strip_prefix("*/") {
            Some(suffix) => {
                match self.wildcards.iter_mut().find(|(s, _)| s == suffix) {
                    Some((_, rules)) => rules.push(rule),
                    None => self.wildcards.push((suffix.to_string(), vec![rule])),
                }
            }
            None => self.exact.entry(pattern.to_string()).or_default().push(rule),
        }
    }

    /// Append several rules to `pattern`, keeping their order.
    pub fn add_all(&mut self, pattern: &str, rules: impl IntoIterator<Item = Rule>) {
        for rule in rules {
            self.add(pattern, rule);
        }
    }

    /// Rules bound to `path`, in registration order.
    #[must_use]
    pub fn rules_for(&self, path: &str) -> &[Rule] {
        if let Some(rules) = self.exact.get(path) {
            return rules;
        }

        self.wildcards
            .iter()
            .filter(|(suffix, _)| {
                path == suffix
                    || path
                        .strip_suffix(suffix.as_str())
                        .is_some_and(|head| head.ends_with('/'))
            })
            .max_by_key(|(suffix, _)| suffix.len())
            .map(|(_, rules)| rules.as_slice())
            .unwrap_or(&[])
    }

    /// Number of registered patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exact.len() + self.wildcards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::AttachTarget;

    #[test]
    fn test_exact_match_in_order() {
        let mut registry = RuleRegistry::new();
        registry.add("a/b", Rule::property("first"));
        registry.add("a/b", Rule::property("second"));

        assert_eq!(
            registry.rules_for("a/b"),
            &[Rule::property("first"), Rule::property("second")]
        );
        assert!(registry.rules_for("a").is_empty());
    }

    #[test]
    fn test_wildcard_matches_suffix_on_segment_boundary() {
        let mut registry = RuleRegistry::new();
        registry.add("*/base-calendar", Rule::Attach(AttachTarget::SetBaseCalendar));

        assert_eq!(registry.rules_for("root/calendar/base-calendar").len(), 1);
        assert_eq!(registry.rules_for("base-calendar").len(), 1);
        assert!(registry.rules_for("root/my-base-calendar").is_empty());
    }

    #[test]
    fn test_exact_beats_wildcard_and_longest_wildcard_wins() {
        let mut registry = RuleRegistry::new();
        registry.add("*/name", Rule::property("short"));
        registry.add("*/base-calendar/name", Rule::property("long"));
        registry.add("root/job/name", Rule::property("exact"));

        assert_eq!(registry.rules_for("root/job/name"), &[Rule::property("exact")]);
        assert_eq!(
            registry.rules_for("root/calendar/base-calendar/name"),
            &[Rule::property("long")]
        );
        assert_eq!(registry.rules_for("root/other/name"), &[Rule::property("short")]);
        assert_eq!(registry.len(), 3);
    }
}
