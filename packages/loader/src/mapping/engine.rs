//! Mapping engine that walks a document and runs the registered rules.

use roxmltree::{Document, Node};

use super::core::RuleRegistry;
use super::rules::{AttachTarget, Method, Rule};
use super::stack::{DocumentSettings, Frame, PropertyError};
use crate::convert::Converters;
use crate::error::{LoaderError, Result};
use crate::model::{BundleRegistry, JobBundle, MISFIRE_INSTRUCTION_SMART_POLICY};
use crate::scheduler::CalendarSink;
use crate::validation::ValidationProblems;
use crate::xml::{direct_text, element_children, get_tag_name, text_position};

/// Collaborators a mapping walk writes into.
pub struct MappingContext<'a> {
    pub converters: &'a Converters,
    pub problems: &'a mut ValidationProblems,
    pub registry: &'a mut BundleRegistry,
    pub calendars: &'a mut dyn CalendarSink,
}

/// Engine that maps a document onto jobs, triggers and calendars.
///
/// Frames are pushed and popped on an explicit construction stack as the
/// rules bound to each element path fire. The stack starts with the document
/// frame, whose settings are returned when the walk completes.
#[derive(Debug)]
pub struct MappingEngine {
    rules: RuleRegistry,
}

impl MappingEngine {
    #[must_use]
    pub fn new(rules: RuleRegistry) -> Self {
        Self { rules }
    }

    /// Walk `doc`, sending completed jobs to the registry and completed
    /// top-level calendars to the calendar sink.
    ///
    /// # Errors
    /// Conversion, property and stack failures abort the walk. Unknown
    /// misfire instructions are recorded as validation problems instead.
    /// Jobs without a job detail are skipped.
    pub fn run(&self, doc: &Document<'_>, context: &mut MappingContext<'_>) -> Result<DocumentSettings> {
        let mut walk = Walk {
            rules: &self.rules,
            context,
            stack: vec![Frame::Root(DocumentSettings::default())],
            params: Vec::new(),
            path: Vec::new(),
        };
        walk.visit(doc.root_element())?;

        match walk.stack.pop() {
            Some(Frame::Root(settings)) if walk.stack.is_empty() => Ok(settings),
            other => Err(LoaderError::UnexpectedFrame {
                path: get_tag_name(doc.root_element()).to_string(),
                action: "finish document",
                found: other.as_ref().map_or("empty stack", Frame::describe),
            }),
        }
    }
}

struct Walk<'r, 'c, 'a> {
    rules: &'r RuleRegistry,
    context: &'c mut MappingContext<'a>,
    stack: Vec<Frame>,
    params: Vec<Vec<Option<String>>>,
    path: Vec<String>,
}

impl Walk<'_, '_, '_> {
    fn visit(&mut self, node: Node<'_, '_>) -> Result<()> {
        self.path.push(get_tag_name(node).to_string());
        let path = self.path.join("/");
        let registry = self.rules;
        let rules = registry.rules_for(&path);

        if rules.is_empty() {
            tracing::trace!(path = %path, "No rules for element");
        }

        // Depth of the frame pushed by this element's Create rule
        let mut created = None;

        for rule in rules {
            match rule {
                Rule::Create(kind) => {
                    self.stack.push(Frame::new(*kind));
                    created = Some(self.stack.len());
                }
                Rule::SetProperties { aliases } => self.set_attributes(node, &path, aliases)?,
                Rule::CallMethod { params, .. } => self.params.push(vec![None; *params]),
                _ => {}
            }
        }

        for child in element_children(node) {
            self.visit(child)?;
        }

        if rules.iter().any(Rule::uses_text) {
            let text = direct_text(node);
            for rule in rules {
                match rule {
                    Rule::SetProperty(property) => self.set_text(&path, property, &text)?,
                    Rule::CallParam(index) => self.capture_param(&path, *index, text.clone())?,
                    Rule::MisfireInstruction => self.set_misfire(node, &path, &text)?,
                    _ => {}
                }
            }
        }

        for rule in rules.iter().rev() {
            match rule {
                Rule::CallMethod { method, params } => self.call(&path, *method, *params)?,
                Rule::Attach(target) => self.attach(node, &path, *target)?,
                Rule::Create(_) => {
                    if created.is_some_and(|depth| self.stack.len() == depth) {
                        let dropped = self.stack.pop();
                        tracing::trace!(
                            path = %path,
                            frame = dropped.as_ref().map_or("none", Frame::describe),
                            "Dropping unattached frame"
                        );
                    }
                }
                _ => {}
            }
        }

        self.path.pop();
        Ok(())
    }

    fn top(&mut self, path: &str, action: &'static str) -> Result<&mut Frame> {
        self.stack.last_mut().ok_or_else(|| LoaderError::UnexpectedFrame {
            path: path.to_string(),
            action,
            found: "empty stack",
        })
    }

    fn set_attributes(
        &mut self,
        node: Node<'_, '_>,
        path: &str,
        aliases: &[(String, String)],
    ) -> Result<()> {
        let converters = self.context.converters;
        for attribute in node.attributes() {
            if attribute.namespace().is_some() {
                continue;
            }
            let name = attribute.name();
            let property = aliases
                .iter()
                .find(|(alias, _)| alias == name)
                .map_or(name, |(_, property)| property.as_str());

            let frame = self.top(path, "set properties")?;
            let applied = frame
                .set(property, attribute.value(), converters)
                .map_err(|source| property_error(path, property, source))?;
            if !applied {
                tracing::trace!(path = %path, attribute = %name, "Ignoring attribute without property");
            }
        }
        Ok(())
    }

    fn set_text(&mut self, path: &str, property: &str, text: &str) -> Result<()> {
        let converters = self.context.converters;
        let frame = self.top(path, "set property")?;
        let applied = frame
            .set(property, text, converters)
            .map_err(|source| property_error(path, property, source))?;
        if applied {
            Ok(())
        } else {
            Err(LoaderError::UnknownProperty {
                path: path.to_string(),
                property: property.to_string(),
                target: frame.describe(),
            })
        }
    }

    fn capture_param(&mut self, path: &str, index: usize, text: String) -> Result<()> {
        let slot = self
            .params
            .last_mut()
            .and_then(|params| params.get_mut(index))
            .ok_or_else(|| LoaderError::UnexpectedFrame {
                path: path.to_string(),
                action: "capture parameter",
                found: "no pending call",
            })?;
        *slot = Some(text);
        Ok(())
    }

    fn set_misfire(&mut self, node: Node<'_, '_>, path: &str, name: &str) -> Result<()> {
        let trigger = match self.stack.last_mut() {
            Some(Frame::Trigger(trigger)) => trigger,
            other => {
                return Err(LoaderError::UnexpectedFrame {
                    path: path.to_string(),
                    action: "set misfire instruction",
                    found: other.map_or("empty stack", |frame| frame.describe()),
                });
            }
        };

        let kind = trigger.kind();
        match kind.resolve_misfire(name) {
            Some(code) => trigger.misfire_instruction = code,
            None => {
                trigger.misfire_instruction = MISFIRE_INSTRUCTION_SMART_POLICY;
                self.context.problems.error(
                    format!(
                        "Unknown misfire instruction '{name}' for {} trigger",
                        kind.as_str()
                    ),
                    Some(text_position(node)),
                );
            }
        }
        Ok(())
    }

    fn call(&mut self, path: &str, method: Method, count: usize) -> Result<()> {
        let params = self.params.pop().unwrap_or_default();
        let mut args = Vec::with_capacity(count);
        for index in 0..count {
            let arg = params.get(index).cloned().flatten().ok_or_else(|| {
                LoaderError::MissingParameter {
                    path: path.to_string(),
                    method: method.name(),
                    index,
                }
            })?;
            args.push(arg);
        }

        match (method, self.top(path, method.name())?) {
            (Method::Put, Frame::DataMap(map)) => {
                let mut args = args.into_iter();
                if let (Some(key), Some(value)) = (args.next(), args.next()) {
                    map.put(key, value);
                }
                Ok(())
            }
            (_, frame) => Err(LoaderError::UnexpectedFrame {
                path: path.to_string(),
                action: method.name(),
                found: frame.describe(),
            }),
        }
    }

    fn attach(&mut self, node: Node<'_, '_>, path: &str, target: AttachTarget) -> Result<()> {
        let unexpected = |found: &'static str| LoaderError::UnexpectedFrame {
            path: path.to_string(),
            action: target.action(),
            found,
        };

        let child = self.stack.pop().ok_or_else(|| unexpected("empty stack"))?;
        let Some(parent) = self.stack.last_mut() else {
            return Err(unexpected("empty stack"));
        };
        let context = &mut *self.context;

        match (target, child, parent) {
            (AttachTarget::SetJobDataMap, Frame::DataMap(map), Frame::JobDetail(detail)) => {
                detail.job_data_map = map;
            }
            (AttachTarget::SetJobDetail, Frame::JobDetail(detail), Frame::Job(bundle)) => {
                bundle.job_detail = Some(detail);
            }
            (AttachTarget::AddTrigger, Frame::Trigger(trigger), Frame::Job(bundle)) => {
                bundle.triggers.push(trigger);
            }
            (AttachTarget::SetBaseCalendar, Frame::Calendar(base), Frame::Calendar(calendar)) => {
                calendar.base = Some(Box::new(base));
            }
            (AttachTarget::AddCalendar, Frame::Calendar(calendar), Frame::Root(_)) => {
                tracing::debug!(calendar = %calendar.calendar_name, "Parsed calendar");
                context.calendars.add_calendar(calendar)?;
            }
            (AttachTarget::ScheduleJob, Frame::Job(bundle), Frame::Root(_)) => {
                schedule(context, node, bundle);
            }
            (_, child, parent) => {
                let found = if child.describe() == target.child() {
                    parent.describe()
                } else {
                    child.describe()
                };
                return Err(unexpected(found));
            }
        }
        Ok(())
    }
}

fn schedule(context: &mut MappingContext<'_>, node: Node<'_, '_>, bundle: JobBundle) {
    match context.registry.add(bundle) {
        Ok(None) => {}
        Ok(Some(replaced)) => {
            tracing::debug!(
                job = %replaced.full_name().unwrap_or_default(),
                "Later job definition replaces earlier one"
            );
        }
        Err(_) => {
            let (line, column) = text_position(node);
            tracing::debug!(line, column, "Skipping job without job detail");
        }
    }
}

fn property_error(path: &str, property: &str, source: PropertyError) -> LoaderError {
    match source {
        PropertyError::Conversion(source) => LoaderError::Conversion {
            path: path.to_string(),
            property: property.to_string(),
            source,
        },
        source => LoaderError::Property {
            path: path.to_string(),
            property: property.to_string(),
            source,
        },
    }
}
