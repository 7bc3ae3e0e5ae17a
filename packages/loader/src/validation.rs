//! Collection of validation problems reported during one parse call.
//!
//! Problems never abort the walk. The loader inspects the collected list
//! after the walk and turns a non-empty list into a single
//! [`ValidationErrors`] carrying every problem.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Severity of a validation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Reserved for callers that record their own problems. Neither the
    /// validator nor the mapping engine emits warnings.
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

/// One problem found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationProblem {
    pub severity: Severity,
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub system_id: Option<String>,
}

impl ValidationProblem {
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            line: None,
            column: None,
            system_id: None,
        }
    }

    /// Attach a document position.
    #[must_use]
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Attach the system id of the document the problem was found in.
    #[must_use]
    pub fn in_document(mut self, system_id: Option<&str>) -> Self {
        self.system_id = system_id.map(str::to_string);
        self
    }
}

impl fmt::Display for ValidationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.severity)?;
        if let Some(system_id) = &self.system_id {
            write!(f, "{system_id}:")?;
        }
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{line}:{column}: ")?,
            (Some(line), None) => write!(f, "{line}: ")?,
            _ if self.system_id.is_some() => f.write_str(" ")?,
            _ => {}
        }
        f.write_str(&self.message)
    }
}

/// Per-call list of validation problems.
#[derive(Debug, Clone, Default)]
pub struct ValidationProblems {
    problems: Vec<ValidationProblem>,
    system_id: Option<String>,
}

impl ValidationProblems {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every recorded problem and start a new document.
    pub fn reset(&mut self, system_id: Option<&str>) {
        self.problems.clear();
        self.system_id = system_id.map(str::to_string);
    }

    /// System id of the document currently being parsed.
    #[must_use]
    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    /// Record a problem, stamping it with the current document's system id
    /// unless it already names one.
    pub fn push(&mut self, mut problem: ValidationProblem) {
        if problem.system_id.is_none() {
            problem.system_id.clone_from(&self.system_id);
        }
        tracing::debug!(
            severity = %problem.severity,
            line = problem.line,
            column = problem.column,
            message = %problem.message,
            "Validation problem"
        );
        self.problems.push(problem);
    }

    /// Record a warning. Warnings fail the call like any other problem.
    pub fn warning(&mut self, message: impl Into<String>, position: Option<(u32, u32)>) {
        self.push(positioned(Severity::Warning, message, position));
    }

    pub fn error(&mut self, message: impl Into<String>, position: Option<(u32, u32)>) {
        self.push(positioned(Severity::Error, message, position));
    }

    pub fn fatal(&mut self, message: impl Into<String>, position: Option<(u32, u32)>) {
        self.push(positioned(Severity::Fatal, message, position));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.problems.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ValidationProblem] {
        &self.problems
    }

    /// The aggregate failure for the recorded problems, if there are any.
    #[must_use]
    pub fn to_error(&self) -> Option<ValidationErrors> {
        if self.problems.is_empty() {
            None
        } else {
            Some(ValidationErrors {
                problems: self.problems.clone(),
            })
        }
    }
}

fn positioned(
    severity: Severity,
    message: impl Into<String>,
    position: Option<(u32, u32)>,
) -> ValidationProblem {
    let problem = ValidationProblem::new(severity, message);
    match position {
        Some((line, column)) => problem.at(line, column),
        None => problem,
    }
}

/// A parse call that recorded one or more validation problems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationErrors {
    problems: Vec<ValidationProblem>,
}

impl ValidationErrors {
    /// Every problem recorded during the failed call, in report order.
    #[must_use]
    pub fn problems(&self) -> &[ValidationProblem] {
        &self.problems
    }

    /// Highest severity among the problems.
    #[must_use]
    pub fn max_severity(&self) -> Option<Severity> {
        self.problems.iter().map(|p| p.severity).max()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Encountered {} validation problem(s)",
            self.problems.len()
        )?;
        for problem in &self.problems {
            write!(f, "\n  {problem}")?;
        }
        Ok(())
    }
}
