use std::fmt;
use std::result;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::Diagnostic;

/// How bad a failure is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ignorable,
    Recoverable,
    Fatal,
}

impl Severity {
    fn rank(self) -> u8 {
        match self {
            Severity::Ignorable => 1,
            Severity::Recoverable => 2,
            Severity::Fatal => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Ignorable => "ignorable",
            Severity::Recoverable => "recoverable",
            Severity::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

/// Error-tolerance threshold of a request.
///
/// A failure is raised when its severity is at or above the threshold and
/// swallowed into a null result otherwise. `Everything` raises all failures,
/// `Nothing` swallows all of them (best-effort rendering).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorThreshold {
    #[default]
    Everything,
    Ignorable,
    Recoverable,
    Fatal,
    Nothing,
}

impl ErrorThreshold {
    fn rank(self) -> u8 {
        match self {
            ErrorThreshold::Everything => 0,
            ErrorThreshold::Ignorable => 1,
            ErrorThreshold::Recoverable => 2,
            ErrorThreshold::Fatal => 3,
            ErrorThreshold::Nothing => 4,
        }
    }

    pub fn raises(self, severity: Severity) -> bool {
        severity.rank() >= self.rank()
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "everything" | "all" => Some(ErrorThreshold::Everything),
            "ignorable" => Some(ErrorThreshold::Ignorable),
            "recoverable" => Some(ErrorThreshold::Recoverable),
            "fatal" => Some(ErrorThreshold::Fatal),
            "nothing" | "none" => Some(ErrorThreshold::Nothing),
            _ => None,
        }
    }
}

/// Classification carried by every redirection crossing the core boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Undefined,
    AbstractConstruction,
    NoMatchingOverload,
    WrongArguments,
    HostCall,
    AliasCycle,
    RecursionLimit,
    Operator,
    Link,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Undefined => "undefined",
            ErrorCode::AbstractConstruction => "abstract",
            ErrorCode::NoMatchingOverload => "no-overload",
            ErrorCode::WrongArguments => "wrong-arguments",
            ErrorCode::HostCall => "host-call",
            ErrorCode::AliasCycle => "alias-cycle",
            ErrorCode::RecursionLimit => "recursion-limit",
            ErrorCode::Operator => "operator",
            ErrorCode::Link => "link",
            ErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
}

impl Redirection {
    pub fn new(severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Redirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}] {}", self.severity, self.code, self.message)
    }
}

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("{0}")]
    Redirection(Redirection),
    #[error("Stack discipline violated: {0}")]
    StackDiscipline(String),
    #[error("Diagnostic: {0}")]
    Diagnostic(Box<Diagnostic>),
    #[error("Generic error: {0}")]
    Generic(String),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub fn redirection(severity: Severity, code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Redirection(Redirection::new(severity, code, message))
    }

    pub fn undefined(name: impl fmt::Display) -> Self {
        Self::redirection(
            Severity::Ignorable,
            ErrorCode::Undefined,
            format!("undefined: {}", name),
        )
    }

    pub fn abstract_construction(name: impl fmt::Display) -> Self {
        Self::redirection(
            Severity::Fatal,
            ErrorCode::AbstractConstruction,
            format!("cannot construct abstract definition {}", name),
        )
    }

    pub fn no_matching_overload(name: impl fmt::Display, arity: usize) -> Self {
        Self::redirection(
            Severity::Ignorable,
            ErrorCode::NoMatchingOverload,
            format!("no member {} accepts {} argument(s)", name, arity),
        )
    }

    pub fn wrong_arguments(name: impl fmt::Display, detail: impl fmt::Display) -> Self {
        Self::redirection(
            Severity::Recoverable,
            ErrorCode::WrongArguments,
            format!("{}: {}", name, detail),
        )
    }

    pub fn host_call(message: impl Into<String>) -> Self {
        Self::redirection(Severity::Recoverable, ErrorCode::HostCall, message)
    }

    pub fn operator(message: impl Into<String>) -> Self {
        Self::redirection(Severity::Recoverable, ErrorCode::Operator, message)
    }

    pub fn stack(message: impl Into<String>) -> Self {
        Error::StackDiscipline(message.into())
    }

    pub fn diagnostic(diagnostic: Diagnostic) -> Self {
        Error::Diagnostic(Box::new(diagnostic))
    }

    pub fn severity(&self) -> Severity {
        match self {
            Error::Redirection(redirection) => redirection.severity,
            Error::StackDiscipline(_) => Severity::Fatal,
            Error::Diagnostic(_) | Error::Generic(_) => Severity::Fatal,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Redirection(redirection) => redirection.code,
            Error::StackDiscipline(_) | Error::Generic(_) => ErrorCode::Internal,
            Error::Diagnostic(_) => ErrorCode::Link,
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.code() == ErrorCode::Undefined || self.code() == ErrorCode::NoMatchingOverload
    }

    /// Internal invariant failures are never subject to the error threshold.
    pub fn is_suppressible(&self) -> bool {
        matches!(self, Error::Redirection(_))
    }
}

// Convert from eyre::Report to our Error type
impl From<eyre::Report> for Error {
    fn from(err: eyre::Report) -> Self {
        match err.downcast::<Error>() {
            Ok(core) => core,
            Err(report) => Error::Generic(report.to_string()),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Generic(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_at_ignorable_raises_unresolved_references() {
        assert!(ErrorThreshold::Everything.raises(Severity::Ignorable));
        assert!(ErrorThreshold::Ignorable.raises(Severity::Ignorable));
        assert!(!ErrorThreshold::Recoverable.raises(Severity::Ignorable));
    }

    #[test]
    fn only_nothing_swallows_fatal_errors() {
        assert!(ErrorThreshold::Fatal.raises(Severity::Fatal));
        assert!(!ErrorThreshold::Nothing.raises(Severity::Fatal));
    }

    #[test]
    fn eyre_reports_wrapping_core_errors_pass_through() {
        let report = eyre::Report::new(Error::undefined("x"));
        let err = Error::from(report);
        assert_eq!(err.code(), ErrorCode::Undefined);
    }
}
