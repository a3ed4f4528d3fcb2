use std::fmt;

use mw_core::diagnostics::report_error;
use mw_core::error::{Error, ErrorCode, Severity};

/// Create a simple interpretation error
pub fn interpretation_error(message: impl Into<String>) -> Error {
    report_error(message)
}

/// Create an interpretation error carrying a classification code
pub fn interpretation_error_with_code(
    message: impl Into<String>,
    severity: Severity,
    code: ErrorCode,
) -> Error {
    Error::redirection(severity, code, message)
}

pub fn recursion_limit(depth: usize, what: impl fmt::Display) -> Error {
    Error::redirection(
        Severity::Fatal,
        ErrorCode::RecursionLimit,
        format!("context depth {} exceeded while constructing {}", depth, what),
    )
}

/// Convert a failure raised by host code. A core error wrapped in the report
/// passes through unchanged; anything else becomes a host-call redirection
/// carrying the root cause.
pub fn host_failure(report: eyre::Report) -> Error {
    match report.downcast::<Error>() {
        Ok(core) => core,
        Err(report) => Error::host_call(report.root_cause().to_string()),
    }
}

// Convenience macros for generating interpretation errors

/// Macro to return early with an interpretation error
#[macro_export]
macro_rules! interp_bail {
    ($message:expr) => {
        return Err($crate::error::interpretation_error($message))
    };
    ($message:expr, $severity:expr, $code:expr) => {
        return Err($crate::error::interpretation_error_with_code(
            $message, $severity, $code,
        ))
    };
}

/// Macro to ensure a condition is true, or return an interpretation error
#[macro_export]
macro_rules! interp_ensure {
    ($cond:expr, $message:expr) => {
        if !($cond) {
            $crate::interp_bail!($message);
        }
    };
    ($cond:expr, $message:expr, $severity:expr, $code:expr) => {
        if !($cond) {
            $crate::interp_bail!($message, $severity, $code);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Disk;

    impl fmt::Display for Disk {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("disk full")
        }
    }

    impl std::error::Error for Disk {}

    #[test]
    fn host_failures_report_the_root_cause() {
        let report = eyre::Report::new(Disk).wrap_err("while saving");
        let err = host_failure(report);
        assert_eq!(err.code(), ErrorCode::HostCall);
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn core_errors_pass_through_host_calls() {
        let err = host_failure(eyre::Report::new(Error::abstract_construction("Shape")));
        assert_eq!(err.code(), ErrorCode::AbstractConstruction);
        assert_eq!(err.severity(), Severity::Fatal);
    }
}
