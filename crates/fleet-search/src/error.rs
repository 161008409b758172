//! Error types for fleet searches.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while preparing or running a search.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The requested time range exceeds the allowed maximum.
    #[error("time range, {range}, is too large (>{max})")]
    InvalidWindow {
        /// Human-readable requested range.
        range: String,
        /// Human-readable maximum range.
        max: String,
    },

    /// No filters were given, which would match every record in the fleet.
    #[error("no filters provided to search")]
    NoFilters,

    /// A source selector named a source that is not in the catalog.
    #[error("unknown log source: \"{0}\"")]
    UnknownLogSource(String),

    /// A log source definition violates a catalog invariant.
    #[error("invalid log source \"{name}\": {reason}")]
    InvalidSource {
        /// Name of the offending source.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Two catalog entries share a name.
    #[error("duplicate log source: \"{0}\"")]
    DuplicateSource(String),

    /// Rotated files were requested for a source that does not rotate hourly.
    #[error("log source \"{source_name}\" has unsupported rotation \"{rotation}\"")]
    UnsupportedRotation {
        /// Name of the source.
        source_name: String,
        /// The rotation policy tag it carries.
        rotation: String,
    },

    /// A filter used an operator the compiler does not know.
    #[error("unknown filter operator \"{op}\" for field \"{field}\"")]
    UnknownOperator {
        /// Filter field.
        field: String,
        /// The unrecognized operator.
        op: String,
    },

    /// A filter value has a type the compiler cannot turn into a pattern.
    #[error("unsupported value for filter field \"{field}\": {detail}")]
    UnsupportedValueType {
        /// Filter field.
        field: String,
        /// Description of the offending value.
        detail: String,
    },

    /// The start time could not be parsed.
    #[error("invalid time \"{0}\": expected a duration (e.g. 1h) or a date")]
    InvalidTime(String),

    /// The remote execution transport failed.
    #[error("remote execution on host \"{host}\" failed: {message}")]
    RemoteExecution {
        /// Target host id.
        host: String,
        /// Transport diagnostic.
        message: String,
    },

    /// The remote script ran but exited non-zero.
    #[error("error running search on host \"{host}\" (exit status {status}): {stderr}")]
    RemoteExit {
        /// Target host id.
        host: String,
        /// Remote exit status.
        status: i32,
        /// Remote standard error.
        stderr: String,
    },

    /// A remote execution did not complete within its timeout.
    #[error("search on host \"{host}\" timed out after {timeout:?}")]
    ExecutionTimeout {
        /// Target host id.
        host: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The local search pipeline could not be started.
    #[error("local search failed: {0}")]
    LocalExecution(#[source] std::io::Error),

    /// A search hit is not a structured record. Logged and skipped, never propagated.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A record could not be rendered.
    #[error("render error: {0}")]
    Render(String),

    /// A fan-out worker panicked or was cancelled.
    #[error("search worker failed: {0}")]
    Worker(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred while writing output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// Returns true if this error came from executing a search target.
    #[must_use]
    pub const fn is_execution_error(&self) -> bool {
        matches!(
            self,
            Self::RemoteExecution { .. }
                | Self::RemoteExit { .. }
                | Self::ExecutionTimeout { .. }
                | Self::LocalExecution(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = SearchError::NoFilters;
        assert_eq!(err.to_string(), "no filters provided to search");

        let err = SearchError::UnknownLogSource("bogus".to_string());
        assert_eq!(err.to_string(), "unknown log source: \"bogus\"");

        let err = SearchError::InvalidWindow {
            range: "8d".to_string(),
            max: "7d".to_string(),
        };
        assert_eq!(err.to_string(), "time range, 8d, is too large (>7d)");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchError>();
    }

    #[test]
    fn remote_exit_includes_stderr() {
        let err = SearchError::RemoteExit {
            host: "cn-1".to_string(),
            status: 1,
            stderr: "bash: egrep: not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("cn-1"));
        assert!(msg.contains("exit status 1"));
        assert!(msg.contains("egrep: not found"));
    }

    #[test]
    fn execution_errors_are_classified() {
        let timeout = SearchError::ExecutionTimeout {
            host: "cn-2".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert!(timeout.is_execution_error());
        assert!(timeout.to_string().contains("30s"));

        assert!(!SearchError::NoFilters.is_execution_error());
        assert!(!SearchError::MalformedRecord("x".into()).is_execution_error());
    }

    #[test]
    fn error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: SearchError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn error_debug_format_all_variants() {
        let errors = vec![
            SearchError::NoFilters,
            SearchError::UnknownLogSource("x".into()),
            SearchError::DuplicateSource("x".into()),
            SearchError::InvalidTime("yesterday".into()),
            SearchError::Render("x".into()),
            SearchError::Worker("x".into()),
        ];

        for err in errors {
            let debug = format!("{err:?}");
            assert!(!debug.is_empty());
        }
    }
}
