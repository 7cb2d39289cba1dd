//! Error types for livetail.
//!
//! All errors are strongly typed using thiserror, one enum per failure
//! family. This enables pattern matching on specific error conditions and
//! keeps the fatal/transient distinction explicit: configuration and
//! protocol errors stop the sequencer, source errors during tailing are
//! retried internally and never surface to callers.

use thiserror::Error;

use crate::oplog::entry::LogPosition;

/// Configuration errors detected at sequencer startup. Never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("log source is not a replicated log; tailing requires a replica set")]
    NotReplicated,

    #[error("includeCollections and excludeCollections cannot both be set")]
    ConflictingCollectionFilters,

    #[error("invalid namespace filter: {reason}")]
    InvalidNamespaceFilter {
        reason: String,
    },
}

/// I/O errors talking to the log source.
///
/// Fatal during the initial handshake; transient (logged and retried via
/// cursor restart) once tailing.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connection to log source failed: {message}")]
    Connection {
        message: String,
    },

    #[error("tailing cursor failed: {message}")]
    Cursor {
        message: String,
    },

    #[error("log source closed")]
    Closed,
}

/// Malformed or unrecognized log content.
///
/// Protocol errors halt the sequencer: silently skipping an unrecognized
/// mutation would desynchronize every dependent live query.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown command in log entry at {position}: {command}")]
    UnknownCommand {
        position: LogPosition,
        command: String,
    },
}

/// Lifecycle errors from the sequencer API surface.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("{call} called on a stopped oplog tailer")]
    Stopped {
        call: &'static str,
    },

    #[error("oplog tailer stopped while a catch-up request was outstanding")]
    CatchUpAborted,
}

/// Top-level error type for livetail.
#[derive(Debug, Error)]
pub enum LivetailError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("log source error: {0}")]
    Source(#[from] SourceError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("sequencer error: {0}")]
    Sequencer(#[from] SequencerError),

    #[error("internal error: {message}")]
    Internal {
        message: String,
    },
}

impl LivetailError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a startup configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a protocol error (the sequencer halted).
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Returns true if this error is transient for a tailing sequencer.
    ///
    /// Transient errors are retried internally via the idle-timeout restart
    /// policy; callers only ever see them from the handshake path, where
    /// they are fatal.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Source(SourceError::Connection { .. } | SourceError::Cursor { .. })
        )
    }
}

/// Result type alias for livetail operations.
pub type LivetailResult<T> = Result<T, LivetailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_names_both_filter_lists() {
        let err = ConfigError::ConflictingCollectionFilters;
        let msg = format!("{err}");
        assert!(msg.contains("includeCollections"));
        assert!(msg.contains("excludeCollections"));
    }

    #[test]
    fn protocol_error_display_includes_position_and_command() {
        let err = ProtocolError::UnknownCommand {
            position: LogPosition::from_parts(7, 3),
            command: r#"{"shardCollection":1}"#.to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("7.3"));
        assert!(msg.contains("shardCollection"));
    }

    #[test]
    fn sequencer_error_display_names_the_call() {
        let err = SequencerError::Stopped {
            call: "wait_until_caught_up",
        };
        assert!(format!("{err}").contains("wait_until_caught_up"));
    }

    #[test]
    fn livetail_error_classification() {
        let err: LivetailError = ConfigError::NotReplicated.into();
        assert!(err.is_config());
        assert!(!err.is_transient());

        let err: LivetailError = SourceError::Cursor {
            message: "reset by peer".to_string(),
        }
        .into();
        assert!(err.is_transient());
        assert!(!err.is_config());

        let err: LivetailError = ProtocolError::UnknownCommand {
            position: LogPosition::from_parts(1, 1),
            command: "{}".to_string(),
        }
        .into();
        assert!(err.is_protocol());
        assert!(!err.is_transient());
    }

    #[test]
    fn internal_error_carries_message() {
        let err = LivetailError::internal("unexpected state");
        assert!(format!("{err}").contains("unexpected state"));
    }
}
