//! Error types for the msgqueue library.

use thiserror::Error;

/// The main error type for the msgqueue library.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The clock could not produce a timestamp.
    #[error("Clock error: {0}")]
    Clock(String),
}

/// Result type alias using QueueError.
pub type Result<T> = std::result::Result<T, QueueError>;

/// A message the queue refused to admit.
///
/// Ownership of the message goes back to the caller, who may resubmit or
/// discard it. No completion notification fires for a rejected message.
#[derive(Error)]
#[error("Message rejected: {error}")]
pub struct Rejected<M> {
    /// The message that was not admitted.
    pub message: M,
    /// Why admission failed.
    #[source]
    pub error: QueueError,
}

impl<M> Rejected<M> {
    pub(crate) fn new(message: M, error: QueueError) -> Self {
        Self { message, error }
    }

    /// Take the message back.
    pub fn into_message(self) -> M {
        self.message
    }
}

impl<M> std::fmt::Debug for Rejected<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display_config() {
        let err = QueueError::Config("processor is required".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: processor is required"
        );
    }

    #[test]
    fn test_error_display_clock() {
        let err = QueueError::Clock("clock unavailable".to_string());
        assert_eq!(format!("{}", err), "Clock error: clock unavailable");
    }

    #[test]
    fn test_rejected_display_and_source() {
        let rejected = Rejected::new("payload", QueueError::Clock("boom".to_string()));
        assert_eq!(format!("{}", rejected), "Message rejected: Clock error: boom");

        let source = rejected.source().unwrap();
        assert_eq!(source.to_string(), "Clock error: boom");
    }

    #[test]
    fn test_rejected_returns_message() {
        // Messages do not need Debug to be carried in an error.
        struct Opaque(u32);

        let rejected = Rejected::new(Opaque(7), QueueError::Clock("boom".to_string()));
        let debug = format!("{:?}", rejected);
        assert!(debug.contains("Rejected"));
        assert!(debug.contains("Clock"));
        assert_eq!(rejected.into_message().0, 7);
    }
}
