//! Message identity and terminal results.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier assigned to every admitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Generate a new random MessageId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The terminal result of a message. Exactly one is delivered per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingResult {
    /// The processor handled the message.
    Success,
    /// Processing failed and should not be retried, or the queue failed to
    /// track the message.
    Error,
    /// Processing failed; the owner may resubmit the message.
    RetryableError,
    /// A deadline expired before the processor reported a result.
    Timeout,
    /// The queue was drained before the processor reported a result.
    Cancelled,
}

impl ProcessingResult {
    /// Whether the processor itself produced this result, as opposed to the
    /// queue completing the message on its behalf.
    pub fn is_from_processor(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::RetryableError)
    }
}

impl std::fmt::Display for ProcessingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::RetryableError => "retryable_error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Terminal notification handed to the queue owner.
///
/// The message comes back to the owner here; the queue never inspects it.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed<M, R> {
    /// Id returned by `enqueue`.
    pub id: MessageId,
    /// The message as it was enqueued.
    pub message: M,
    /// The terminal result.
    pub result: ProcessingResult,
    /// Processor-supplied detail. Always `None` for timeouts and cancellations.
    pub reason: Option<R>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_uniqueness() {
        let id1 = MessageId::new();
        let id2 = MessageId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_message_id_display() {
        let id = MessageId::new();
        let display = format!("{}", id);
        // UUID v4 format: 8-4-4-4-12 hex characters
        assert_eq!(display.len(), 36);
        assert_eq!(display.chars().filter(|c| *c == '-').count(), 4);
    }

    #[test]
    fn test_message_id_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let id = MessageId::default();
        set.insert(id);
        assert!(set.contains(&id));
    }

    #[test]
    fn test_processing_result_serialization() {
        let json = serde_json::to_string(&ProcessingResult::RetryableError).unwrap();
        assert_eq!(json, "\"RetryableError\"");

        let parsed: ProcessingResult = serde_json::from_str("\"Cancelled\"").unwrap();
        assert_eq!(parsed, ProcessingResult::Cancelled);
    }

    #[test]
    fn test_processing_result_display() {
        assert_eq!(ProcessingResult::Success.to_string(), "success");
        assert_eq!(ProcessingResult::RetryableError.to_string(), "retryable_error");
        assert_eq!(ProcessingResult::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_processing_result_origin() {
        assert!(ProcessingResult::Success.is_from_processor());
        assert!(ProcessingResult::Error.is_from_processor());
        assert!(ProcessingResult::RetryableError.is_from_processor());
        assert!(!ProcessingResult::Timeout.is_from_processor());
        assert!(!ProcessingResult::Cancelled.is_from_processor());
    }
}
