//! Completion token handed to the processor with every dispatched message.

use std::rc::Weak;

use crate::message::{MessageId, ProcessingResult};
use crate::state::Shared;

/// Reports the terminal result of one dispatched message.
///
/// Each token is bound to exactly one in-progress item and is consumed by
/// `complete`, so a message cannot be completed twice through it. The token
/// may be used inside the processor call or kept and used later.
///
/// If the queue already completed the message (timeout or drain) or was
/// dropped, completing is a no-op.
#[must_use = "a message stays in progress until its completion is reported"]
pub struct Completion<M, R> {
    shared: Weak<Shared<M, R>>,
    key: u64,
    id: MessageId,
    reported: bool,
}

impl<M, R> Completion<M, R> {
    pub(crate) fn new(shared: Weak<Shared<M, R>>, key: u64, id: MessageId) -> Self {
        Self {
            shared,
            key,
            id,
            reported: false,
        }
    }

    /// Id of the message this token completes.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Report the terminal result.
    ///
    /// Returns true if the result reached the queue owner, false if the
    /// message had already been completed by the queue.
    pub fn complete(mut self, result: ProcessingResult, reason: Option<R>) -> bool {
        self.reported = true;

        let Some(shared) = self.shared.upgrade() else {
            tracing::debug!(message_id = %self.id, "Completion reported after queue was dropped");
            return false;
        };

        let delivered = shared.complete_in_progress(self.key, result, reason);
        if !delivered {
            tracing::debug!(
                message_id = %self.id,
                result = %result,
                "Completion reported for message no longer in progress"
            );
        }
        delivered
    }

    /// Report success.
    pub fn success(self) -> bool {
        self.complete(ProcessingResult::Success, None)
    }

    /// Report a failure that should not be retried.
    pub fn error(self, reason: R) -> bool {
        self.complete(ProcessingResult::Error, Some(reason))
    }

    /// Report a failure the owner may retry.
    pub fn retryable_error(self, reason: R) -> bool {
        self.complete(ProcessingResult::RetryableError, Some(reason))
    }
}

impl<M, R> std::fmt::Debug for Completion<M, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("id", &self.id)
            .field("reported", &self.reported)
            .finish()
    }
}

impl<M, R> Completion<M, R> {
    /// Whether the queue is alive and still waiting on this token.
    fn awaited(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let awaited = match shared.lists.try_borrow() {
            Ok(lists) => lists.in_progress.contains(self.key),
            Err(_) => false,
        };
        awaited
    }
}

impl<M, R> Drop for Completion<M, R> {
    fn drop(&mut self) {
        if !self.reported && self.awaited() {
            tracing::warn!(
                message_id = %self.id,
                "Completion dropped without a result, message stays in progress until timeout or drain"
            );
        }
    }
}
