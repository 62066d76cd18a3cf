//! The queue engine: admission, timeout sweeps, dispatch and drain.

use std::rc::Rc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::completion::Completion;
use crate::config::{QueueConfig, QueueOptions};
use crate::error::{QueueError, Rejected, Result};
use crate::message::{Completed, MessageId, ProcessingResult};
use crate::state::{Notifier, QueueItem, Shared, Stamp};

/// Backend that consumes dispatched messages.
///
/// Called once per message. The backend reports the outcome through the
/// completion token, either before returning or at any later point.
pub trait Processor<M, R> {
    /// Start processing `message`.
    fn process(&mut self, message: M, completion: Completion<M, R>);
}

impl<M, R, F> Processor<M, R> for F
where
    F: FnMut(M, Completion<M, R>),
{
    fn process(&mut self, message: M, completion: Completion<M, R>) {
        self(message, completion)
    }
}

/// Builder for MessageQueue.
pub struct MessageQueueBuilder<M, R> {
    config: QueueConfig,
    processor: Option<Box<dyn Processor<M, R>>>,
    notifier: Option<Notifier<M, R>>,
    clock: Option<Box<dyn Clock>>,
}

impl<M, R> Default for MessageQueueBuilder<M, R>
where
    M: Clone + 'static,
    R: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M, R> MessageQueueBuilder<M, R>
where
    M: Clone + 'static,
    R: 'static,
{
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
            processor: None,
            notifier: None,
            clock: None,
        }
    }

    /// Set the processing callback.
    pub fn processor<F>(mut self, processor: F) -> Self
    where
        F: FnMut(M, Completion<M, R>) + 'static,
    {
        self.processor = Some(Box::new(processor));
        self
    }

    /// Set a processing backend implementing [`Processor`].
    pub fn backend(mut self, backend: impl Processor<M, R> + 'static) -> Self {
        self.processor = Some(Box::new(backend));
        self
    }

    /// Set the callback that receives every terminal notification.
    pub fn on_completed<F>(mut self, callback: F) -> Self
    where
        F: FnMut(Completed<M, R>) + 'static,
    {
        self.notifier = Some(Box::new(callback));
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the overall processing timeout.
    pub fn processing_timeout(mut self, timeout: Duration) -> Self {
        self.config.processing_timeout = timeout;
        self
    }

    /// Set the maximum time a message may wait, counted from enqueue.
    pub fn max_enqueue_wait(mut self, wait: Duration) -> Self {
        self.config.options.max_enqueue_wait = Some(wait);
        self
    }

    /// Set the maximum time a message may spend with the processor.
    pub fn max_processing_duration(mut self, duration: Duration) -> Self {
        self.config.options.max_processing_duration = Some(duration);
        self
    }

    /// Use a custom clock.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Build the MessageQueue.
    pub fn build(self) -> Result<MessageQueue<M, R>> {
        let processor = self
            .processor
            .ok_or_else(|| QueueError::Config("Processor is required".to_string()))?;

        let clock = self.clock.unwrap_or_else(|| Box::new(SystemClock));

        Ok(MessageQueue::from_parts(
            self.config,
            processor,
            self.notifier,
            clock,
        ))
    }
}

/// In-process queue that tracks every admitted message until exactly one
/// terminal result has been delivered for it.
///
/// The queue has no thread or timer of its own; the owner calls
/// [`do_work`](Self::do_work) on a cadence matching the timeout granularity it
/// needs. It is `!Send`: a queue and its completion tokens stay on one thread.
pub struct MessageQueue<M, R = String> {
    shared: Rc<Shared<M, R>>,
    processor: Box<dyn Processor<M, R>>,
    clock: Box<dyn Clock>,
    processing_timeout: Duration,
    options: QueueOptions,
}

impl<M, R> MessageQueue<M, R>
where
    M: Clone + 'static,
    R: 'static,
{
    /// Create a new builder for MessageQueue.
    pub fn builder() -> MessageQueueBuilder<M, R> {
        MessageQueueBuilder::new()
    }

    /// Create a queue with the system clock and no completion callback.
    pub fn new<F>(config: QueueConfig, processor: F) -> Self
    where
        F: FnMut(M, Completion<M, R>) + 'static,
    {
        Self::from_parts(config, Box::new(processor), None, Box::new(SystemClock))
    }

    fn from_parts(
        config: QueueConfig,
        processor: Box<dyn Processor<M, R>>,
        notifier: Option<Notifier<M, R>>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            shared: Rc::new(Shared::new(notifier)),
            processor,
            clock,
            processing_timeout: config.processing_timeout,
            options: config.options,
        }
    }

    /// Admit a message.
    ///
    /// On failure the message is handed back and no notification fires.
    pub fn enqueue(&mut self, message: M) -> std::result::Result<MessageId, Rejected<M>> {
        let enqueued_at = match self.clock.now() {
            Ok(now) => now,
            Err(e) => {
                tracing::error!(error = %e, "Failed setting message enqueue time");
                return Err(Rejected::new(message, e));
            }
        };

        let id = MessageId::new();
        self.shared
            .lists
            .borrow_mut()
            .admit_pending(QueueItem::new(id, message, enqueued_at));

        tracing::debug!(message_id = %id, "Message enqueued");
        Ok(id)
    }

    /// Run one tick: expire overdue messages, then dispatch everything that
    /// is pending.
    pub fn do_work(&mut self) {
        self.process_timeouts();
        self.process_pending();
    }

    /// Whether no message is pending or in progress.
    pub fn is_empty(&self) -> bool {
        let lists = self.shared.lists.borrow();
        lists.pending.is_empty() && lists.in_progress.is_empty()
    }

    /// Number of tracked messages.
    pub fn len(&self) -> usize {
        let lists = self.shared.lists.borrow();
        lists.pending.len() + lists.in_progress.len()
    }

    /// Number of messages waiting for dispatch.
    pub fn pending_len(&self) -> usize {
        self.shared.lists.borrow().pending.len()
    }

    /// Number of messages dispatched and awaiting a result.
    pub fn in_progress_len(&self) -> usize {
        self.shared.lists.borrow().in_progress.len()
    }

    /// Cancel every tracked message, in-progress first, then pending.
    ///
    /// Each one gets a `Cancelled` notification. Processors still holding a
    /// completion token are not interrupted; their later report is ignored.
    pub fn remove_all(&mut self) {
        let (in_progress, pending) = {
            let mut lists = self.shared.lists.borrow_mut();
            (lists.in_progress.drain(), lists.pending.drain())
        };

        let cancelled = in_progress.len() + pending.len();
        if cancelled == 0 {
            return;
        }

        for item in in_progress.into_iter().chain(pending) {
            tracing::debug!(message_id = %item.id, "Message cancelled");
            self.shared.finish(item, ProcessingResult::Cancelled, None);
        }

        tracing::info!(cancelled = cancelled, "Queue drained");
    }

    /// Snapshot of the current deadlines.
    pub fn options(&self) -> QueueOptions {
        self.options
    }

    /// Replace the deadlines. Takes effect on the next tick.
    pub fn set_options(&mut self, options: QueueOptions) {
        self.options = options;
    }

    /// The overall processing timeout the queue was configured with.
    pub fn processing_timeout(&self) -> Duration {
        self.processing_timeout
    }

    fn process_timeouts(&mut self) {
        let enqueue_deadline = self.options.enqueue_deadline();
        let processing_deadline = self.options.processing_deadline();

        if enqueue_deadline.is_none() && processing_deadline.is_none() {
            return;
        }

        let now = match self.clock.now() {
            Ok(now) => now,
            Err(e) => {
                tracing::error!(error = %e, "Failed processing timeouts");
                return;
            }
        };

        if let Some(deadline) = enqueue_deadline {
            let expired = self
                .shared
                .lists
                .borrow_mut()
                .pending
                .take_expired(now, deadline, Stamp::Enqueued, true);
            self.expire(expired, "pending");

            // In-progress order follows processing start, not enqueue time,
            // so this sweep cannot stop early.
            let expired = self
                .shared
                .lists
                .borrow_mut()
                .in_progress
                .take_expired(now, deadline, Stamp::Enqueued, false);
            self.expire(expired, "in_progress");
        }

        if let Some(deadline) = processing_deadline {
            let expired = self.shared.lists.borrow_mut().in_progress.take_expired(
                now,
                deadline,
                Stamp::ProcessingStarted,
                true,
            );
            self.expire(expired, "in_progress");
        }
    }

    fn expire(&self, items: Vec<QueueItem<M>>, list: &'static str) {
        if items.is_empty() {
            return;
        }

        for item in &items {
            tracing::warn!(message_id = %item.id, list = list, "Message timed out");
        }
        self.shared.finish_all(items, ProcessingResult::Timeout);
    }

    fn process_pending(&mut self) {
        // Messages enqueued while this dispatch runs wait for the next tick.
        let bound = self.shared.lists.borrow().pending.last_key();
        let Some(bound) = bound else {
            return;
        };

        loop {
            let next = self.shared.lists.borrow_mut().pending.pop_front_until(bound);
            let Some(mut item) = next else {
                break;
            };

            let started_at = match self.clock.now() {
                Ok(now) => now,
                Err(e) => {
                    tracing::error!(
                        message_id = %item.id,
                        error = %e,
                        "Failed setting message processing start time"
                    );
                    self.shared.finish(item, ProcessingResult::Error, None);
                    continue;
                }
            };

            item.processing_started_at = Some(started_at);
            let id = item.id;
            let message = item.message.clone();
            let key = self
                .shared
                .lists
                .borrow_mut()
                .admit_in_progress(item, started_at);

            tracing::debug!(message_id = %id, "Dispatching message");

            let completion = Completion::new(Rc::downgrade(&self.shared), key, id);
            self.processor.process(message, completion);
        }
    }
}

impl<M, R> Drop for MessageQueue<M, R> {
    fn drop(&mut self) {
        let lists = self.shared.lists.borrow();
        if !lists.pending.is_empty() || !lists.in_progress.is_empty() {
            tracing::warn!(
                pending = lists.pending.len(),
                in_progress = lists.in_progress.len(),
                "Message queue dropped with tracked messages, they will not be notified"
            );
        }
    }
}
