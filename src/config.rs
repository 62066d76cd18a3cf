//! Configuration types for the message queue.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime-tunable deadlines.
///
/// This is a plain snapshot: cloning it is a copy, and it serializes for
/// owners that persist queue settings. `None` (or a zero duration) disables a
/// deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Maximum time a message may spend in the queue, counted from enqueue.
    #[serde(with = "duration_serde", default)]
    pub max_enqueue_wait: Option<Duration>,
    /// Maximum time a message may spend with the processor.
    #[serde(with = "duration_serde", default)]
    pub max_processing_duration: Option<Duration>,
}

impl QueueOptions {
    /// Build options from seconds. Zero, negative and NaN values disable the
    /// corresponding deadline.
    pub fn from_secs_f64(max_enqueue_wait_secs: f64, max_processing_duration_secs: f64) -> Self {
        Self {
            max_enqueue_wait: secs_to_deadline(max_enqueue_wait_secs),
            max_processing_duration: secs_to_deadline(max_processing_duration_secs),
        }
    }

    /// Set the enqueue deadline.
    pub fn max_enqueue_wait(mut self, wait: Duration) -> Self {
        self.max_enqueue_wait = Some(wait);
        self
    }

    /// Set the processing deadline.
    pub fn max_processing_duration(mut self, duration: Duration) -> Self {
        self.max_processing_duration = Some(duration);
        self
    }

    /// The enqueue deadline, if enabled.
    pub fn enqueue_deadline(&self) -> Option<Duration> {
        self.max_enqueue_wait.filter(|d| !d.is_zero())
    }

    /// The processing deadline, if enabled.
    pub fn processing_deadline(&self) -> Option<Duration> {
        self.max_processing_duration.filter(|d| !d.is_zero())
    }

    /// Serialize the options to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize options from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn secs_to_deadline(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Configuration for a MessageQueue.
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    /// Overall processing budget reported to the owner. Per-message
    /// deadlines live in `options`.
    pub processing_timeout: Duration,
    /// Enqueue and processing deadlines.
    pub options: QueueOptions,
}

impl QueueConfig {
    /// Create a new builder.
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::new()
    }
}

/// Builder for QueueConfig.
#[derive(Debug, Default)]
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
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

    /// Replace both deadlines at once.
    pub fn options(mut self, options: QueueOptions) -> Self {
        self.config.options = options;
        self
    }

    /// Build the QueueConfig.
    pub fn build(self) -> QueueConfig {
        self.config
    }
}

/// Serde module for optional Duration serialization as nanoseconds, so a
/// saved snapshot reloads to the same deadlines.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => u64::try_from(d.as_nanos())
                .unwrap_or(u64::MAX)
                .serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos: Option<u64> = Option::deserialize(deserializer)?;
        Ok(nanos.map(Duration::from_nanos))
    }
}
