//! # msgqueue - In-process message lifecycle queue
//!
//! A single-threaded queue that sits between a producer and one processing
//! backend. It tracks every admitted message from enqueue to a terminal
//! result and guarantees that result is reported to the owner exactly once.
//!
//! ## Features
//!
//! - **Two deadlines**: maximum time since enqueue, maximum time with the
//!   processor; expired messages complete with `Timeout`
//! - **Exactly-once completion**: each dispatched message comes with a
//!   `Completion` token that is consumed when used
//! - **Cooperative**: no threads or timers; the owner calls `do_work`, or
//!   hands the queue to a tokio `Driver`
//! - **Drain on shutdown**: `remove_all` reports `Cancelled` for everything
//!   still tracked
//!
//! ## Quick Start
//!
//! ```rust
//! use msgqueue::{Completion, MessageQueue};
//! use std::time::Duration;
//!
//! let mut queue: MessageQueue<String> = MessageQueue::builder()
//!     .max_enqueue_wait(Duration::from_secs(30))
//!     .max_processing_duration(Duration::from_secs(10))
//!     .processor(|message: String, completion: Completion<String, String>| {
//!         if message.is_empty() {
//!             completion.error("empty message".to_string());
//!         } else {
//!             completion.success();
//!         }
//!     })
//!     .on_completed(|completed| {
//!         println!("{} finished: {}", completed.id, completed.result);
//!     })
//!     .build()?;
//!
//! queue.enqueue("hello".to_string()).map_err(|rejected| rejected.error)?;
//! queue.do_work();
//! assert!(queue.is_empty());
//! # Ok::<(), msgqueue::QueueError>(())
//! ```

mod clock;
mod completion;
mod config;
mod driver;
mod error;
mod message;
mod queue;
mod state;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use completion::Completion;
pub use config::{QueueConfig, QueueConfigBuilder, QueueOptions};
pub use driver::Driver;
pub use error::{QueueError, Rejected, Result};
pub use message::{Completed, MessageId, ProcessingResult};
pub use queue::{MessageQueue, MessageQueueBuilder, Processor};
pub use state::Notifier;
