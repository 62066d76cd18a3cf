//! Basic example driving a message queue on a tokio current-thread runtime.
//!
//! This example demonstrates:
//! - Building a queue with enqueue and processing deadlines
//! - A processor that completes messages later from a local task
//! - Timeouts for messages the processor never finishes
//! - Draining the queue when the driver shuts down
//!
//! Run with: `cargo run --example basic`

use std::time::Duration;
use tokio::task::LocalSet;

use msgqueue::{Completed, Completion, Driver, MessageQueue, ProcessingResult};

/// Outgoing telemetry event.
#[derive(Debug, Clone)]
struct Event {
    name: &'static str,
    /// Simulated send time; `None` means the backend never answers.
    latency: Option<Duration>,
}

/// Hand an event to the simulated transport.
fn send_event(event: Event, completion: Completion<Event, String>) {
    println!("[send] {}", event.name);

    let Some(latency) = event.latency else {
        // Lost: the queue's processing deadline will complete it.
        drop(completion);
        return;
    };

    tokio::task::spawn_local(async move {
        tokio::time::sleep(latency).await;
        if event.name.starts_with("flaky") {
            completion.retryable_error("link busy".to_string());
        } else {
            completion.success();
        }
    });
}

fn report(completed: Completed<Event, String>) {
    match completed.result {
        ProcessingResult::Success => println!("[done] {} delivered", completed.message.name),
        ProcessingResult::RetryableError => println!(
            "[done] {} failed ({}), caller may resend",
            completed.message.name,
            completed.reason.unwrap_or_default()
        ),
        other => println!("[done] {} -> {}", completed.message.name, other),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> msgqueue::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("msgqueue example\n");

    let local = LocalSet::new();
    local
        .run_until(async {
            let mut queue = MessageQueue::builder()
                .max_enqueue_wait(Duration::from_secs(1))
                .max_processing_duration(Duration::from_millis(500))
                .processor(send_event)
                .on_completed(report)
                .build()?;

            let events = vec![
                Event {
                    name: "boot",
                    latency: Some(Duration::from_millis(50)),
                },
                Event {
                    name: "flaky-sensor",
                    latency: Some(Duration::from_millis(80)),
                },
                Event {
                    name: "lost-heartbeat",
                    latency: None,
                },
                Event {
                    name: "slow-upload",
                    latency: Some(Duration::from_secs(10)),
                },
            ];

            println!("Enqueueing {} events...\n", events.len());
            for event in events {
                match queue.enqueue(event) {
                    Ok(id) => println!("  enqueued: {}", id),
                    Err(rejected) => println!("  rejected: {}", rejected),
                }
            }

            println!("\nRunning for 2 seconds...\n");
            Driver::new(Duration::from_millis(20))
                .shutdown_timeout(Duration::from_millis(100))
                .run_until(&mut queue, tokio::time::sleep(Duration::from_secs(2)))
                .await;

            println!("\nQueue empty: {}", queue.is_empty());
            Ok::<(), msgqueue::QueueError>(())
        })
        .await
}
