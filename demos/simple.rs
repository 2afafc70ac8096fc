//! Simple usage example

use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use turbo_sync::SpscQueue;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    info!("turbo_sync - simple SPSC example");

    // 16 slots, 15 usable
    let (mut producer_end, mut consumer_end) = SpscQueue::<String>::new(16).split();

    let producer = thread::spawn(move || {
        for i in 0..10 {
            let message = format!("Message {}", i);
            info!(%message, "sending");
            producer_end.push(message);

            // Small delay to make output readable
            thread::sleep(Duration::from_millis(100));
        }
        info!("producer finished");
    });

    let consumer = thread::spawn(move || {
        for _ in 0..10 {
            match consumer_end.pop_timeout(Duration::from_secs(2)) {
                Ok(message) => info!(%message, "received"),
                Err(err) => {
                    info!(%err, "giving up");
                    break;
                }
            }
        }
        info!("consumer finished");
    });

    producer.join().unwrap();
    consumer.join().unwrap();

    info!("example completed");
}
