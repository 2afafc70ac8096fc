//! turbo_sync - bounded SPSC ring buffer and an atomically reference-counted handle
//!
//! [`SpscQueue`] is a fixed-capacity lock-free queue for exactly one producer
//! and one consumer; [`Shared`] is a clonable owning handle whose value is
//! dropped exactly once, by the last handle to go.
//!
//! ```
//! use std::thread;
//! use turbo_sync::{Shared, SpscQueue};
//!
//! let (mut tx, mut rx) = SpscQueue::new(16).split();
//! let config = Shared::new(String::from("ticks"));
//! let label = config.clone();
//!
//! let producer = thread::spawn(move || {
//!     for i in 0..100u32 {
//!         tx.push(i);
//!     }
//!     assert_eq!(*label, "ticks");
//! });
//! for i in 0..100u32 {
//!     assert_eq!(rx.pop(), i);
//! }
//! producer.join().unwrap();
//! assert_eq!(config.use_count(), 1);
//! ```
#![warn(missing_docs)]

mod backoff;
mod error;
mod shared;
mod spsc;
mod sync;

pub use error::{PopError, PushError, QueueError};
pub use shared::Shared;
pub use spsc::{channel, Consumer, Producer, SpscQueue};
