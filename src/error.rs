use core::fmt;

use thiserror::Error;

/// The queue had no free slot; the rejected value is handed back.
///
/// Also returned by the bounded blocking pushes once their deadline passes or
/// the caller cancels.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PushError<T>(pub T);

impl<T> PushError<T> {
    /// Recovers the value that could not be pushed.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PushError(..)")
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T> std::error::Error for PushError<T> {}

/// A bounded blocking pop gave up before an element arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PopError {
    /// The deadline passed with the queue still empty.
    #[error("timed out waiting for an element")]
    Timeout,
    /// The caller's keep-going check returned `false`.
    #[error("wait for an element was cancelled")]
    Cancelled,
}

/// Errors raised when constructing a queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// One slot always stays empty, so anything below 2 holds nothing.
    #[error("capacity must be at least 2, got {capacity}")]
    CapacityTooSmall {
        /// The rejected capacity.
        capacity: usize,
    },
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn push_error_returns_value() {
        let err = PushError(String::from("late"));
        assert_eq!(err.to_string(), "queue is full");
        assert_eq!(err.into_inner(), "late");
    }

    #[test]
    fn queue_error_mentions_capacity() {
        let err = QueueError::CapacityTooSmall { capacity: 1 };
        assert_eq!(err.to_string(), "capacity must be at least 2, got 1");
    }
}
