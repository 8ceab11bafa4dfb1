//! Overflow policies for the send queue
//!
//! When every slot of the job queue is taken, the policy decides whether
//! the producer waits for a worker or the new record is dropped.

use super::error::TransportError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Policy for handling a full job queue
///
/// # Example
///
/// ```
/// use log_intake_transport::OverflowPolicy;
/// use std::time::Duration;
///
/// // Default behavior: apply backpressure
/// let policy = OverflowPolicy::default();
/// assert_eq!(policy, OverflowPolicy::Block);
///
/// // Wait a little, then give up on the record
/// let policy = OverflowPolicy::BlockWithTimeout(Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Block the producer until a worker frees a slot
    ///
    /// Nothing is lost, but a stalled connection stalls the caller.
    Block,

    /// Block with timeout, then drop
    BlockWithTimeout(Duration),

    /// Drop the new record when the queue is full
    ///
    /// The drop is counted and reported through the diagnostic log and the
    /// overflow callback; `push` still reports success.
    DropNewest,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::Block
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Block => write!(f, "Block"),
            OverflowPolicy::BlockWithTimeout(d) => write!(f, "BlockWithTimeout({:?})", d),
            OverflowPolicy::DropNewest => write!(f, "DropNewest"),
        }
    }
}

/// Callback type for overflow notifications
///
/// The parameter is the total count of dropped records so far.
pub type OverflowCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Callback type for failures inside queued sends
///
/// These errors never reach the producer that submitted the entry.
pub type SendErrorCallback = Arc<dyn Fn(&TransportError) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_policy_default() {
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::Block);
    }

    #[test]
    fn test_overflow_policy_display() {
        assert_eq!(OverflowPolicy::DropNewest.to_string(), "DropNewest");
        assert_eq!(OverflowPolicy::Block.to_string(), "Block");
        assert_eq!(
            OverflowPolicy::BlockWithTimeout(Duration::from_millis(100)).to_string(),
            "BlockWithTimeout(100ms)"
        );
    }
}
