//! Contains utility functions that are useful when working with the DW1000
//!
//! Everything that talks to the hardware through a non-blocking interface
//! ends up in a busy-wait somewhere. The helpers in this module make sure
//! every one of those waits has an upper bound.

use serde::{Deserialize, Serialize};


/// Upper bound on the number of times a non-blocking operation is polled
///
/// A limit always allows at least one poll.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct PollLimit(u32);

impl PollLimit {
    /// Creates a limit that allows `max_polls` polls
    ///
    /// A value of `0` is treated as `1`.
    pub const fn new(max_polls: u32) -> Self {
        if max_polls == 0 {
            PollLimit(1)
        }
        else {
            PollLimit(max_polls)
        }
    }

    /// Returns the maximum number of polls
    pub const fn max_polls(&self) -> u32 {
        self.0
    }
}

impl Default for PollLimit {
    fn default() -> Self {
        PollLimit(10_000)
    }
}


/// Blocks on a non-blocking operation until it completes or the limit runs out
///
/// Returns `Err(TimeoutError::Timeout)`, if the operation still returned
/// `WouldBlock` after `limit` polls.
pub fn poll_until<T, E, F>(limit: PollLimit, op: F) -> Result<T, TimeoutError<E>>
where
    F: FnMut() -> nb::Result<T, E>,
{
    poll_until_with(limit, op, || ())
}

/// Like [`poll_until`], but calls `between` after every poll that would block
///
/// This is the place to yield to a cooperative scheduler, or to feed a
/// watchdog.
pub fn poll_until_with<T, E, F, B>(
    limit: PollLimit,
    mut op: F,
    mut between: B,
) -> Result<T, TimeoutError<E>>
where
    F: FnMut() -> nb::Result<T, E>,
    B: FnMut(),
{
    // A deserialized limit may be 0
    for attempt in 0..limit.max_polls().max(1) {
        if attempt > 0 {
            between();
        }

        match op() {
            Ok(result) =>
                return Ok(result),
            Err(nb::Error::WouldBlock) =>
                (),
            Err(nb::Error::Other(error)) =>
                return Err(TimeoutError::Other(error)),
        }
    }

    Err(TimeoutError::Timeout)
}


/// An error that can be a timeout or another error
#[derive(Debug, Eq, PartialEq)]
pub enum TimeoutError<T> {
    /// The operation timed out
    Timeout,

    /// Another error occured
    Other(T),
}
