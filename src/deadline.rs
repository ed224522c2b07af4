//! Per-operation I/O deadlines
//!
//! Every connect/send/receive call arms its own [`Deadline`] value and
//! feeds the remaining budget into the socket timeout before each
//! blocking call. There is no shared timer state, so operations on
//! different sessions never corrupt each other's timeout bookkeeping;
//! disarming happens implicitly when the value is dropped on any exit
//! path.

use crate::error::{TransportError, TransportResult};
use std::time::{Duration, Instant};

/// A wall-clock point after which an in-progress operation must report
/// timeout rather than continue blocking.
///
/// A timeout of zero seconds means "no deadline": the operation may
/// block indefinitely.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// Arm a deadline `seconds` in the future; `0` arms no deadline.
    pub fn after_secs(seconds: u64) -> Self {
        let expires_at = if seconds == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_secs(seconds))
        };
        Deadline { expires_at }
    }

    /// Time left before expiry; `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        matches!(self.remaining(), Some(left) if left.is_zero())
    }

    /// Remaining budget as a socket timeout argument.
    ///
    /// `Ok(None)` requests indefinite blocking (unbounded deadline).
    /// An elapsed deadline is reported here rather than passed on, since
    /// a zero `Duration` is rejected by the std socket timeout setters.
    pub(crate) fn budget(&self) -> TransportResult<Option<Duration>> {
        match self.remaining() {
            None => Ok(None),
            Some(left) if left.is_zero() => Err(TransportError::Timeout),
            Some(left) => Ok(Some(left)),
        }
    }
}
