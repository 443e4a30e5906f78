//! Simulation time and wall-clock synchronization.
//!
//! This module provides most notably:
//!
//! * [`MonotonicTime`]: a monotonic timestamp based on the [TAI] time
//!   standard, used both for the shared physical clock and for event
//!   timestamps,
//! * [`Clock`]: a trait for types that can synchronize the physical clock
//!   with wall-clock time, implemented for instance by [`SystemClock`] and
//!   [`AutoSystemClock`].
//!
//! [TAI]: https://en.wikipedia.org/wiki/International_Atomic_Time
//!
//! A single timestamp type serves two distinct roles. The *physical time* is
//! the platform-shared clock owned by the time coordinator; it is
//! monotonically non-decreasing for the lifetime of a run. The *model time*
//! is the timestamp carried by an event; an event may be processed at a
//! physical time equal to or later than its model time, never earlier. The
//! [`PhysicalTime`] and [`ModelTime`] aliases document which role a value
//! plays in a signature.

mod clock;

pub use tai_time::MonotonicTime;

pub use clock::{AutoSystemClock, Clock, NoClock, SyncStatus, SystemClock};

use std::time::Duration;

/// The platform-shared physical clock value.
pub type PhysicalTime = MonotonicTime;

/// The timestamp carried by an event.
pub type ModelTime = MonotonicTime;

/// Trait abstracting over time-absolute and time-relative deadlines.
///
/// This trait is implemented by [`std::time::Duration`] and
/// [`MonotonicTime`].
pub trait Deadline {
    /// Make this deadline into an absolute timestamp, using the provided
    /// current time as a reference.
    fn into_time(self, now: MonotonicTime) -> MonotonicTime;
}

impl Deadline for Duration {
    #[inline(always)]
    fn into_time(self, now: MonotonicTime) -> MonotonicTime {
        now + self
    }
}

impl Deadline for MonotonicTime {
    #[inline(always)]
    fn into_time(self, _: MonotonicTime) -> MonotonicTime {
        self
    }
}
