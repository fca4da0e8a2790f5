use core::time::Duration;

/// The number of kernel ticks in one second. The hosted backend counts in
/// microseconds.
pub const TICKS_PER_SECOND: u32 = 1_000_000;

/// The length of one kernel tick in microseconds.
pub const MICROSEC_PER_TICK: u32 = 1_000_000 / TICKS_PER_SECOND;

/// Convert a millisecond budget to a [`Duration`]. Every `u32` value is
/// representable.
#[inline]
pub fn msecs_to_duration(msecs: u32) -> Duration {
    Duration::from_micros(u64::from(msecs) * 1000)
}

/// Convert a duration in kernel ticks to a [`Duration`].
#[inline]
pub fn ticks_to_duration(ticks: u32) -> Duration {
    Duration::from_micros(u64::from(ticks) * u64::from(MICROSEC_PER_TICK))
}

/// How long a blocking receive is allowed to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait indefinitely.
    Pend,
    /// Never wait; report the empty condition immediately.
    Check,
    /// Wait up to the specified number of milliseconds.
    Millis(u32),
}

impl Timeout {
    /// Decode the portable layer's integer timeout encoding, where `-1`
    /// means [`Timeout::Pend`] and `0` means [`Timeout::Check`].
    /// Any other negative value is treated as `Pend`.
    pub fn from_raw(x: i32) -> Self {
        match x {
            0 => Self::Check,
            x if x < 0 => Self::Pend,
            x => Self::Millis(x as u32),
        }
    }

    /// Get the wait budget, or `None` for an indefinite wait.
    pub fn to_duration(self) -> Option<Duration> {
        match self {
            Self::Pend => None,
            Self::Check => Some(Duration::ZERO),
            Self::Millis(ms) => Some(msecs_to_duration(ms)),
        }
    }
}
