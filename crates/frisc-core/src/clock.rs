//! Deterministic virtual time for the CPU and clocked devices.
//!
//! Nothing here reads wall-clock time: the host or the run loop advances the
//! [`VirtualClock`], and each device's [`DeviceClock`] converts elapsed virtual
//! nanoseconds into an exact tick count for its own frequency.

/// Nanoseconds per second.
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;
/// Highest supported device clock frequency.
pub const MAX_DEVICE_FREQUENCY_HZ: u32 = 10_000_000;

/// Monotonic virtual time in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct VirtualClock {
    now_ns: u64,
    // Sub-nanosecond remainder of cycle conversions, in units of 1/hz ns.
    cycle_remainder: u64,
}

impl VirtualClock {
    /// Creates a clock at time zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            now_ns: 0,
            cycle_remainder: 0,
        }
    }

    /// Returns the current virtual time.
    #[must_use]
    pub const fn now_ns(&self) -> u64 {
        self.now_ns
    }

    /// Advances the clock by `nanos` and returns the new time.
    pub const fn advance(&mut self, nanos: u64) -> u64 {
        self.now_ns = self.now_ns.saturating_add(nanos);
        self.now_ns
    }

    /// Advances the clock by `cycles` periods of a `frequency_hz` clock,
    /// carrying the fractional nanosecond remainder to the next call.
    pub fn advance_cycles(&mut self, cycles: u64, frequency_hz: u32) -> u64 {
        let hz = u128::from(frequency_hz.max(1));
        let total = u128::from(cycles) * u128::from(NANOS_PER_SECOND)
            + u128::from(self.cycle_remainder);
        let whole = u64::try_from(total / hz).unwrap_or(u64::MAX);
        self.cycle_remainder = u64::try_from(total % hz).unwrap_or(0);
        self.advance(whole)
    }

    /// Returns to time zero.
    pub const fn reset(&mut self) {
        self.now_ns = 0;
        self.cycle_remainder = 0;
    }
}

/// Per-device tick source with an absolute schedule.
///
/// Tick `k` (1-based) falls due at `origin + ceil(k * 1e9 / hz)`, so no drift
/// accumulates for frequencies that do not divide one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DeviceClock {
    frequency_hz: u32,
    origin_ns: u64,
    ticks_emitted: u64,
}

impl DeviceClock {
    /// Starts a clock whose first tick is one period after `now_ns`.
    #[must_use]
    pub const fn new(frequency_hz: u32, now_ns: u64) -> Self {
        Self {
            frequency_hz,
            origin_ns: now_ns,
            ticks_emitted: 0,
        }
    }

    /// Returns the configured frequency.
    #[must_use]
    pub const fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    /// Returns the virtual time of the next tick.
    #[must_use]
    pub fn next_deadline_ns(&self) -> u64 {
        let next = u128::from(self.ticks_emitted) + 1;
        let hz = u128::from(self.frequency_hz.max(1));
        let offset = (next * u128::from(NANOS_PER_SECOND)).div_ceil(hz);
        u64::try_from(offset)
            .map_or(u64::MAX, |offset| self.origin_ns.saturating_add(offset))
    }

    /// Returns how many ticks fell due up to `now_ns` since the last call.
    pub fn due_ticks(&mut self, now_ns: u64) -> u64 {
        let elapsed = u128::from(now_ns.saturating_sub(self.origin_ns));
        let total = elapsed * u128::from(self.frequency_hz) / u128::from(NANOS_PER_SECOND);
        let total = u64::try_from(total).unwrap_or(u64::MAX);
        let due = total.saturating_sub(self.ticks_emitted);
        self.ticks_emitted = self.ticks_emitted.max(total);
        due
    }

    /// Restarts the schedule at `now_ns`.
    pub const fn restart(&mut self, now_ns: u64) {
        self.origin_ns = now_ns;
        self.ticks_emitted = 0;
    }
}
