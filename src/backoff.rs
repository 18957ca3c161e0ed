//! Presence probing with a backoff ladder.
//!
//! Absent devices are probed less often the longer they stay absent, so a
//! game polling a missing joystick every frame does not pay for a driver
//! round-trip each time. Any success drops the interval back to zero.

/// Wait before the next probe, given the number of failures recorded before
/// the one that just happened.
#[inline]
pub const fn backoff_interval_ms(prior_failures: u32) -> u64 {
    match prior_failures {
        0 | 1 => 250,
        2 | 3 => 500,
        4 | 5 => 1000,
        _ => 2000,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeCache {
    last_probe_ms: u64,
    interval_ms: u64,
    failures: u32,
    present: bool,
    valid: bool,
}

impl ProbeCache {
    pub const fn new() -> Self {
        Self {
            last_probe_ms: 0,
            interval_ms: 0,
            failures: 0,
            present: false,
            valid: false,
        }
    }

    /// False while a failed probe is still inside its backoff window.
    #[inline]
    pub fn should_probe(&self, now_ms: u64) -> bool {
        !(self.valid
            && self.interval_ms != 0
            && now_ms.saturating_sub(self.last_probe_ms) < self.interval_ms)
    }

    pub fn record_success(&mut self, now_ms: u64) {
        self.last_probe_ms = now_ms;
        self.interval_ms = 0;
        self.failures = 0;
        self.present = true;
        self.valid = true;
    }

    pub fn record_failure(&mut self, now_ms: u64) {
        self.last_probe_ms = now_ms;
        self.interval_ms = backoff_interval_ms(self.failures);
        self.failures = self.failures.saturating_add(1);
        self.present = false;
        self.valid = true;
    }

    /// Runs `probe` unless backing off, and returns the (possibly cached)
    /// presence.
    pub fn probe_with(&mut self, now_ms: u64, probe: impl FnOnce() -> bool) -> bool {
        if !self.should_probe(now_ms) {
            return self.present;
        }
        if probe() {
            self.record_success(now_ms);
        } else {
            self.record_failure(now_ms);
        }
        self.present
    }

    #[inline]
    pub fn present(&self) -> bool {
        self.valid && self.present
    }

    #[inline]
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    #[inline]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn invalidate(&mut self) {
        *self = Self::new();
    }
}
