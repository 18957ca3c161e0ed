//! OS-style keyboard auto-repeat bookkeeping for injected keys.

use std::collections::HashMap;
use std::time::Duration;

use smallvec::SmallVec;

/// Initial delay and repeat interval, both in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatTiming {
    pub initial_delay_ms: u64,
    pub interval_ms: u64,
}

impl RepeatTiming {
    pub const fn new(initial_delay_ms: u64, interval_ms: u64) -> Self {
        Self {
            initial_delay_ms,
            interval_ms,
        }
    }

    /// Converts the OS keyboard delay (0..=3) and speed (0..=31) settings.
    pub fn from_settings(delay_setting: u32, speed_setting: u32) -> Self {
        let initial_delay_ms = (delay_setting as u64 + 1) * 250;
        let chars_per_sec = 2.0 + speed_setting as f64 * (28.0 / 31.0);
        let interval_ms = (1000.0 / chars_per_sec.max(1.0)) as u64;
        Self {
            initial_delay_ms,
            interval_ms: interval_ms.max(1),
        }
    }

    /// How long the worker may sleep while keys are repeating.
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis((self.interval_ms / 4).max(1))
    }
}

impl Default for RepeatTiming {
    fn default() -> Self {
        Self::new(500, 50)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectedKeyInfo {
    pub initial_press_ms: u64,
    pub last_repeat_ms: u64,
    pub initial_consumed: bool,
}

/// Held injected keys and when each one repeats next.
#[derive(Debug, Default)]
pub struct RepeatScheduler {
    timing: RepeatTiming,
    held: HashMap<u16, InjectedKeyInfo>,
    // Bumped by every drain; key-downs queued under an older epoch are stale
    epoch: u64,
}

impl RepeatScheduler {
    pub fn new(timing: RepeatTiming) -> Self {
        Self {
            timing,
            held: HashMap::new(),
            epoch: 0,
        }
    }

    #[inline]
    pub fn timing(&self) -> RepeatTiming {
        self.timing
    }

    /// Starts tracking `vk`. Returns false if it was already held.
    pub fn press(&mut self, vk: u16, now_ms: u64) -> bool {
        if self.held.contains_key(&vk) {
            return false;
        }
        self.held.insert(
            vk,
            InjectedKeyInfo {
                initial_press_ms: now_ms,
                last_repeat_ms: now_ms,
                initial_consumed: false,
            },
        );
        true
    }

    pub fn release(&mut self, vk: u16) -> bool {
        self.held.remove(&vk).is_some()
    }

    /// Puts `vk` straight into its repeating phase so it fires on the next
    /// check. Returns true if the key was not held before.
    pub fn fast_repeat(&mut self, vk: u16, now_ms: u64) -> bool {
        let last_repeat_ms = now_ms.saturating_sub(self.timing.interval_ms);
        match self.held.get_mut(&vk) {
            Some(info) => {
                info.initial_consumed = true;
                info.last_repeat_ms = last_repeat_ms;
                false
            }
            None => {
                self.held.insert(
                    vk,
                    InjectedKeyInfo {
                        initial_press_ms: now_ms,
                        last_repeat_ms,
                        initial_consumed: true,
                    },
                );
                true
            }
        }
    }

    /// Keys that owe a repeat at `now_ms`, marking each as serviced.
    pub fn due_repeats(&mut self, now_ms: u64) -> SmallVec<[u16; 8]> {
        let mut due = SmallVec::new();
        for (&vk, info) in self.held.iter_mut() {
            if !info.initial_consumed {
                if now_ms.saturating_sub(info.initial_press_ms) >= self.timing.initial_delay_ms {
                    info.initial_consumed = true;
                    info.last_repeat_ms = now_ms;
                    due.push(vk);
                }
            } else if now_ms.saturating_sub(info.last_repeat_ms) >= self.timing.interval_ms {
                info.last_repeat_ms = now_ms;
                due.push(vk);
            }
        }
        due.sort_unstable();
        due
    }

    /// Worker wait bound: a quarter interval while anything repeats,
    /// otherwise wait for the next command.
    pub fn wait_timeout(&self) -> Option<Duration> {
        if self.held.is_empty() {
            None
        } else {
            Some(self.timing.poll_interval())
        }
    }

    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[inline]
    pub fn is_held(&self, vk: u16) -> bool {
        self.held.contains_key(&vk)
    }

    pub fn info(&self, vk: u16) -> Option<InjectedKeyInfo> {
        self.held.get(&vk).copied()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn held_keys(&self) -> SmallVec<[u16; 8]> {
        let mut keys: SmallVec<[u16; 8]> = self.held.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Removes and returns every held key, sorted, and starts a new epoch.
    pub fn drain(&mut self) -> SmallVec<[u16; 8]> {
        self.epoch += 1;
        let mut keys: SmallVec<[u16; 8]> = self.held.drain().map(|(vk, _)| vk).collect();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_from_os_settings() {
        let slowest = RepeatTiming::from_settings(3, 0);
        assert_eq!(slowest.initial_delay_ms, 1000);
        assert_eq!(slowest.interval_ms, 500);

        let fastest = RepeatTiming::from_settings(0, 31);
        assert_eq!(fastest.initial_delay_ms, 250);
        assert_eq!(fastest.interval_ms, 33);
    }

    #[test]
    fn test_poll_interval_has_floor() {
        assert_eq!(RepeatTiming::new(500, 50).poll_interval(), Duration::from_millis(12));
        assert_eq!(RepeatTiming::new(500, 2).poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_initial_delay_then_interval() {
        let mut scheduler = RepeatScheduler::new(RepeatTiming::new(500, 50));
        assert!(scheduler.press(0x41, 0));

        assert!(scheduler.due_repeats(499).is_empty());
        assert_eq!(scheduler.due_repeats(500).as_slice(), &[0x41]);
        assert!(scheduler.due_repeats(549).is_empty());
        assert_eq!(scheduler.due_repeats(550).as_slice(), &[0x41]);
        assert!(scheduler.due_repeats(550).is_empty());
    }

    #[test]
    fn test_press_while_held_is_ignored() {
        let mut scheduler = RepeatScheduler::new(RepeatTiming::default());
        assert!(scheduler.press(0x41, 0));
        assert!(!scheduler.press(0x41, 300));
        assert_eq!(scheduler.info(0x41).map(|i| i.initial_press_ms), Some(0));
    }

    #[test]
    fn test_fast_repeat_skips_delay() {
        let mut scheduler = RepeatScheduler::new(RepeatTiming::new(500, 50));
        assert!(scheduler.fast_repeat(0x20, 1000));
        assert_eq!(scheduler.due_repeats(1000).as_slice(), &[0x20]);

        // Upgrading an already held key does not count as a new press
        assert!(scheduler.press(0x41, 1000));
        assert!(!scheduler.fast_repeat(0x41, 1010));
        assert_eq!(scheduler.due_repeats(1010).as_slice(), &[0x41]);
    }

    #[test]
    fn test_fast_repeat_near_origin_saturates() {
        let mut scheduler = RepeatScheduler::new(RepeatTiming::new(500, 50));
        scheduler.fast_repeat(0x20, 10);
        assert_eq!(scheduler.info(0x20).map(|i| i.last_repeat_ms), Some(0));
    }

    #[test]
    fn test_wait_timeout_tracks_held_keys() {
        let mut scheduler = RepeatScheduler::new(RepeatTiming::new(500, 40));
        assert_eq!(scheduler.wait_timeout(), None);
        scheduler.press(0x41, 0);
        assert_eq!(scheduler.wait_timeout(), Some(Duration::from_millis(10)));
        scheduler.release(0x41);
        assert_eq!(scheduler.wait_timeout(), None);
    }

    #[test]
    fn test_drain_empties_and_sorts() {
        let mut scheduler = RepeatScheduler::new(RepeatTiming::default());
        scheduler.press(0x44, 0);
        scheduler.press(0x41, 0);
        assert_eq!(scheduler.drain().as_slice(), &[0x41, 0x44]);
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.epoch(), 1);
    }
}
