//! Per-tick gamepad read with backoff while no controller is connected.

use std::sync::Arc;

use log::debug;

use crate::backoff::ProbeCache;
use crate::clock::SharedClock;
use crate::emulation::gamepad::{
    ERROR_SUCCESS, GamepadApi, GamepadState, USER_SLOTS, XInputState,
};

pub struct GamepadPoller {
    api: Arc<dyn GamepadApi>,
    clock: SharedClock,
    cache: ProbeCache,
}

impl GamepadPoller {
    pub fn new(api: Arc<dyn GamepadApi>, clock: SharedClock) -> Self {
        Self {
            api,
            clock,
            cache: ProbeCache::new(),
        }
    }

    /// State of the first connected controller, or `None` if none answered
    /// or the poller is backing off.
    pub fn poll(&mut self) -> Option<GamepadState> {
        let now = self.clock.now_ms();
        if !self.cache.should_probe(now) {
            return None;
        }

        let found = (0..USER_SLOTS).find_map(|user_index| {
            let mut state = XInputState::default();
            (self.api.get_state(user_index, &mut state) == ERROR_SUCCESS).then_some(state.gamepad)
        });

        let was_present = self.cache.present();
        match found {
            Some(_) => self.cache.record_success(now),
            None => self.cache.record_failure(now),
        }
        if was_present != self.cache.present() {
            debug!(
                "gamepad {}",
                if found.is_some() { "connected" } else { "lost" }
            );
        }
        found
    }

    #[inline]
    pub fn probe_cache(&self) -> &ProbeCache {
        &self.cache
    }

    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }
}
