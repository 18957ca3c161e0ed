//! The polling thread that drives [`ControlMapper::tick`].
//!
//! The loop does not sleep unless a minimum interval is configured, so it
//! keeps one core busy while running. The mapper is moved onto the thread
//! and handed back by [`TickLoop::stop`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error};

use crate::engine::ControlMapper;
use crate::error::ShimError;

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline(always)]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Returned when the thread could not be started; carries the mapper back.
pub struct SpawnFailed {
    pub error: ShimError,
    pub mapper: ControlMapper,
}

impl std::fmt::Debug for SpawnFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnFailed")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

pub struct TickLoop {
    cancel: CancelToken,
    ticks: Arc<AtomicU64>,
    handle: JoinHandle<Option<ControlMapper>>,
}

impl TickLoop {
    pub fn spawn(
        mapper: ControlMapper,
        min_interval: Option<Duration>,
    ) -> Result<Self, Box<SpawnFailed>> {
        let cancel = CancelToken::new();
        let ticks = Arc::new(AtomicU64::new(0));
        let (tx, rx) = crossbeam_channel::bounded::<ControlMapper>(1);

        let thread_cancel = cancel.clone();
        let thread_ticks = ticks.clone();
        let spawned = thread::Builder::new()
            .name("keyjack_tick".into())
            .spawn(move || {
                let mut mapper = rx.recv().ok()?;
                run(&mut mapper, &thread_cancel, &thread_ticks, min_interval);
                Some(mapper)
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                return Err(Box::new(SpawnFailed {
                    error: ShimError::Spawn {
                        name: "keyjack_tick",
                        source,
                    },
                    mapper,
                }));
            }
        };
        // The thread is blocked on this receive, so the send cannot fail
        // unless it already died.
        if let Err(crossbeam_channel::SendError(mapper)) = tx.send(mapper) {
            return Err(Box::new(SpawnFailed {
                error: ShimError::Spawn {
                    name: "keyjack_tick",
                    source: std::io::Error::other("tick thread exited early"),
                },
                mapper,
            }));
        }

        debug!("tick loop started");
        Ok(Self {
            cancel,
            ticks,
            handle,
        })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Completed ticks so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels, joins, and returns the mapper. `None` if a callback
    /// panicked on the tick thread.
    pub fn stop(self) -> Option<ControlMapper> {
        self.cancel.cancel();
        let ticks = self.ticks.clone();
        match self.handle.join() {
            Ok(mapper) => {
                debug!("tick loop stopped after {} ticks", ticks.load(Ordering::Relaxed));
                mapper
            }
            Err(_) => {
                error!("tick thread panicked; mappings lost");
                None
            }
        }
    }
}

fn run(
    mapper: &mut ControlMapper,
    cancel: &CancelToken,
    ticks: &AtomicU64,
    min_interval: Option<Duration>,
) {
    while !cancel.is_cancelled() {
        let started = Instant::now();
        mapper.tick();
        ticks.fetch_add(1, Ordering::Relaxed);

        if let Some(min) = min_interval {
            let spent = started.elapsed();
            if spent < min {
                thread::sleep(min - spent);
            }
        }
    }
}
