//! Synthetic input delivery.
//!
//! Keyboard events go through a worker thread that also produces OS-style
//! auto-repeat for held keys. Mouse events are sent synchronously.

mod repeat;
mod sink;

pub use repeat::{InjectedKeyInfo, RepeatScheduler, RepeatTiming};
pub use sink::{INJECTION_TAG, InputSink, KeyForm, MouseButton, SyntheticInput, normalize_absolute};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::{debug, error, trace, warn};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::clock::SharedClock;
use crate::code::InputCode;
use crate::error::ShimError;

/// Bound on how long shutdown waits for the worker before abandoning it.
pub const WORKER_JOIN_TIMEOUT: Duration = Duration::from_millis(2000);

const SIGNAL_JIGGLES: usize = 6;
const SIGNAL_STEP_PX: i32 = 2;
const SIGNAL_PAUSE: Duration = Duration::from_millis(2);

enum Command {
    /// `epoch` is the scheduler epoch at queue time.
    Key { vk: u16, down: bool, epoch: u64 },
    Wake,
}

struct Worker {
    tx: Sender<Command>,
    stop: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Keyboard injection queue with auto-repeat, plus synchronous mouse
/// injection.
pub struct Injector {
    sink: Arc<dyn InputSink>,
    clock: SharedClock,
    scheduler: Arc<Mutex<RepeatScheduler>>,
    worker: Mutex<Option<Worker>>,
}

impl Injector {
    pub fn new(sink: Arc<dyn InputSink>, clock: SharedClock, timing: RepeatTiming) -> Self {
        Self {
            sink,
            clock,
            scheduler: Arc::new(Mutex::new(RepeatScheduler::new(timing))),
            worker: Mutex::new(None),
        }
    }

    #[inline]
    pub fn timing(&self) -> RepeatTiming {
        self.scheduler.lock().timing()
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Keys currently held by injection, sorted.
    pub fn held_keys(&self) -> SmallVec<[u16; 8]> {
        self.scheduler.lock().held_keys()
    }

    /// Queues a tagged scan-code event. A key-down for a key that is
    /// already held is dropped; the OS-style repeat covers it.
    pub fn inject_key(&self, vk: u16, down: bool) {
        let now = self.clock.now_ms();
        // Queue order has to match the held map, so enqueue under the lock
        let mut scheduler = self.scheduler.lock();
        if down {
            if !scheduler.press(vk, now) {
                return;
            }
        } else {
            scheduler.release(vk);
        }
        let epoch = scheduler.epoch();
        self.submit(Command::Key { vk, down, epoch });
    }

    /// Holds `vk` with the initial delay already elapsed, so it repeats
    /// right away.
    pub fn inject_key_fast_repeat(&self, vk: u16) {
        let now = self.clock.now_ms();
        let mut scheduler = self.scheduler.lock();
        if scheduler.fast_repeat(vk, now) {
            let epoch = scheduler.epoch();
            self.submit(Command::Key {
                vk,
                down: true,
                epoch,
            });
        } else {
            self.submit(Command::Wake);
        }
    }

    /// Sends key-ups, in scan-code and virtual-key form, for every held
    /// injected key and forgets them. Key-downs still queued for the worker
    /// are dropped.
    pub fn release_all(&self) {
        // Held while sending so a repeat cannot land after the key-ups
        let mut scheduler = self.scheduler.lock();
        let keys = scheduler.drain();
        if keys.is_empty() {
            return;
        }
        debug!("releasing {} injected keys", keys.len());
        let mut events: SmallVec<[SyntheticInput; 16]> = SmallVec::new();
        for vk in keys {
            events.push(SyntheticInput::scan_key(vk, false));
            events.push(SyntheticInput::vk_key(vk, false));
        }
        self.sink.send(&events);
    }

    /// Releases everything, stops the worker and waits up to
    /// [`WORKER_JOIN_TIMEOUT`] for it. The next injection starts a fresh
    /// worker.
    pub fn shutdown(&self) {
        self.release_all();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.stop.store(true, Ordering::Release);
            let _ = worker.tx.send(Command::Wake);
            match worker.done_rx.recv_timeout(WORKER_JOIN_TIMEOUT) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = worker.handle.join();
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("injection worker did not stop in time, abandoning it");
                }
            }
        }

        // Anything injected after the first release
        self.release_all();
    }

    pub fn mouse_button(&self, button: MouseButton, down: bool) {
        self.sink.send(&[SyntheticInput::MouseButton { button, down }]);
    }

    pub fn mouse_move(&self, dx: i32, dy: i32, absolute: bool) {
        self.sink.send(&[SyntheticInput::MouseMove { dx, dy, absolute }]);
    }

    /// Small back-and-forth cursor jiggle some games need before they
    /// notice mouse input.
    pub fn mouse_signal(&self) {
        for _ in 0..SIGNAL_JIGGLES {
            self.mouse_move(SIGNAL_STEP_PX, SIGNAL_STEP_PX, false);
            thread::sleep(SIGNAL_PAUSE);
            self.mouse_move(-SIGNAL_STEP_PX, -SIGNAL_STEP_PX, false);
            thread::sleep(SIGNAL_PAUSE);
        }
    }

    fn submit(&self, command: Command) {
        let mut worker = self.worker.lock();
        if worker.is_none() {
            match self.spawn_worker() {
                Ok(spawned) => *worker = Some(spawned),
                Err(e) => {
                    error!("{}", e);
                    drop(worker);
                    // Degraded path: deliver without repeat
                    if let Command::Key { vk, down, .. } = command {
                        self.sink.send(&[SyntheticInput::scan_key(vk, down)]);
                    }
                    return;
                }
            }
        }
        if let Some(worker) = worker.as_ref() {
            let _ = worker.tx.send(command);
        }
    }

    fn spawn_worker(&self) -> Result<Worker, ShimError> {
        let (tx, rx) = unbounded();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let stop = Arc::new(AtomicBool::new(false));

        let context = WorkerContext {
            rx,
            stop: stop.clone(),
            scheduler: self.scheduler.clone(),
            sink: self.sink.clone(),
            clock: self.clock.clone(),
        };
        let handle = thread::Builder::new()
            .name("keyjack_inject".to_string())
            .spawn(move || {
                context.run();
                let _ = done_tx.send(());
            })
            .map_err(|source| ShimError::Spawn {
                name: "injection",
                source,
            })?;

        debug!("injection worker started");
        Ok(Worker {
            tx,
            stop,
            done_rx,
            handle,
        })
    }
}

impl Drop for Injector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct WorkerContext {
    rx: Receiver<Command>,
    stop: Arc<AtomicBool>,
    scheduler: Arc<Mutex<RepeatScheduler>>,
    sink: Arc<dyn InputSink>,
    clock: SharedClock,
}

impl WorkerContext {
    fn run(self) {
        loop {
            if self.stop.load(Ordering::Acquire) {
                break;
            }

            let timeout = self.scheduler.lock().wait_timeout();
            let first = match timeout {
                Some(timeout) => match self.rx.recv_timeout(timeout) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.rx.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
            };

            // Sends happen under the scheduler lock so release_all is
            // ordered after them. Key-ups queued before a stop are still
            // delivered.
            let mut scheduler = self.scheduler.lock();
            let epoch = scheduler.epoch();
            let mut batch: SmallVec<[SyntheticInput; 8]> = SmallVec::new();
            for command in first.into_iter().chain(self.rx.try_iter()) {
                if let Command::Key {
                    vk,
                    down,
                    epoch: queued,
                } = command
                {
                    if down && queued != epoch {
                        trace!("dropping key-down for {:#04x} queued before a release", vk);
                        continue;
                    }
                    batch.push(SyntheticInput::scan_key(vk, down));
                }
            }
            if !batch.is_empty() {
                self.sink.send(&batch);
            }

            if self.stop.load(Ordering::Acquire) {
                break;
            }

            let due = scheduler.due_repeats(self.clock.now_ms());
            if !due.is_empty() {
                trace!("auto-repeat for {:?}", due);
                let repeats: SmallVec<[SyntheticInput; 8]> = due
                    .iter()
                    .map(|&vk| SyntheticInput::scan_key(vk, true))
                    .collect();
                self.sink.send(&repeats);
            }
        }
        debug!("injection worker stopped");
    }
}

/// Key-up / button-up for each code, used to clear input the OS may still
/// consider held. Keyboard codes get a virtual-key and a scan-code release.
pub fn release_codes(sink: &dyn InputSink, codes: &[InputCode], gap: Duration) {
    for &code in codes {
        if let Some(vk) = code.virtual_key() {
            sink.send(&[SyntheticInput::vk_key(vk, false)]);
            sink.send(&[SyntheticInput::scan_key(vk, false)]);
        } else if let Some(button) = MouseButton::from_code(code) {
            sink.send(&[SyntheticInput::MouseButton {
                button,
                down: false,
            }]);
        } else {
            continue;
        }
        if !gap.is_zero() {
            thread::sleep(gap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<SyntheticInput>>,
    }

    impl InputSink for Recorder {
        fn send(&self, inputs: &[SyntheticInput]) {
            self.events.lock().extend_from_slice(inputs);
        }
    }

    impl Recorder {
        fn wait_for(&self, count: usize) -> Vec<SyntheticInput> {
            let deadline = Instant::now() + Duration::from_secs(2);
            while Instant::now() < deadline {
                if self.events.lock().len() >= count {
                    break;
                }
                thread::sleep(Duration::from_millis(5));
            }
            self.events.lock().clone()
        }
    }

    fn injector(timing: RepeatTiming) -> (Injector, Arc<Recorder>, Arc<ManualClock>) {
        let sink = Arc::new(Recorder::default());
        let clock = ManualClock::new(10_000);
        let injector = Injector::new(sink.clone(), clock.clone(), timing);
        (injector, sink, clock)
    }

    #[test]
    fn test_worker_starts_lazily_and_delivers_in_order() {
        let (injector, sink, _) = injector(RepeatTiming::new(500, 50));
        assert!(!injector.is_running());

        injector.inject_key(0x41, true);
        injector.inject_key(0x41, false);
        assert!(injector.is_running());

        let events = sink.wait_for(2);
        assert_eq!(
            events,
            vec![
                SyntheticInput::scan_key(0x41, true),
                SyntheticInput::scan_key(0x41, false)
            ]
        );
        injector.shutdown();
        assert!(!injector.is_running());
    }

    #[test]
    fn test_duplicate_down_is_dropped() {
        let (injector, sink, _) = injector(RepeatTiming::new(500, 50));
        injector.inject_key(0x42, true);
        injector.inject_key(0x42, true);
        injector.inject_key(0x42, false);

        let events = sink.wait_for(2);
        assert_eq!(events.len(), 2);
        injector.shutdown();
    }

    #[test]
    fn test_repeat_follows_manual_clock() {
        let (injector, sink, clock) = injector(RepeatTiming::new(500, 50));
        injector.inject_key(0x43, true);
        assert_eq!(sink.wait_for(1).len(), 1);

        clock.advance(500);
        let events = sink.wait_for(2);
        assert_eq!(events[1], SyntheticInput::scan_key(0x43, true));
        injector.shutdown();
    }

    #[test]
    fn test_shutdown_releases_held_keys() {
        let (injector, sink, _) = injector(RepeatTiming::new(500, 50));
        injector.inject_key(0x44, true);
        sink.wait_for(1);

        injector.shutdown();
        let events = sink.events.lock().clone();
        assert!(events.contains(&SyntheticInput::scan_key(0x44, false)));
        assert!(events.contains(&SyntheticInput::vk_key(0x44, false)));
        assert!(injector.held_keys().is_empty());
    }

    #[test]
    fn test_shutdown_is_idempotent_and_restartable() {
        let (injector, sink, _) = injector(RepeatTiming::default());
        injector.shutdown();
        injector.shutdown();

        injector.inject_key(0x45, true);
        assert_eq!(sink.wait_for(1).len(), 1);
        assert!(injector.is_running());
        injector.shutdown();
    }

    #[test]
    fn test_fast_repeat_sends_down_once() {
        let (injector, sink, _) = injector(RepeatTiming::new(500, 50));
        injector.inject_key_fast_repeat(0x46);
        let events = sink.wait_for(2);
        // Down plus the immediate repeat
        assert_eq!(events[0], SyntheticInput::scan_key(0x46, true));
        assert_eq!(events[1], SyntheticInput::scan_key(0x46, true));
        injector.shutdown();
    }

    /// Blocks the `block_on`-th send until the gate opens.
    struct GatedSink {
        events: Mutex<Vec<SyntheticInput>>,
        sends: std::sync::atomic::AtomicUsize,
        block_on: usize,
        entered: Sender<()>,
        gate: Receiver<()>,
    }

    impl InputSink for GatedSink {
        fn send(&self, inputs: &[SyntheticInput]) {
            let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.block_on {
                let _ = self.entered.send(());
                let _ = self.gate.recv_timeout(Duration::from_secs(2));
            }
            self.events.lock().extend_from_slice(inputs);
        }
    }

    fn last_event_for(events: &[SyntheticInput], vk: u16) -> Option<SyntheticInput> {
        events.iter().rev().copied().find(|e| {
            *e == SyntheticInput::scan_key(vk, true)
                || *e == SyntheticInput::scan_key(vk, false)
                || *e == SyntheticInput::vk_key(vk, false)
        })
    }

    #[test]
    fn test_release_all_lands_after_in_flight_repeat() {
        let (entered_tx, entered_rx) = unbounded();
        let (open_tx, open_rx) = unbounded();
        let sink = Arc::new(GatedSink {
            events: Mutex::new(Vec::new()),
            sends: std::sync::atomic::AtomicUsize::new(0),
            // First send is the key-down, second the immediate repeat
            block_on: 2,
            entered: entered_tx,
            gate: open_rx,
        });
        let injector = Injector::new(
            sink.clone(),
            ManualClock::new(10_000),
            RepeatTiming::new(500, 50),
        );

        injector.inject_key_fast_repeat(0x41);
        entered_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("worker reaches the repeat send");

        thread::scope(|s| {
            let releaser = s.spawn(|| injector.release_all());
            thread::sleep(Duration::from_millis(20));
            open_tx.send(()).unwrap();
            releaser.join().unwrap();
        });
        injector.shutdown();

        let events = sink.events.lock().clone();
        assert_eq!(events[0], SyntheticInput::scan_key(0x41, true));
        assert_eq!(last_event_for(&events, 0x41), Some(SyntheticInput::vk_key(0x41, false)));
        assert!(injector.held_keys().is_empty());
    }

    #[test]
    fn test_worker_drops_downs_queued_before_release() {
        let (tx, rx) = unbounded();
        let sink = Arc::new(Recorder::default());
        let scheduler = Arc::new(Mutex::new(RepeatScheduler::new(RepeatTiming::default())));
        scheduler.lock().press(0x42, 0);
        let queued = scheduler.lock().epoch();
        tx.send(Command::Key {
            vk: 0x42,
            down: true,
            epoch: queued,
        })
        .unwrap();
        tx.send(Command::Key {
            vk: 0x43,
            down: false,
            epoch: queued,
        })
        .unwrap();
        scheduler.lock().drain();
        drop(tx);

        let context = WorkerContext {
            rx,
            stop: Arc::new(AtomicBool::new(false)),
            scheduler,
            sink: sink.clone(),
            clock: ManualClock::new(0),
        };
        context.run();

        assert_eq!(
            *sink.events.lock(),
            vec![SyntheticInput::scan_key(0x43, false)]
        );
    }

    #[test]
    fn test_release_codes_covers_keys_and_buttons() {
        let sink = Recorder::default();
        release_codes(
            &sink,
            &[InputCode(0x41), InputCode::MOUSE_X2, InputCode::PAD_A],
            Duration::ZERO,
        );
        assert_eq!(
            *sink.events.lock(),
            vec![
                SyntheticInput::vk_key(0x41, false),
                SyntheticInput::scan_key(0x41, false),
                SyntheticInput::MouseButton {
                    button: MouseButton::X2,
                    down: false
                },
            ]
        );
    }

    #[test]
    fn test_mouse_signal_nets_zero() {
        let (injector, sink, _) = injector(RepeatTiming::default());
        injector.mouse_signal();
        let (dx, dy) = sink.events.lock().iter().fold((0, 0), |acc, e| match e {
            SyntheticInput::MouseMove { dx, dy, .. } => (acc.0 + dx, acc.1 + dy),
            _ => acc,
        });
        assert_eq!((dx, dy), (0, 0));
        assert_eq!(sink.events.lock().len(), 12);
    }
}
