//! The master clock: batch registry, execution loop and division tick.
//!
//! One dedicated thread runs the loop. Each pass collects every due batch
//! under the registry lock, runs them with the lock released, then moves
//! looping batches forward and computes the next wake-up. The time a pass
//! spends is accumulated and handed to the next division tick as a
//! correction, which keeps the lookahead buffer from drifting late.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle, ThreadId},
    time::{Duration, Instant},
};

use crate::{
    config::DEFAULT_LEAD_TIME_US, Action, BatchRegistry, ClockConfig, ClockError,
    LookaheadBuffer, ProcessTimer, Registration, Result, Tempo,
};

/// Tag of the reserved batch that advances the lookahead buffer.
pub const TICK_TAG: &str = "division-tick";

const PASS_TIMER: &str = "scheduler-pass";

struct ClockShared {
    tempo: Mutex<Tempo>,
    lead_time: Duration,
    registry: Mutex<BatchRegistry>,
    buffer: Arc<LookaheadBuffer>,
    divisions: Arc<AtomicU64>,
    timer: ProcessTimer,
    loop_thread: Mutex<Option<ThreadId>>,
    doorbell: Mutex<bool>,
    doorbell_signal: Condvar,
}

impl ClockShared {
    fn lock_registry(&self) -> MutexGuard<'_, BatchRegistry> {
        // Actions contain their own panics; the registry is never left half-updated.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tempo(&self) -> Tempo {
        *self.tempo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_loop_thread(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.loop_thread.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wakes the loop before its computed deadline.
    fn ring(&self) {
        let mut rung = self.doorbell.lock().unwrap_or_else(PoisonError::into_inner);
        *rung = true;
        self.doorbell_signal.notify_one();
    }

    /// Sleeps for `timeout` or until [`ring`](Self::ring) is called.
    fn sleep(&self, timeout: Duration) {
        let rung = self.doorbell.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut rung, _) = self
            .doorbell_signal
            .wait_timeout_while(rung, timeout, |rung| !*rung)
            .unwrap_or_else(PoisonError::into_inner);
        *rung = false;
    }
}

/// A live execution loop and the flag that ends it. Each run gets its own
/// flag so a later `start` can never revive a loop that was told to quit.
struct LoopRun {
    handle: JoinHandle<()>,
    quit: Arc<AtomicBool>,
}

impl LoopRun {
    fn signal(&self, shared: &ClockShared) {
        self.quit.store(true, Ordering::Release);
        shared.ring();
    }

    fn join(self) {
        if self.handle.join().is_err() {
            tracing::error!("master clock thread terminated abnormally");
        }
    }
}

/// Beat-synchronised scheduler driving the looper instrument.
///
/// `MasterClock` is `Sync`; share it behind an [`Arc`] to register work from
/// several threads. Callbacks should capture what they need through shared
/// ownership (or a [`std::sync::Weak`] back to the clock) rather than the
/// object that scheduled them.
pub struct MasterClock {
    shared: Arc<ClockShared>,
    /// Held for the whole of `start` and `stop`, joins included.
    lifecycle: Mutex<()>,
    thread: Mutex<Option<LoopRun>>,
    /// Loop told to quit from its own thread; joined by the next `start`.
    retired: Mutex<Option<LoopRun>>,
}

impl Default for MasterClock {
    fn default() -> Self {
        Self::new(Tempo::default())
    }
}

impl MasterClock {
    pub fn new(tempo: Tempo) -> Self {
        Self::with_lead_time(tempo, Duration::from_micros(DEFAULT_LEAD_TIME_US))
    }

    pub fn with_lead_time(tempo: Tempo, lead_time: Duration) -> Self {
        Self {
            shared: Arc::new(ClockShared {
                tempo: Mutex::new(tempo),
                lead_time,
                registry: Mutex::new(BatchRegistry::new()),
                buffer: Arc::new(LookaheadBuffer::new()),
                divisions: Arc::new(AtomicU64::new(0)),
                timer: ProcessTimer::new(),
                loop_thread: Mutex::new(None),
                doorbell: Mutex::new(false),
                doorbell_signal: Condvar::new(),
            }),
            lifecycle: Mutex::new(()),
            thread: Mutex::new(None),
            retired: Mutex::new(None),
        }
    }

    pub fn with_tempo(bpm: f64, beat_divisions: u32) -> Result<Self> {
        Ok(Self::new(Tempo::new(bpm, beat_divisions)?))
    }

    pub fn from_config(config: &ClockConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_lead_time(config.tempo()?, config.lead_time()))
    }

    pub fn tempo(&self) -> Tempo {
        self.shared.tempo()
    }

    pub fn bpm(&self) -> f64 {
        self.tempo().bpm()
    }

    pub fn beat_divisions(&self) -> u32 {
        self.tempo().beat_divisions()
    }

    /// Changes the BPM while the clock is stopped. Non-positive values, and
    /// any change while running, are ignored and the previous BPM is kept.
    pub fn set_bpm(&self, bpm: f64) -> bool {
        if self.is_running() {
            tracing::warn!(bpm, "ignoring bpm change while the clock is running");
            return false;
        }
        let accepted = self
            .shared
            .tempo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_bpm(bpm);
        if accepted {
            tracing::debug!(bpm, "bpm updated");
        } else {
            tracing::warn!(bpm, "ignoring non-positive bpm");
        }
        accepted
    }

    pub fn division_duration(&self) -> Duration {
        self.tempo().division_duration()
    }

    pub fn lead_time(&self) -> Duration {
        self.shared.lead_time
    }

    /// Interval used for tick-aligned work: one division minus the lead time.
    pub fn tick_interval(&self) -> Duration {
        let division = self.division_duration();
        division
            .checked_sub(self.shared.lead_time)
            .filter(|interval| !interval.is_zero())
            .unwrap_or(division)
    }

    /// Registers `task` under `tag`, due every `interval` when `looping`.
    ///
    /// A tag already holding a batch with the same interval gains another
    /// action; a different interval replaces the batch. A zero interval or
    /// the reserved [`TICK_TAG`] is rejected without effect.
    pub fn schedule<F>(&self, task: F, interval: Duration, tag: &str, looping: bool) -> Registration
    where
        F: FnMut() + Send + 'static,
    {
        if tag == TICK_TAG {
            tracing::warn!(tag, "tag is reserved for the division tick");
            return Registration::Rejected;
        }
        self.register(Action::new(task), interval, tag, looping)
    }

    /// [`schedule`](Self::schedule) at [`tick_interval`](Self::tick_interval).
    pub fn schedule_tick<F>(&self, task: F, tag: &str, looping: bool) -> Registration
    where
        F: FnMut() + Send + 'static,
    {
        self.schedule(task, self.tick_interval(), tag, looping)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.shared.lock_registry().contains(tag)
    }

    /// Removes the batch under `tag`. Returns whether one was registered.
    pub fn cancel(&self, tag: &str) -> bool {
        if tag == TICK_TAG {
            tracing::warn!(tag, "the division tick cannot be cancelled");
            return false;
        }
        let removed = self.shared.lock_registry().cancel(tag).is_some();
        if removed {
            tracing::debug!(tag, "batch cancelled");
        }
        removed
    }

    /// Tags of all registered batches in execution order.
    pub fn batch_tags(&self) -> Vec<String> {
        self.shared.lock_registry().tags()
    }

    /// Reads the lookahead buffer; see [`LookaheadBuffer::get`].
    pub fn division_timestamp(&self, index: isize) -> Option<Instant> {
        self.shared.buffer.get(index)
    }

    pub fn division_timestamps(&self) -> Vec<Instant> {
        self.shared.buffer.snapshot()
    }

    /// Blocks until the division tick next runs.
    pub fn wait_for_buffer_update(&self) {
        self.shared.buffer.wait_for_update();
    }

    pub fn wait_for_buffer_update_timeout(&self, timeout: Duration) -> bool {
        self.shared.buffer.wait_for_update_timeout(timeout)
    }

    /// Ticks since the last `start`.
    pub fn division_count(&self) -> u64 {
        self.shared.divisions.load(Ordering::Acquire)
    }

    pub fn current_division_of_beat(&self) -> u32 {
        let divisions = u64::from(self.beat_divisions());
        (self.division_count() % divisions) as u32
    }

    pub fn process_timer(&self) -> &ProcessTimer {
        &self.shared.timer
    }

    pub fn is_running(&self) -> bool {
        self.lock_thread().is_some()
    }

    /// Seeds the lookahead buffer, installs the division tick and launches
    /// the execution loop thread. Waits for a concurrent `stop` to finish.
    pub fn start(&self) -> Result<()> {
        self.refuse_on_loop_thread()?;
        let _lifecycle = self.lock_lifecycle();
        self.start_locked()
    }

    /// Validates and applies a new tempo, then starts.
    pub fn start_with(&self, bpm: f64, beat_divisions: u32) -> Result<()> {
        self.refuse_on_loop_thread()?;
        let _lifecycle = self.lock_lifecycle();
        if self.is_running() {
            tracing::warn!("master clock start requested while running");
            return Err(ClockError::AlreadyRunning);
        }
        let tempo = Tempo::new(bpm, beat_divisions)?;
        *self.shared.tempo.lock().unwrap_or_else(PoisonError::into_inner) = tempo;
        self.start_locked()
    }

    /// Signals the loop to quit and joins it. Safe to call repeatedly.
    ///
    /// Called from inside a scheduled action (including a `Drop` of the
    /// last handle there) it only signals; the loop ends after the current
    /// pass.
    pub fn stop(&self) {
        if self.on_loop_thread() {
            let mut slot = self.lock_thread();
            if let Some(run) = slot.take() {
                run.signal(&self.shared);
                self.shared.lock_registry().cancel(TICK_TAG);
                *self.lock_retired() = Some(run);
                tracing::debug!("master clock stopped from its own loop");
            }
            return;
        }

        let _lifecycle = self.lock_lifecycle();
        if let Some(retired) = self.lock_retired().take() {
            retired.join();
        }
        let Some(run) = self.lock_thread().take() else {
            return;
        };
        run.signal(&self.shared);
        run.join();
        self.shared.lock_registry().cancel(TICK_TAG);
        tracing::debug!("master clock stopped");
    }

    /// Body of `start`; the caller holds the lifecycle lock.
    fn start_locked(&self) -> Result<()> {
        let mut slot = loop {
            let slot = self.lock_thread();
            if slot.is_some() {
                tracing::warn!("master clock start requested while running");
                return Err(ClockError::AlreadyRunning);
            }
            let retired = self.lock_retired().take();
            let Some(retired) = retired else {
                break slot;
            };
            // Its actions may still query the clock, so join unlocked.
            drop(slot);
            retired.join();
        };

        let tempo = self.tempo();
        let division = tempo.division_duration();
        self.shared.divisions.store(0, Ordering::Release);
        self.shared.buffer.seed(Instant::now(), division);
        self.install_tick(division);

        let quit = Arc::new(AtomicBool::new(false));
        let shared = self.shared.clone();
        let loop_quit = quit.clone();
        let handle = thread::Builder::new()
            .name("master-clock".to_string())
            .spawn(move || run(&shared, &loop_quit))
            .map_err(|err| {
                self.shared.lock_registry().cancel(TICK_TAG);
                ClockError::from(err)
            })?;
        *slot = Some(LoopRun { handle, quit });

        tracing::debug!(
            bpm = tempo.bpm(),
            beat_divisions = tempo.beat_divisions(),
            division_us = division.as_micros() as u64,
            "master clock started"
        );
        Ok(())
    }

    fn on_loop_thread(&self) -> bool {
        *self.shared.lock_loop_thread() == Some(thread::current().id())
    }

    fn refuse_on_loop_thread(&self) -> Result<()> {
        if self.on_loop_thread() {
            tracing::warn!("master clock start requested from its own loop");
            return Err(ClockError::AlreadyRunning);
        }
        Ok(())
    }

    fn register(&self, action: Action, interval: Duration, tag: &str, looping: bool) -> Registration {
        if interval.is_zero() {
            tracing::warn!(tag, "ignoring schedule with a zero interval");
            return Registration::Rejected;
        }

        let outcome =
            self.shared
                .lock_registry()
                .register(action, interval, tag, looping, Instant::now());
        if matches!(outcome, Registration::Created | Registration::Replaced) {
            // The new batch may be due before the loop's current deadline.
            self.shared.ring();
        }
        tracing::debug!(
            tag,
            interval_us = interval.as_micros() as u64,
            looping,
            ?outcome,
            "batch registered"
        );
        outcome
    }

    fn install_tick(&self, division: Duration) {
        let buffer = self.shared.buffer.clone();
        let divisions = self.shared.divisions.clone();
        let tick = Action::with_correction(move |correction| {
            divisions.fetch_add(1, Ordering::AcqRel);
            let next = buffer.advance(division, correction);
            tracing::trace!(
                correction_us = correction.as_micros() as u64,
                next_in_us = next.saturating_duration_since(Instant::now()).as_micros() as u64,
                "division tick"
            );
        });

        let mut registry = self.shared.lock_registry();
        registry.cancel(TICK_TAG);
        registry.register(tick, self.tick_interval(), TICK_TAG, true, Instant::now());
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_thread(&self) -> MutexGuard<'_, Option<LoopRun>> {
        self.thread.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_retired(&self) -> MutexGuard<'_, Option<LoopRun>> {
        self.retired.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MasterClock {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MasterClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterClock")
            .field("tempo", &self.tempo())
            .field("lead_time", &self.shared.lead_time)
            .field("running", &self.is_running())
            .finish()
    }
}

/// The execution loop. Runs until `quit` is raised.
fn run(shared: &ClockShared, quit: &AtomicBool) {
    let me = thread::current().id();
    *shared.lock_loop_thread() = Some(me);
    let idle_wait = shared.tempo().division_duration();
    let mut correction = Duration::ZERO;

    while !quit.load(Ordering::Acquire) {
        shared.timer.start(PASS_TIMER);
        let now = Instant::now();

        let due = shared.lock_registry().due(now);
        for batch in &due {
            if batch.tag == TICK_TAG {
                batch.handle.execute_all_with_correction(correction);
                correction = Duration::ZERO;
            } else {
                batch.handle.execute_all();
            }
        }

        let next_wake = {
            let mut registry = shared.lock_registry();
            for batch in &due {
                registry.complete(batch.key, now);
            }
            registry.next_wake()
        };

        shared.timer.stop(PASS_TIMER);
        let processing = shared.timer.take(PASS_TIMER).unwrap_or_default();
        correction += processing;

        let sleep = next_wake
            .map(|wake| wake.saturating_duration_since(now).saturating_sub(processing))
            .unwrap_or(idle_wait);
        tracing::trace!(
            due = due.len(),
            processing_us = processing.as_micros() as u64,
            sleep_us = sleep.as_micros() as u64,
            "scheduler pass"
        );
        shared.sleep(sleep);
    }

    let mut loop_thread = shared.lock_loop_thread();
    if *loop_thread == Some(me) {
        *loop_thread = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{atomic::AtomicUsize, mpsc};

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = calls.clone();
        (calls, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn division_duration_follows_tempo() {
        let clock = MasterClock::with_tempo(120.0, 8).unwrap();
        assert_eq!(clock.division_duration(), Duration::from_micros(62_500));
        assert_eq!(clock.tick_interval(), Duration::from_micros(62_000));
    }

    #[test]
    fn set_bpm_rejects_non_positive_values() {
        let clock = MasterClock::default();
        assert!(!clock.set_bpm(0.0));
        assert!(!clock.set_bpm(-90.0));
        assert_eq!(clock.bpm(), 120.0);

        assert!(clock.set_bpm(60.0));
        assert_eq!(clock.division_duration(), Duration::from_millis(125));
    }

    #[test]
    fn schedule_merges_replaces_and_cancels() {
        let clock = MasterClock::default();
        let interval = Duration::from_millis(100);

        assert_eq!(clock.schedule(|| {}, interval, "X", true), Registration::Created);
        assert_eq!(clock.schedule(|| {}, interval, "X", true), Registration::Merged);
        assert_eq!(
            clock.schedule(|| {}, Duration::from_millis(50), "X", true),
            Registration::Replaced
        );
        assert_eq!(clock.batch_tags(), vec!["X".to_string()]);

        assert!(clock.cancel("X"));
        assert!(!clock.contains("X"));
        assert!(!clock.cancel("X"));
        assert!(!clock.cancel("never-registered"));
    }

    #[test]
    fn rejects_zero_interval_and_reserved_tag() {
        let clock = MasterClock::default();
        assert_eq!(
            clock.schedule(|| {}, Duration::ZERO, "X", true),
            Registration::Rejected
        );
        assert_eq!(
            clock.schedule(|| {}, Duration::from_millis(5), TICK_TAG, true),
            Registration::Rejected
        );
        assert!(clock.batch_tags().is_empty());
    }

    #[test]
    fn start_and_stop_lifecycle() {
        let clock = MasterClock::with_tempo(240.0, 4).unwrap();
        assert!(!clock.is_running());

        clock.start().unwrap();
        assert!(clock.is_running());
        assert!(matches!(clock.start(), Err(ClockError::AlreadyRunning)));
        assert!(!clock.set_bpm(100.0));
        assert!(clock.batch_tags().contains(&TICK_TAG.to_string()));
        assert!(!clock.cancel(TICK_TAG));

        clock.stop();
        clock.stop();
        assert!(!clock.is_running());
        assert!(!clock.contains(TICK_TAG));

        // A stopped clock can be restarted.
        clock.start().unwrap();
        assert!(clock.wait_for_buffer_update_timeout(Duration::from_secs(2)));
        clock.stop();
    }

    #[test]
    fn start_seeds_two_future_divisions() {
        let clock = MasterClock::with_tempo(60.0, 1).unwrap();
        let before = Instant::now();
        clock.start().unwrap();

        let first = clock.division_timestamp(0).unwrap();
        let second = clock.division_timestamp(1).unwrap();
        clock.stop();

        assert!(first >= before + Duration::from_secs(1));
        assert_eq!(second - first, Duration::from_secs(1));
        assert_eq!(clock.division_timestamp(5), None);
    }

    #[test]
    fn start_with_applies_tempo() {
        let clock = MasterClock::default();
        assert!(clock.start_with(0.0, 4).is_err());
        assert!(!clock.is_running());

        clock.start_with(150.0, 4).unwrap();
        assert_eq!(clock.bpm(), 150.0);
        assert_eq!(clock.division_duration(), Duration::from_millis(100));
        clock.stop();
    }

    #[test]
    fn runs_looping_batches_repeatedly() {
        let clock = MasterClock::default();
        let (calls, task) = counter();
        clock.schedule(task, Duration::from_millis(10), "fast", true);

        clock.start().unwrap();
        thread::sleep(Duration::from_millis(150));
        clock.stop();

        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert!(clock.contains("fast"));
    }

    #[test]
    fn cancelled_batch_never_fires() {
        let clock = MasterClock::default();
        clock.start().unwrap();

        let (calls, task) = counter();
        clock.schedule(task, Duration::from_millis(100), "loop1", true);
        assert!(clock.cancel("loop1"));

        thread::sleep(Duration::from_millis(250));
        clock.stop();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn one_shot_runs_once_and_leaves() {
        let clock = MasterClock::default();
        clock.start().unwrap();

        let (calls, task) = counter();
        clock.schedule(task, Duration::from_millis(10), "once", false);
        thread::sleep(Duration::from_millis(120));
        clock.stop();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!clock.contains("once"));
    }

    #[test]
    fn panicking_callback_does_not_stop_the_loop() {
        let clock = MasterClock::default();
        clock.schedule(|| panic!("broken sample"), Duration::from_millis(10), "bad", true);
        let (calls, task) = counter();
        clock.schedule(task, Duration::from_millis(10), "good", true);

        clock.start().unwrap();
        thread::sleep(Duration::from_millis(120));
        assert!(clock.wait_for_buffer_update_timeout(Duration::from_secs(1)));
        clock.stop();

        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert!(clock.contains("bad"));
    }

    #[test]
    fn start_waits_for_a_concurrent_stop() {
        let clock = Arc::new(MasterClock::default());
        clock.schedule(
            || thread::sleep(Duration::from_millis(300)),
            Duration::from_millis(10),
            "slow",
            true,
        );
        clock.start().unwrap();
        // Let the loop enter the slow action.
        thread::sleep(Duration::from_millis(50));

        let (stopped_tx, stopped_rx) = mpsc::channel();
        let stopper = {
            let clock = clock.clone();
            thread::spawn(move || {
                clock.stop();
                let _ = stopped_tx.send(());
            })
        };
        thread::sleep(Duration::from_millis(50));
        let starter = {
            let clock = clock.clone();
            thread::spawn(move || clock.start())
        };

        assert!(
            stopped_rx.recv_timeout(Duration::from_secs(3)).is_ok(),
            "stop did not return while a start was pending"
        );
        stopper.join().unwrap();
        assert!(starter.join().unwrap().is_ok());
        assert!(clock.is_running());
        assert!(clock.wait_for_buffer_update_timeout(Duration::from_secs(2)));

        let (final_tx, final_rx) = mpsc::channel();
        thread::spawn(move || {
            clock.stop();
            let _ = final_tx.send(clock.is_running());
        });
        assert_eq!(final_rx.recv_timeout(Duration::from_secs(3)), Ok(false));
    }

    #[test]
    fn dropping_the_last_handle_inside_an_action_ends_the_loop() {
        let clock = Arc::new(MasterClock::default());
        let (pulses, pulse) = counter();
        clock.schedule(pulse, Duration::from_millis(10), "pulse", true);

        let finished = Arc::new(AtomicBool::new(false));
        let done = finished.clone();
        let weak = Arc::downgrade(&clock);
        clock.schedule(
            move || {
                let held = weak.upgrade();
                thread::sleep(Duration::from_millis(100));
                // Last strong handle: the clock drops on its own loop thread.
                drop(held);
                done.store(true, Ordering::SeqCst);
            },
            Duration::from_millis(20),
            "owner",
            false,
        );

        clock.start().unwrap();
        thread::sleep(Duration::from_millis(60));
        drop(clock);
        thread::sleep(Duration::from_millis(150));

        assert!(finished.load(Ordering::SeqCst));
        let settled = pulses.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(pulses.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn stop_from_an_action_is_joined_by_the_next_start() {
        let clock = Arc::new(MasterClock::default());
        let refused = Arc::new(AtomicBool::new(false));
        let restart_refused = refused.clone();
        let weak = Arc::downgrade(&clock);
        clock.schedule(
            move || {
                if let Some(clock) = weak.upgrade() {
                    clock.stop();
                    restart_refused.store(clock.start().is_err(), Ordering::SeqCst);
                }
            },
            Duration::from_millis(10),
            "halt",
            false,
        );

        clock.start().unwrap();
        thread::sleep(Duration::from_millis(80));
        assert!(refused.load(Ordering::SeqCst));
        assert!(!clock.is_running());
        assert!(!clock.contains(TICK_TAG));

        clock.start().unwrap();
        assert!(clock.wait_for_buffer_update_timeout(Duration::from_secs(1)));
        clock.stop();
        assert!(!clock.is_running());
    }

    #[test]
    fn callbacks_can_reach_the_clock_through_a_weak_handle() {
        let clock = Arc::new(MasterClock::default());
        let (victim_calls, victim) = counter();
        clock.schedule(victim, Duration::from_millis(300), "victim", true);

        let weak = Arc::downgrade(&clock);
        clock.schedule(
            move || {
                if let Some(clock) = weak.upgrade() {
                    clock.cancel("victim");
                }
            },
            Duration::from_millis(10),
            "killer",
            false,
        );

        clock.start().unwrap();
        thread::sleep(Duration::from_millis(400));
        clock.stop();

        assert_eq!(victim_calls.load(Ordering::SeqCst), 0);
        assert!(!clock.contains("victim"));
        assert!(!clock.contains("killer"));
    }

    #[test]
    fn counts_divisions_within_the_beat() {
        let clock = MasterClock::with_tempo(480.0, 4).unwrap();
        clock.start().unwrap();
        for _ in 0..6 {
            assert!(clock.wait_for_buffer_update_timeout(Duration::from_secs(1)));
        }
        clock.stop();

        let count = clock.division_count();
        assert!(count >= 6);
        assert_eq!(u64::from(clock.current_division_of_beat()), count % 4);
    }
}
