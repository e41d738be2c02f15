//! Short FIFO of upcoming division timestamps plus the "buffer updated"
//! signal consumers block on.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

/// Number of division timestamps retained.
pub const LOOKAHEAD_CAPACITY: usize = 5;

#[derive(Debug, Default)]
struct BufferState {
    times: VecDeque<Instant>,
    updated: bool,
}

#[derive(Debug, Default)]
pub struct LookaheadBuffer {
    state: Mutex<BufferState>,
    update_signal: Condvar,
}

impl LookaheadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a timestamp, evicting the oldest once the buffer is full.
    pub fn push(&self, time: Instant) {
        let mut state = self.lock();
        push_bounded(&mut state.times, time);
    }

    /// Reads a buffered timestamp. Negative indices count from the end, so
    /// `-1` is the most recent push. Out-of-range reads return `None`, which
    /// callers treat as "not yet available".
    pub fn get(&self, index: isize) -> Option<Instant> {
        let state = self.lock();
        let len = state.times.len() as isize;
        let index = if index < 0 { index + len } else { index };
        if index < 0 || index >= len {
            return None;
        }
        state.times.get(index as usize).copied()
    }

    pub fn last(&self) -> Option<Instant> {
        self.lock().times.back().copied()
    }

    pub fn len(&self) -> usize {
        self.lock().times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().times.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Instant> {
        self.lock().times.iter().copied().collect()
    }

    /// Resets the buffer to the two divisions following `start`.
    pub fn seed(&self, start: Instant, division: Duration) {
        let mut state = self.lock();
        state.times.clear();
        state.updated = false;
        push_bounded(&mut state.times, start + division);
        push_bounded(&mut state.times, start + division * 2);
    }

    /// Tick step: flags the buffer as updated, wakes every waiter and pushes
    /// `last + division - correction`. Returns the pushed timestamp.
    pub fn advance(&self, division: Duration, correction: Duration) -> Instant {
        let mut state = self.lock();
        state.updated = true;
        self.update_signal.notify_all();

        let last = state.times.back().copied().unwrap_or_else(Instant::now);
        let next = (last + division).checked_sub(correction).unwrap_or(last);
        push_bounded(&mut state.times, next);
        next
    }

    /// Blocks until the next tick. Each call consumes one update, so the
    /// following call blocks again until a later tick.
    pub fn wait_for_update(&self) {
        let state = self.lock();
        let mut state = self
            .update_signal
            .wait_while(state, |state| !state.updated)
            .unwrap_or_else(PoisonError::into_inner);
        state.updated = false;
    }

    /// Like [`wait_for_update`](Self::wait_for_update) but gives up after
    /// `timeout`. Returns whether an update was consumed.
    pub fn wait_for_update_timeout(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (mut state, _) = self
            .update_signal
            .wait_timeout_while(state, timeout, |state| !state.updated)
            .unwrap_or_else(PoisonError::into_inner);
        if !state.updated {
            return false;
        }
        state.updated = false;
        true
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn push_bounded(times: &mut VecDeque<Instant>, time: Instant) {
    if times.len() >= LOOKAHEAD_CAPACITY {
        times.pop_front();
    }
    times.push_back(time);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    fn times(start: Instant, count: u64) -> Vec<Instant> {
        (1..=count)
            .map(|step| start + Duration::from_millis(step * 10))
            .collect()
    }

    #[test]
    fn evicts_oldest_once_full() {
        let buffer = LookaheadBuffer::new();
        let pushed = times(Instant::now(), 7);
        for time in &pushed {
            buffer.push(*time);
        }

        assert_eq!(buffer.len(), LOOKAHEAD_CAPACITY);
        assert_eq!(buffer.get(-1), Some(pushed[6]));
        // Oldest retained is the fifth most recent push.
        assert_eq!(buffer.get(0), Some(pushed[2]));
        assert_eq!(buffer.snapshot(), pushed[2..].to_vec());
    }

    #[test]
    fn negative_and_out_of_range_indices() {
        let buffer = LookaheadBuffer::new();
        assert_eq!(buffer.get(0), None);
        assert_eq!(buffer.get(-1), None);

        let pushed = times(Instant::now(), 3);
        for time in &pushed {
            buffer.push(*time);
        }

        assert_eq!(buffer.get(-3), Some(pushed[0]));
        assert_eq!(buffer.get(-4), None);
        assert_eq!(buffer.get(2), Some(pushed[2]));
        assert_eq!(buffer.get(3), None);
    }

    #[test]
    fn seed_pushes_two_future_divisions() {
        let buffer = LookaheadBuffer::new();
        buffer.push(Instant::now());
        let start = Instant::now();
        let division = Duration::from_micros(62_500);
        buffer.seed(start, division);

        assert_eq!(buffer.snapshot(), vec![start + division, start + division * 2]);
    }

    #[test]
    fn advance_applies_correction() {
        let buffer = LookaheadBuffer::new();
        let start = Instant::now();
        let division = Duration::from_millis(50);
        buffer.seed(start, division);

        let next = buffer.advance(division, Duration::from_micros(700));
        assert_eq!(next, start + division * 3 - Duration::from_micros(700));
        assert_eq!(buffer.last(), Some(next));
    }

    #[test]
    fn waiters_consume_one_update_each() {
        let buffer = LookaheadBuffer::new();
        buffer.seed(Instant::now(), Duration::from_millis(10));

        assert!(!buffer.wait_for_update_timeout(Duration::from_millis(5)));
        buffer.advance(Duration::from_millis(10), Duration::ZERO);
        assert!(buffer.wait_for_update_timeout(Duration::from_millis(5)));
        assert!(!buffer.wait_for_update_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn wait_for_update_wakes_on_advance() {
        let buffer = Arc::new(LookaheadBuffer::new());
        buffer.seed(Instant::now(), Duration::from_millis(10));

        let waiter = {
            let buffer = buffer.clone();
            thread::spawn(move || buffer.wait_for_update())
        };

        thread::sleep(Duration::from_millis(20));
        buffer.advance(Duration::from_millis(10), Duration::ZERO);
        waiter.join().expect("waiter should finish after the update");
    }
}
