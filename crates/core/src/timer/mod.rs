use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy)]
struct Record {
    started: Instant,
    stopped: Option<Instant>,
}

/// Named stopwatches. Starting a name that is already running restarts it;
/// a finished measurement is handed out once by [`take`](Self::take).
#[derive(Debug, Default)]
pub struct ProcessTimer {
    records: Mutex<HashMap<String, Record>>,
}

impl ProcessTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, name: &str) {
        self.lock().insert(
            name.to_string(),
            Record {
                started: Instant::now(),
                stopped: None,
            },
        );
    }

    /// Stops a running stopwatch and returns the measured duration.
    pub fn stop(&self, name: &str) -> Option<Duration> {
        let mut records = self.lock();
        let record = records.get_mut(name)?;
        let stopped = Instant::now();
        record.stopped = Some(stopped);
        Some(stopped.duration_since(record.started))
    }

    /// Removes and returns a completed measurement. Running or unknown
    /// stopwatches yield `None` and stay untouched.
    pub fn take(&self, name: &str) -> Option<Duration> {
        let mut records = self.lock();
        let record = *records.get(name)?;
        let stopped = record.stopped?;
        records.remove(name);
        Some(stopped.duration_since(record.started))
    }

    /// Time since `name` was started, without stopping it.
    pub fn elapsed(&self, name: &str) -> Option<Duration> {
        self.lock().get(name).map(|record| {
            record
                .stopped
                .unwrap_or_else(Instant::now)
                .duration_since(record.started)
        })
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.lock()
            .get(name)
            .is_some_and(|record| record.stopped.is_none())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn measures_and_hands_out_once() {
        let timer = ProcessTimer::new();
        timer.start("render");
        assert!(timer.is_running("render"));
        assert_eq!(timer.take("render"), None);

        thread::sleep(Duration::from_millis(2));
        let stopped = timer.stop("render").unwrap();
        assert!(stopped >= Duration::from_millis(2));

        assert_eq!(timer.take("render"), Some(stopped));
        assert_eq!(timer.take("render"), None);
    }

    #[test]
    fn unknown_names_are_none() {
        let timer = ProcessTimer::new();
        assert_eq!(timer.stop("missing"), None);
        assert_eq!(timer.elapsed("missing"), None);
        assert!(!timer.is_running("missing"));
    }
}
