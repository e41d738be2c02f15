use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    time::Duration,
};

/// Zero-argument callback form.
pub type Task = Box<dyn FnMut() + Send>;

/// Callback form that receives the drift correction measured by the clock.
pub type CorrectedTask = Box<dyn FnMut(Duration) + Send>;

enum Callback {
    Plain(Task),
    Corrected(CorrectedTask),
}

/// A single unit of scheduled work.
///
/// Panics raised by the wrapped callback are caught and logged here so they
/// never reach the batch or the execution loop.
pub struct Action {
    callback: Callback,
    correction: Option<Duration>,
}

impl Action {
    pub fn new<F>(task: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self {
            callback: Callback::Plain(Box::new(task)),
            correction: None,
        }
    }

    pub fn with_correction<F>(task: F) -> Self
    where
        F: FnMut(Duration) + Send + 'static,
    {
        Self {
            callback: Callback::Corrected(Box::new(task)),
            correction: None,
        }
    }

    /// Whether the callback accepts a correction value.
    pub fn is_correction_aware(&self) -> bool {
        matches!(self.callback, Callback::Corrected(_))
    }

    pub fn has_correction(&self) -> bool {
        self.correction.is_some()
    }

    /// Correction handed to the next execution, zero when none is stamped.
    pub fn correction(&self) -> Duration {
        self.correction.unwrap_or(Duration::ZERO)
    }

    pub fn set_correction(&mut self, value: Duration) {
        self.correction = Some(value);
    }

    pub fn clear_correction(&mut self) {
        self.correction = None;
    }

    /// Runs the callback. Returns `false` when it panicked.
    pub fn execute(&mut self) -> bool {
        let correction = self.correction();
        let outcome = match &mut self.callback {
            Callback::Plain(task) => panic::catch_unwind(AssertUnwindSafe(|| task())),
            Callback::Corrected(task) => {
                panic::catch_unwind(AssertUnwindSafe(|| task(correction)))
            }
        };

        match outcome {
            Ok(()) => true,
            Err(payload) => {
                tracing::error!(reason = %panic_message(payload.as_ref()), "scheduled action panicked");
                false
            }
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("correction_aware", &self.is_correction_aware())
            .field("correction", &self.correction)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
