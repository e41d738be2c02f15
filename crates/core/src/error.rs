/// Result alias that carries the custom [`ClockError`] type.
pub type Result<T> = std::result::Result<T, ClockError>;

/// Common error type for the core crate.
///
/// Scheduling operations that are allowed to fail silently (bad intervals,
/// unknown tags, out-of-range buffer reads) never produce one of these.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Free-form failure with a readable message.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors (config files, thread spawning).
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// `start` was called on an engine whose loop thread is already alive.
    #[error("master clock is already running")]
    AlreadyRunning,
    /// Tempo values that cannot produce a positive division duration.
    #[error("invalid tempo: bpm={bpm}, beat divisions={beat_divisions}")]
    InvalidTempo { bpm: f64, beat_divisions: u32 },
}

impl ClockError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for ClockError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ClockError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_tempo_errors() {
        let err = ClockError::InvalidTempo {
            bpm: -1.0,
            beat_divisions: 8,
        };
        let text = format!("{err}");
        assert!(text.contains("bpm=-1"));
        assert!(text.contains("beat divisions=8"));
    }

    #[test]
    fn converts_plain_messages() {
        let err: ClockError = "broken".into();
        assert_eq!(format!("{err}"), "broken");
    }
}
