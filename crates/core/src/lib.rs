//! Core library for the looper clock.
//!
//! A [`MasterClock`] owns a registry of tagged batches of actions and runs
//! them from one dedicated thread, either once or repeatedly. A reserved
//! division tick keeps a short lookahead buffer of upcoming subdivision
//! timestamps that other threads read and wait on. [`Looper`] builds the
//! instrument's loop playback on top of it.

pub mod action;
pub mod batch;
pub mod clock;
pub mod config;
pub mod error;
pub mod lookahead;
pub mod looper;
pub mod registry;
pub mod slots;
pub mod tempo;
pub mod timer;

pub use action::Action;
pub use batch::{Batch, BatchHandle};
pub use clock::{MasterClock, TICK_TAG};
pub use config::ClockConfig;
pub use error::{ClockError, Result};
pub use lookahead::{LookaheadBuffer, LOOKAHEAD_CAPACITY};
pub use looper::{Looper, LooperBank};
pub use registry::{BatchKey, BatchRegistry, DueBatch, Registration};
pub use slots::{LoopSlot, LoopSlots};
pub use tempo::Tempo;
pub use timer::ProcessTimer;
