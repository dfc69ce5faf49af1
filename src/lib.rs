//! Steer - keyboard-steerable train-then-test run loop
//!
//! - [`ActionTable`] maps single keystrokes to actions, with an extended
//!   input sub-mode for short typed values
//! - [`RunLoop`] alternates learning and testing steps, gated by the
//!   flags in [`SharedRunState`]

pub mod app;
pub mod config;
pub mod console;
pub mod error;
pub mod keys;
pub mod log;
pub mod phases;
pub mod run_loop;
pub mod state;

pub use app::{App, RunReport};
pub use config::RunConfig;
pub use error::{FixSuggestion, SteerError};
pub use keys::{ActionTable, ExtendedInput, KeyEntry, ABORT_PAYLOAD, KEY_ENTER, KEY_ESC};
pub use log::{LogSink, MemoryLog, Severity, TracingLog};
pub use phases::{MeanEstimator, PhaseReport};
pub use run_loop::{LoopExit, Pacer, Pass, PhaseSteps, RunLoop, StepOutcome, ThreadSleep};
pub use state::{Phase, RunSnapshot, SharedRunState, MAX_SLEEP_SECS};
