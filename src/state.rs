//! Shared run state
//!
//! Flags and counters read by the run loop and flipped by key actions.
//! Created once, handed out as `Arc<SharedRunState>` to every party that
//! needs it. Flag access is lock-free; the only lock is the iteration
//! critical section returned by [`SharedRunState::acquire_scoped_lock`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;

use crate::log::LogSink;

/// Factor applied by the slow-down / speed-up keys
pub const SLEEP_FACTOR: f64 = 1.5;

/// Sleep interval restored by the reset key
pub const DEFAULT_SLEEP_SECS: f64 = 1.0;

/// Longest accepted sleep interval (one day). Slow-down presses saturate here.
pub const MAX_SLEEP_SECS: f64 = 86_400.0;

/// Which step collaborator the loop drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Learning,
    Testing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Learning => write!(f, "LEARNING"),
            Self::Testing => write!(f, "TESTING"),
        }
    }
}

/// Point-in-time copy of the run state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub iteration: u64,
    pub phase: Phase,
    pub paused: bool,
    pub single_step: bool,
    pub quit: bool,
    pub sleep_interval_secs: f64,
}

pub struct SharedRunState {
    quit: AtomicBool,
    paused: AtomicBool,
    single_step: AtomicBool,
    learning: AtomicBool,
    iteration: AtomicU64,
    sleep_interval_secs: Mutex<f64>,
    sync: Mutex<()>,
    log: Arc<dyn LogSink>,
}

impl SharedRunState {
    pub fn new(log: Arc<dyn LogSink>) -> Self {
        Self {
            quit: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            single_step: AtomicBool::new(false),
            learning: AtomicBool::new(false),
            iteration: AtomicU64::new(0),
            sleep_interval_secs: Mutex::new(DEFAULT_SLEEP_SECS),
            sync: Mutex::new(()),
            log,
        }
    }

    pub fn shared(log: Arc<dyn LogSink>) -> Arc<Self> {
        Arc::new(Self::new(log))
    }

    /// Logger this state reports through
    pub fn log(&self) -> &Arc<dyn LogSink> {
        &self.log
    }

    // ─────────────────────────────────────────────────────────────
    // Quit
    // ─────────────────────────────────────────────────────────────

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    pub fn is_quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────────
    // Pause / single step
    // ─────────────────────────────────────────────────────────────

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn toggle_pause(&self) {
        self.paused.fetch_xor(true, Ordering::SeqCst);
    }

    /// Set pause without toggling (used by the loop in single-step mode)
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn is_single_step_requested(&self) -> bool {
        self.single_step.load(Ordering::SeqCst)
    }

    /// Enter single-step mode: every pass that runs pauses the loop
    /// behind it. The mode stays on, so each resume runs one pass.
    pub fn request_single_step(&self) {
        self.single_step.store(true, Ordering::SeqCst);
    }

    // ─────────────────────────────────────────────────────────────
    // Phase
    // ─────────────────────────────────────────────────────────────

    pub fn set_learning_mode(&self, on: bool) {
        self.learning.store(on, Ordering::SeqCst);
    }

    pub fn is_learning_mode_on(&self) -> bool {
        self.learning.load(Ordering::SeqCst)
    }

    pub fn toggle_learning_mode(&self) {
        self.learning.fetch_xor(true, Ordering::SeqCst);
    }

    pub fn phase(&self) -> Phase {
        if self.is_learning_mode_on() {
            Phase::Learning
        } else {
            Phase::Testing
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Sleep interval
    // ─────────────────────────────────────────────────────────────

    pub fn sleep_interval_secs(&self) -> f64 {
        *self.sleep_interval_secs.lock()
    }

    /// Interval as a `Duration`, saturating at [`MAX_SLEEP_SECS`]
    pub fn sleep_interval(&self) -> Duration {
        let secs = self.sleep_interval_secs().clamp(0.0, MAX_SLEEP_SECS);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    /// Slow down: interval × 1.5, capped at [`MAX_SLEEP_SECS`]
    pub fn multiply_sleep_interval(&self) {
        let mut secs = self.sleep_interval_secs.lock();
        *secs = (*secs * SLEEP_FACTOR).min(MAX_SLEEP_SECS);
    }

    /// Speed up: interval ÷ 1.5
    pub fn divide_sleep_interval(&self) {
        *self.sleep_interval_secs.lock() /= SLEEP_FACTOR;
    }

    /// Returns false (and keeps the old value) for negative, non-finite or
    /// over-long input
    pub fn set_sleep_interval_seconds(&self, secs: f64) -> bool {
        if !is_valid_sleep(secs) {
            return false;
        }
        *self.sleep_interval_secs.lock() = secs;
        true
    }

    // ─────────────────────────────────────────────────────────────
    // Iterations and synchronisation
    // ─────────────────────────────────────────────────────────────

    pub fn iteration(&self) -> u64 {
        self.iteration.load(Ordering::SeqCst)
    }

    /// Advance the counter and return the new value. Call with the scoped
    /// lock held.
    pub fn next_iteration(&self) -> u64 {
        self.iteration.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Critical section guarding iteration bookkeeping and the phase step.
    /// Released when the guard drops. Key actions must not take it.
    pub fn acquire_scoped_lock(&self) -> MutexGuard<'_, ()> {
        self.sync.lock()
    }

    // ─────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            iteration: self.iteration(),
            phase: self.phase(),
            paused: self.is_paused(),
            single_step: self.is_single_step_requested(),
            quit: self.is_quit_requested(),
            sleep_interval_secs: self.sleep_interval_secs(),
        }
    }

    pub fn display_status(&self) {
        let s = self.snapshot();
        self.log.status("----------------------------------------------------------------");
        self.log.status(&format!("Iteration: {}", s.iteration));
        self.log.status(&format!("Phase: {}", s.phase));
        self.log.status(&format!(
            "Paused: {} | Single step: {}",
            on_off(s.paused),
            on_off(s.single_step)
        ));
        self.log.status(&format!("Sleep interval: {:.3}s", s.sleep_interval_secs));
        self.log.status(&format!("Log threshold: {}", self.log.threshold()));
        self.log.status("----------------------------------------------------------------");
    }
}

/// Finite, non-negative and at most [`MAX_SLEEP_SECS`]
pub fn is_valid_sleep(secs: f64) -> bool {
    secs.is_finite() && (0.0..=MAX_SLEEP_SECS).contains(&secs)
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

impl fmt::Debug for SharedRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRunState")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
