//! Train-then-test run loop
//!
//! Each pass:
//!
//! 1. quit requested → stop
//! 2. paused → skip to pacing
//! 3. single step → pause now, but still run this pass
//! 4. take the scoped lock, bump the iteration counter
//! 5. run one phase step; an exhausted testing phase stops the loop
//! 6. sleep for the interval read fresh from the shared state
//!
//! Phases only move forward (learning → testing) unless a key action flips
//! the learning flag back on. Sleeps are not interrupted: a quit requested
//! mid-sleep is seen on the next pass.

use std::sync::Arc;
use std::time::Duration;

use crate::state::SharedRunState;

/// Result reported by a phase step collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// More samples remain in this phase
    MoreWork,
    /// This phase has nothing left to do
    Exhausted,
}

/// The learning and testing work driven by the loop
pub trait PhaseSteps: Send {
    fn learning_step(&mut self, iteration: u64) -> StepOutcome;
    fn testing_step(&mut self, iteration: u64) -> StepOutcome;
}

/// Pacing between passes
pub trait Pacer: Send {
    fn pause_for(&mut self, interval: Duration);
}

/// Blocking `thread::sleep` pacer
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Pacer for ThreadSleep {
    fn pause_for(&mut self, interval: Duration) {
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }
}

/// What a single pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Quit was requested; nothing ran
    Quit,
    /// Paused; nothing ran
    Idle,
    /// One phase step ran, more to come
    Stepped,
    /// One phase step ran and testing is exhausted
    Finished,
}

/// Why [`RunLoop::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopExit {
    QuitRequested,
    Exhausted,
}

pub struct RunLoop<S> {
    state: Arc<SharedRunState>,
    steps: S,
    pacer: Box<dyn Pacer>,
}

impl<S: PhaseSteps> RunLoop<S> {
    pub fn new(state: Arc<SharedRunState>, steps: S) -> Self {
        Self {
            state,
            steps,
            pacer: Box::new(ThreadSleep),
        }
    }

    pub fn with_pacer(mut self, pacer: impl Pacer + 'static) -> Self {
        self.pacer = Box::new(pacer);
        self
    }

    pub fn state(&self) -> &Arc<SharedRunState> {
        &self.state
    }

    pub fn steps(&self) -> &S {
        &self.steps
    }

    pub fn into_steps(self) -> S {
        self.steps
    }

    /// Run passes until quit is requested or testing is exhausted
    pub fn run(&mut self) -> LoopExit {
        self.state.log().trace("RunLoop::run");
        loop {
            match self.pass() {
                Pass::Quit => return LoopExit::QuitRequested,
                Pass::Finished => {
                    self.state.log().status("Testing finished, leaving run loop");
                    return LoopExit::Exhausted;
                }
                Pass::Idle | Pass::Stepped => {}
            }
            let interval = self.state.sleep_interval();
            self.pacer.pause_for(interval);
        }
    }

    /// Steps 1-5 of a pass, without pacing
    pub fn pass(&mut self) -> Pass {
        if self.state.is_quit_requested() {
            return Pass::Quit;
        }
        if self.state.is_paused() {
            return Pass::Idle;
        }
        if self.state.is_single_step_requested() {
            self.state.pause();
        }

        let state = Arc::clone(&self.state);
        let _guard = state.acquire_scoped_lock();
        let iteration = state.next_iteration();

        if self.perform_single_step(iteration) {
            Pass::Stepped
        } else {
            Pass::Finished
        }
    }

    /// Run one step of the current phase. Returns false once the testing
    /// phase is exhausted; an exhausted learning phase switches to testing
    /// and keeps going.
    pub fn perform_single_step(&mut self, iteration: u64) -> bool {
        if self.state.is_learning_mode_on() {
            if self.steps.learning_step(iteration) == StepOutcome::Exhausted {
                self.state.set_learning_mode(false);
                self.state
                    .log()
                    .status("Learning finished, switching to testing");
            }
            true
        } else {
            self.steps.testing_step(iteration) == StepOutcome::MoreWork
        }
    }
}
