//! Application wiring
//!
//! Builds the shared state, the key table and the run loop from a
//! [`RunConfig`] and runs them either interactively (keyboard on the main
//! task, loop on a blocking worker) or headless.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::RunConfig;
use crate::console::{self, RawModeGuard};
use crate::keys::{ActionTable, ABORT_PAYLOAD};
use crate::log::LogSink;
use crate::phases::{MeanEstimator, PhaseReport};
use crate::run_loop::{LoopExit, RunLoop};
use crate::state::{Phase, SharedRunState};

/// Key that opens sleep-interval entry
pub const SLEEP_ENTRY_KEY: u8 = b'i';

/// Outcome of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub exit: LoopExit,
    pub iterations: u64,
    pub final_phase: Phase,
    pub sleep_interval_secs: f64,
    pub phases: PhaseReport,
}

pub struct App {
    config: RunConfig,
    state: Arc<SharedRunState>,
    table: ActionTable,
}

impl App {
    pub fn new(config: RunConfig, log: Arc<dyn LogSink>) -> Self {
        let state = SharedRunState::shared(log);
        state.set_sleep_interval_seconds(config.sleep_interval_secs);
        state.set_learning_mode(config.start_learning);
        if config.start_paused {
            state.pause();
        }

        let table = ActionTable::new(Arc::clone(&state));
        register_sleep_entry(&table, &state);

        Self {
            config,
            state,
            table,
        }
    }

    pub fn state(&self) -> &Arc<SharedRunState> {
        &self.state
    }

    pub fn table(&self) -> &ActionTable {
        &self.table
    }

    fn build_loop(&self) -> RunLoop<MeanEstimator> {
        let steps = MeanEstimator::new(
            self.config.learning_samples,
            self.config.testing_samples,
            Arc::clone(self.state.log()),
        );
        RunLoop::new(Arc::clone(&self.state), steps)
    }

    fn report(&self, exit: LoopExit, steps: &MeanEstimator) -> RunReport {
        RunReport {
            exit,
            iterations: self.state.iteration(),
            final_phase: self.state.phase(),
            sleep_interval_secs: self.state.sleep_interval_secs(),
            phases: steps.report(),
        }
    }

    /// Run the loop on the calling thread
    pub fn run_blocking(&self) -> RunReport {
        let mut run_loop = self.build_loop();
        let exit = run_loop.run();
        self.report(exit, run_loop.steps())
    }

    /// Run the loop on a blocking worker; `finished` is raised when it exits
    fn spawn_loop(
        &self,
        finished: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<(LoopExit, MeanEstimator)> {
        let mut run_loop = self.build_loop();
        tokio::task::spawn_blocking(move || {
            let exit = run_loop.run();
            finished.store(true, Ordering::SeqCst);
            (exit, run_loop.into_steps())
        })
    }

    /// Run without a keyboard; Ctrl+C requests quit
    pub async fn run_headless(&self) -> anyhow::Result<RunReport> {
        let mut worker = self.spawn_loop(Arc::new(AtomicBool::new(false)));
        let (exit, steps) = tokio::select! {
            joined = &mut worker => joined?,
            _ = tokio::signal::ctrl_c() => {
                self.state.request_quit();
                worker.await?
            }
        };
        Ok(self.report(exit, &steps))
    }

    /// Run with keystrokes from the terminal, polling every `tick`
    pub async fn run_interactive(&self, tick: Duration) -> anyhow::Result<RunReport> {
        let raw = RawModeGuard::enable()?;
        self.state.log().status("Press h for the list of keys");

        let finished = Arc::new(AtomicBool::new(false));
        let worker = self.spawn_loop(Arc::clone(&finished));

        let table = self.table.clone();
        let state = Arc::clone(&self.state);
        let keys = tokio::task::spawn_blocking(move || {
            console::pump_keys(&table, &state, tick, || finished.load(Ordering::SeqCst))
        });
        let pumped = keys.await;
        if !matches!(pumped, Ok(Ok(()))) {
            self.state.request_quit();
        }

        // Quit lands after the loop's current sleep
        let (exit, steps) = worker.await?;
        drop(raw);
        pumped??;
        Ok(self.report(exit, &steps))
    }
}

/// Bind the sleep-interval entry key: first press opens extended input,
/// ENTER applies the typed seconds, ESC aborts.
fn register_sleep_entry(table: &ActionTable, state: &Arc<SharedRunState>) {
    let input = table.extended_input();
    let state = Arc::clone(state);
    table.register(
        SLEEP_ENTRY_KEY,
        "i - types a new sleep interval in seconds (ENTER applies, ESC aborts)",
        move || {
            let log = state.log();
            if !input.is_capturing() {
                input.begin_or_end(SLEEP_ENTRY_KEY);
                log.status("Sleep interval in seconds:");
                return;
            }

            let text = input.begin_or_end(SLEEP_ENTRY_KEY);
            if text == ABORT_PAYLOAD {
                log.status("Sleep interval entry aborted");
                return;
            }
            match text.trim().parse::<f64>() {
                Ok(secs) if state.set_sleep_interval_seconds(secs) => {
                    log.status(&format!("Sleep interval set to {}s", secs));
                }
                _ => log.warning(&format!("Invalid sleep interval '{}'", text)),
            }
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KEY_ENTER, KEY_ESC};
    use crate::log::MemoryLog;

    fn app(config: RunConfig) -> (App, MemoryLog) {
        let log = MemoryLog::default();
        (App::new(config, Arc::new(log.clone())), log)
    }

    fn type_keys(table: &ActionTable, keys: &[u8]) {
        for k in keys {
            table.keyboard_handler(*k);
        }
    }

    #[test]
    fn config_seeds_state() {
        let (app, _) = app(RunConfig {
            sleep_interval_secs: 0.5,
            start_paused: true,
            start_learning: false,
            ..RunConfig::default()
        });
        let s = app.state();
        assert_eq!(s.sleep_interval_secs(), 0.5);
        assert!(s.is_paused());
        assert_eq!(s.phase(), Phase::Testing);
    }

    #[test]
    fn sleep_entry_applies_typed_value() {
        let (app, log) = app(RunConfig::default());
        type_keys(app.table(), b"i0.25");
        assert!(app.table().is_capturing());
        app.table().keyboard_handler(KEY_ENTER);

        assert!(!app.table().is_capturing());
        assert_eq!(app.state().sleep_interval_secs(), 0.25);
        assert!(log.contains("Sleep interval set to 0.25s"));
    }

    #[test]
    fn sleep_entry_abort_keeps_interval() {
        let (app, log) = app(RunConfig::default());
        type_keys(app.table(), b"i9");
        app.table().keyboard_handler(KEY_ESC);

        assert!(!app.table().is_capturing());
        assert!(!app.state().is_quit_requested());
        assert_eq!(app.state().sleep_interval_secs(), 1.0);
        assert!(log.contains("aborted"));
    }

    #[test]
    fn sleep_entry_rejects_garbage() {
        let (app, log) = app(RunConfig::default());
        type_keys(app.table(), b"ifast");
        app.table().keyboard_handler(KEY_ENTER);

        assert_eq!(app.state().sleep_interval_secs(), 1.0);
        assert_eq!(log.warnings().len(), 1);
    }

    #[test]
    fn sleep_entry_refuses_too_long_interval() {
        let (app, log) = app(RunConfig::default());
        type_keys(app.table(), b"i1e30");
        app.table().keyboard_handler(KEY_ENTER);

        assert_eq!(app.state().sleep_interval_secs(), 1.0);
        assert_eq!(log.warnings(), vec!["Invalid sleep interval '1e30'".to_string()]);
        assert_eq!(app.state().sleep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn blocking_run_learns_then_tests() {
        let (app, _) = app(RunConfig {
            sleep_interval_secs: 0.0,
            learning_samples: 4,
            testing_samples: 2,
            ..RunConfig::default()
        });
        let report = app.run_blocking();

        assert_eq!(report.exit, LoopExit::Exhausted);
        assert_eq!(report.phases.learned, 4);
        assert_eq!(report.phases.tested, 2);
        // 4 + 1 learning passes, 2 + 1 testing passes
        assert_eq!(report.iterations, 8);
        assert_eq!(report.final_phase, Phase::Testing);
    }

    #[tokio::test]
    async fn headless_run_finishes() {
        let (app, _) = app(RunConfig {
            sleep_interval_secs: 0.0,
            learning_samples: 2,
            testing_samples: 1,
            ..RunConfig::default()
        });
        let report = app.run_headless().await.unwrap();
        assert_eq!(report.exit, LoopExit::Exhausted);
        assert_eq!(report.iterations, 5);
    }

    #[tokio::test]
    async fn headless_run_honours_quit() {
        let (app, _) = app(RunConfig {
            sleep_interval_secs: 0.0,
            ..RunConfig::default()
        });
        app.state().request_quit();
        let report = app.run_headless().await.unwrap();
        assert_eq!(report.exit, LoopExit::QuitRequested);
        assert_eq!(report.iterations, 0);
    }
}
