//! Steer CLI - keyboard-steerable train-then-test run loop

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;

use steer::console::CrlfWriter;
use steer::{App, FixSuggestion, LoopExit, RunConfig, RunReport, SteerError, TracingLog};

/// Key polling interval in interactive mode
const KEY_POLL_TICK: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "steer")]
#[command(about = "Keyboard-steerable train-then-test run loop")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the learning and testing loop
    Run {
        /// Path to a YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Sleep interval between passes, in seconds
        #[arg(short, long)]
        sleep: Option<f64>,

        /// Number of learning samples
        #[arg(long)]
        learning: Option<usize>,

        /// Number of testing samples
        #[arg(long)]
        testing: Option<usize>,

        /// Start paused (SPACE resumes)
        #[arg(long)]
        paused: bool,

        /// Run without keyboard input
        #[arg(long)]
        headless: bool,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a config file
    Check {
        /// Path to a YAML config file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            sleep,
            learning,
            testing,
            paused,
            headless,
            json,
        } => {
            let overrides = Overrides {
                sleep,
                learning,
                testing,
                paused,
            };
            run(config, overrides, headless, json).await
        }
        Commands::Check { file } => check(&file).map_err(anyhow::Error::from),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e
            .downcast_ref::<SteerError>()
            .and_then(|e| e.fix_suggestion())
        {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

struct Overrides {
    sleep: Option<f64>,
    learning: Option<usize>,
    testing: Option<usize>,
    paused: bool,
}

impl Overrides {
    fn apply(self, config: &mut RunConfig) {
        if let Some(s) = self.sleep {
            config.sleep_interval_secs = s;
        }
        if let Some(n) = self.learning {
            config.learning_samples = n;
        }
        if let Some(n) = self.testing {
            config.testing_samples = n;
        }
        if self.paused {
            config.start_paused = true;
        }
    }
}

fn init_tracing(raw_terminal: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("steer=trace"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if raw_terminal {
        builder
            .with_writer(|| CrlfWriter::new(std::io::stderr()))
            .init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
}

async fn run(
    config_path: Option<PathBuf>,
    overrides: Overrides,
    headless: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;

    init_tracing(!headless);

    let log = TracingLog::shared(config.severity);
    let app = App::new(config, log);

    let report = if headless {
        app.run_headless().await?
    } else {
        app.run_interactive(KEY_POLL_TICK).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let exit = match report.exit {
        LoopExit::Exhausted => "finished".green(),
        LoopExit::QuitRequested => "quit".yellow(),
    };
    println!("{} Run {} after {} iterations", "→".cyan(), exit, report.iterations);
    println!("  Phase: {}", report.final_phase);
    println!(
        "  Learned: {} samples | Tested: {} samples",
        report.phases.learned, report.phases.tested
    );
    println!("  Estimate: {:.3}", report.phases.estimate);
    match report.phases.mean_absolute_error {
        Some(mae) => println!("  Mean absolute error: {:.3}", mae),
        None => println!("  Mean absolute error: (not tested)"),
    }
    println!("  Sleep interval: {:.3}s", report.sleep_interval_secs);
}

fn check(file: &Path) -> Result<(), SteerError> {
    let config = RunConfig::load(file)?;

    println!("{} Config '{}' is valid", "✓".green(), file.display());
    println!("  Sleep interval: {}s", config.sleep_interval_secs);
    println!("  Start paused: {}", config.start_paused);
    println!("  Start learning: {}", config.start_learning);
    println!("  Severity: {}", config.severity);
    println!("  Learning samples: {}", config.learning_samples);
    println!("  Testing samples: {}", config.testing_samples);

    Ok(())
}
