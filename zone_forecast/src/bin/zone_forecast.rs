//! Command-line entry point for the batch forecasting pipeline

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use zone_forecast::{Pipeline, PipelineConfig};

/// Backtested next-hour price models per pricing zone
#[derive(Parser)]
#[command(name = "zone-forecast")]
#[command(version)]
#[command(about = "Align prices, build features, select and evaluate one model per zone")]
struct Cli {
    /// Path to the TOML configuration; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("tracing subscriber already installed");
        }
    }
}

fn run(cli: &Cli) -> zone_forecast::Result<()> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let run = Pipeline::new(config)?.run_from_files()?;

    for (zone, result) in &run.zones {
        match result {
            Ok(outcome) => {
                println!("{} {}", zone, outcome.model.hyperparameters());
                print!("{}", outcome.evaluation);
                println!("  Persistence MAE: {}", outcome.baseline.mae);
            }
            Err(e) => println!("{} failed: {}", zone, e),
        }
    }
    info!(
        completed = run.succeeded().len(),
        failed = run.failed().len(),
        "pipeline finished"
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.init_logging();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
