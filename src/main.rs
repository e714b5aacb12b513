//! rally-sim command line.
//!
//! ```bash
//! # verify two stored runs with a lower tick ceiling
//! rally-sim verify --store ./data --max-ticks 20000 run-a run-b
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::future::join_all;
use serde_json::json;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use rally_sim::{verify_stored_run, DirStore, VerifierSettings};

#[derive(Parser, Debug)]
#[command(name = "rally-sim")]
#[command(version, about = "Rally run verification", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay stored runs and write their status back
    Verify {
        /// Store root containing cars/, tracks/ and runs/
        #[arg(short, long)]
        store: PathBuf,

        /// Verifier settings JSON
        #[arg(long)]
        settings: Option<PathBuf>,

        #[arg(long)]
        max_ticks: Option<u64>,

        #[arg(long)]
        tick_rate: Option<f32>,

        #[arg(long)]
        observe_interval: Option<u64>,

        #[arg(required = true)]
        run_ids: Vec<String>,
    },
}

fn load_settings(
    path: Option<&PathBuf>,
    max_ticks: Option<u64>,
    tick_rate: Option<f32>,
    observe_interval: Option<u64>,
) -> anyhow::Result<VerifierSettings> {
    let mut settings = match path {
        Some(path) => VerifierSettings::from_json(&std::fs::read_to_string(path)?)?,
        None => VerifierSettings::default(),
    };
    if let Some(n) = max_ticks {
        settings.max_ticks = n;
    }
    if let Some(hz) = tick_rate {
        settings.tick_rate = hz;
    }
    if let Some(n) = observe_interval {
        settings.observe_interval = n;
    }
    settings.validate()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // logs go to stderr, results to stdout
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Verify { store, settings, max_ticks, tick_rate, observe_interval, run_ids } => {
            let settings = Arc::new(load_settings(settings.as_ref(), max_ticks, tick_rate, observe_interval)?);
            let store = Arc::new(DirStore::new(store));
            info!(runs = run_ids.len(), store = %store.root().display(), "starting verification");

            let jobs = run_ids.into_iter().map(|id| {
                let store = Arc::clone(&store);
                let settings = Arc::clone(&settings);
                tokio::task::spawn_blocking(move || {
                    let result = verify_stored_run(store.as_ref(), &id, &settings);
                    (id, result)
                })
            });

            let mut failures = 0usize;
            for joined in join_all(jobs).await {
                let (id, result) = joined?;
                let line = match result {
                    Ok(run) => json!({
                        "run": id,
                        "status": run.status,
                        "time": run.time,
                        "failure": run.failure,
                    }),
                    Err(e) => {
                        failures += 1;
                        error!(run = %id, error = %e, "verification failed");
                        json!({ "run": id, "error": e.to_string() })
                    }
                };
                println!("{line}");
            }
            anyhow::ensure!(failures == 0, "{failures} run(s) could not be verified");
        }
    }

    Ok(())
}
