//! Sentinel CLI - Command-line interface for relapse-sentinel
//!
//! Commands:
//! - train: Fit the classifier from a user-data JSON file
//! - predict: Assess current risk from a user-data JSON file
//! - info: Show model readiness and quality
//! - outcomes: Resolve intervention windows that elapsed

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use relapse_sentinel::engine::TrainSettings;
use relapse_sentinel::{
    EngineConfig, EpochLog, FileStore, RiskEngine, UserData, SENTINEL_VERSION,
};

/// Sentinel - On-device predictive-risk engine for behavioral relapse
/// prevention
#[derive(Parser)]
#[command(name = "sentinel")]
#[command(author = "Sentinel Labs")]
#[command(version = SENTINEL_VERSION)]
#[command(about = "Learn personal risk patterns from tracking data", long_about = None)]
struct Cli {
    /// Engine state file
    #[arg(long, global = true, default_value = "sentinel-state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the classifier from tracked history
    Train {
        /// User-data JSON file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Fixed RNG seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        /// Suppress per-epoch progress output
        #[arg(long)]
        quiet: bool,
    },

    /// Assess current relapse risk
    Predict {
        /// User-data JSON file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show model readiness and quality
    Info,

    /// Resolve intervention outcome windows that elapsed
    Outcomes,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let engine = RiskEngine::new(
        EngineConfig::default(),
        Box::new(FileStore::new(&cli.state)),
    );
    if let Err(e) = engine.initialize() {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Commands::Train { input, seed, quiet } => run_train(&engine, &input, seed, quiet),
        Commands::Predict { input } => run_predict(&engine, &input),
        Commands::Info => {
            print_json(&engine.get_model_info());
            ExitCode::SUCCESS
        }
        Commands::Outcomes => {
            let resolved = engine.check_successful_interventions();
            println!("{resolved} interventions resolved");
            ExitCode::SUCCESS
        }
    }
}

fn run_train(engine: &RiskEngine, input: &PathBuf, seed: Option<u64>, quiet: bool) -> ExitCode {
    let user = match load_user_data(input) {
        Ok(user) => user,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let progress = |log: &EpochLog| {
        eprintln!(
            "epoch {:>3}  loss {:.4}  accuracy {:.3}",
            log.epoch, log.loss, log.accuracy
        );
    };
    let settings = TrainSettings {
        progress: if quiet { None } else { Some(&progress) },
        cancel: None,
        seed,
    };

    match engine.train(&user, settings) {
        Ok(report) => {
            print_json(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_predict(engine: &RiskEngine, input: &PathBuf) -> ExitCode {
    match load_user_data(input) {
        Ok(user) => {
            print_json(&engine.predict(&user));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_user_data(path: &PathBuf) -> Result<UserData, String> {
    let raw = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| format!("reading stdin: {e}"))?;
        buffer
    } else {
        fs::read_to_string(path).map_err(|e| format!("reading {}: {e}", path.display()))?
    };
    serde_json::from_str(&raw).map_err(|e| format!("parsing user data: {e}"))
}

fn print_json<T: serde::Serialize>(value: &T) {
    let rendered = if atty::is(atty::Stream::Stdout) {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match rendered {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: {e}"),
    }
}
