mod cli; // Report rendering for the subcommands

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use mosaic_core::config::CompositionConfig;
use mosaic_core::kernel::Result;
use tracing_subscriber::EnvFilter;

/// Mosaic: inspect plugin modules and the parts they compose
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Simple ping command for testing
    #[arg(long)]
    ping: bool,

    /// Configuration file (JSON, TOML or YAML, by extension)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover modules under a directory and list the parts they export
    Parts {
        /// Discovery root
        dir: PathBuf,
    },
    /// Inspect candidate module files without loading them
    Modules {
        /// Directory to inspect
        dir: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // The library logs through `log`; forward those records to tracing.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
    }
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {}", e);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<CompositionConfig> {
    match path {
        Some(path) => {
            let config = CompositionConfig::load(path)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        }
        None => Ok(CompositionConfig::default()),
    }
}

fn run(args: CliArgs) -> Result<()> {
    let config = load_config(args.config.as_ref())?;
    match args.command {
        Some(Commands::Parts { dir }) => cli::list_parts(&dir, config),
        Some(Commands::Modules { dir }) => cli::inspect_modules(&dir, &config),
        None => {
            println!("No command given. Run with --help for usage.");
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    if args.ping {
        println!("pong");
        return ExitCode::SUCCESS;
    }

    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
