mod config;
mod generate;
mod list;
mod new;
mod properties;
mod registry;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::ScaffyConfig;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "scaffy")]
#[command(about = "Scaffold new projects from template archives")]
#[command(version)]
struct Args {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the bundled templates
    List,

    /// Create a project from a bundled template
    New(new::NewArgs),

    /// Create a project from a template package URL
    Generate(generate::GenerateArgs),
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn run() -> Result<i32> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = ScaffyConfig::discover()?;
    log::debug!("Using configuration {:?}", config);

    match args.command {
        Commands::List => list::execute(),
        Commands::New(new_args) => new::execute(new_args, &config),
        Commands::Generate(generate_args) => generate::execute(generate_args, &config),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("Error: {}", e);
            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}
