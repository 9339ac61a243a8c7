pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use proptalk_core::config::LoadOptions;
use tracing_subscriber::EnvFilter;

use crate::commands::search::SearchArgs;

#[derive(Debug, Parser)]
#[command(
    name = "proptalk",
    about = "Proptalk operator CLI",
    long_about = "Prepare the property database, inspect configuration, run searches and chat with the assistant locally.",
    after_help = "Examples:\n  proptalk migrate\n  proptalk seed\n  proptalk search --transaction rent --location \"Dubai Marina\" --max 100000\n  proptalk chat"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a proptalk.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the demo inventory, or listings from a JSON file")]
    Seed {
        #[arg(long, help = "JSON array of properties to load instead of the demo inventory")]
        file: Option<PathBuf>,
    },
    #[command(about = "Show effective configuration values with their source; secrets are redacted")]
    Config,
    #[command(about = "Check configuration, database, inventory and extractor readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one tiered search and print the result as JSON")]
    Search(SearchArgs),
    #[command(about = "Chat with the assistant in the terminal against the configured database")]
    Chat {
        #[arg(long, default_value = "local-user", help = "User id for the chat session")]
        user: String,
    },
}

fn init_logging() {
    // Command output goes to stdout as JSON; logs stay on stderr and are quiet
    // unless RUST_LOG asks for more.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .compact()
        .try_init();
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let options = LoadOptions { config_path: cli.config, ..LoadOptions::default() };
    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed { file } => commands::seed::run(&options, file.as_deref()),
        Command::Config => commands::config::run(&options),
        Command::Doctor { json } => commands::doctor::run(&options, json),
        Command::Search(args) => commands::search::run(&options, &args),
        Command::Chat { user } => commands::chat::run(&options, &user),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
