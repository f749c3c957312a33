pub mod commands;

use clap::{Parser, Subcommand};
use parley_core::config::{AppConfig, LoadOptions, LogFormat};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    about = "Parley operator CLI",
    long_about = "Check readiness, apply migrations, inspect configuration and talk to the comment assistant.",
    after_help = "Examples:\n  parley doctor --json\n  parley ask --thread demo \"Kaç yorum var?\"\n  parley history demo"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model settings, database and checkpoint store reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Ask one question in a conversation thread")]
    Ask {
        #[arg(long, default_value = "cli", help = "Conversation thread to continue")]
        thread: String,
        #[arg(long, default_value = "operator", help = "User id recorded on the turn")]
        user: String,
        #[arg(help = "The question, in any language")]
        question: String,
    },
    #[command(about = "Print the stored transcript of a conversation thread")]
    History {
        #[arg(help = "Conversation thread id")]
        thread: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Ask { thread, user, question } => commands::ask::run(&thread, &user, &question),
        Command::History { thread } => commands::history::run(&thread),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Diagnostics go to stderr so stdout stays a single JSON payload. Without a loadable
/// config the commands report the problem themselves, so logging stays at `warn`.
fn init_logging() {
    let (level, format) = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => (config.logging.level, config.logging.format),
        Err(_) => ("warn".to_string(), LogFormat::Compact),
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let builder =
        tracing_subscriber::fmt().with_target(false).with_writer(std::io::stderr).with_env_filter(filter);

    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}
