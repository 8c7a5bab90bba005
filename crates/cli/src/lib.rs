pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use overtime_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat, LoggingConfig};

#[derive(Debug, Parser)]
#[command(
    name = "overtime",
    about = "Overtime workflow operator CLI",
    long_about = "Apply migrations, load the demo organization, inspect configuration, and run an end-to-end approval smoke check.",
    after_help = "Examples:\n  overtime migrate\n  overtime --database-url sqlite://plant.db seed\n  overtime config\n  overtime smoke"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read configuration from this file instead of overtime.toml")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url for this invocation")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Override logging.level for this invocation")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo organization (facility, departments, users) idempotently")]
    Seed,
    #[command(about = "Run connectivity, migration, seed and approval-chain checks with timings")]
    Smoke,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                log_level: self.log_level.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config.logging);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Smoke => commands::smoke::run(&options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout carries only the command's JSON outcome.
fn init_logging(config: &LoggingConfig) {
    use tracing::Level;

    let level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when embedded in another binary.
    let _ = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
