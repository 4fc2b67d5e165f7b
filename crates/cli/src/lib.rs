pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "benefitflow",
    about = "Benefitflow operator CLI",
    long_about = "Prepare the benefits database, load demo data, inspect configuration, and check readiness.",
    after_help = "Examples:\n  benefitflow migrate\n  benefitflow seed --reset\n  benefitflow doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo employees, staff houses and sample booking")]
    Seed {
        #[arg(long, help = "Remove previously seeded rows before loading")]
        reset: bool,
    },
    #[command(about = "Show effective configuration values and where each one came from")]
    Config,
    #[command(about = "Check config, database connectivity, schema state and approver coverage")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { reset } => commands::seed::run(reset),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
