pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "feedstock",
    about = "Feedstock operator CLI",
    long_about = "Operate the feedstock backend: migrations, demo data, config inspection, readiness checks and local tokens.",
    after_help = "Examples:\n  feedstock migrate\n  feedstock seed\n  feedstock doctor --json\n  feedstock token --tenant demo-tenant --role operations"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo tenant dataset (idempotent)")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, token signing, DB connectivity and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Issue a bearer token for a tenant and role")]
    Token {
        #[arg(long, help = "Tenant the token is scoped to")]
        tenant: String,
        #[arg(long, default_value = "operator", help = "Subject recorded in the token")]
        subject: String,
        #[arg(long, default_value = "operations", help = "admin, operations, procurement or driver")]
        role: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Token { tenant, subject, role } => commands::token::run(&tenant, &subject, &role),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
