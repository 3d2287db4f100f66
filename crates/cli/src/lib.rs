pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "telos",
    about = "Telos lead-qualification operator CLI",
    long_about = "Inspect Telos configuration, check runtime readiness, and analyse saved chat transcripts offline.",
    after_help = "Examples:\n  telos doctor --json\n  telos config\n  telos inspect transcript.json --extracted fields.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, token budgets, prompt sources and automation wiring")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Run the pipeline checks over a saved transcript without calling a model"
    )]
    Inspect {
        #[arg(help = "JSON file holding an array of {role, content} turns")]
        transcript: PathBuf,
        #[arg(long, help = "JSON file with model-extracted lead fields to validate")]
        extracted: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Inspect { transcript, extracted } => {
            commands::inspect::run(&transcript, extracted.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
