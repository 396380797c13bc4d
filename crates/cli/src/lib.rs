pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::refund::{CreateArgs, FilterArgs, TransitionArgs};

#[derive(Debug, Parser)]
#[command(
    name = "devolucion",
    about = "SAT refund request lifecycle CLI",
    long_about = "Create, advance, and inspect SAT tax refund requests, plus migrations, config inspection, and readiness checks.",
    after_help = "Examples:\n  devolucion create --owner u-1 --type sueldos_salarios --year 2024 --period anual --amount 15000\n  devolucion transition DEV-2024-000123 enviado --actor contribuyente\n  devolucion summary --owner u-1"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, DB connectivity, and migration state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Create a draft refund request with a freshly allocated folio")]
    Create(CreateArgs),
    #[command(about = "Move a refund request to another status")]
    Transition(TransitionArgs),
    #[command(about = "Show a refund request with its status label, progress, and timeline")]
    Show {
        #[arg(help = "Folio or id of the request")]
        reference: String,
    },
    #[command(about = "List refund requests as status cards, newest first")]
    List(FilterArgs),
    #[command(about = "Aggregate counts and amounts across refund requests")]
    Summary {
        #[arg(long)]
        owner: Option<String>,
    },
    #[command(about = "Print the status and refund type vocabularies")]
    Vocabulary,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    logging::init();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Config => commands::config::run(),
        Command::Create(args) => commands::refund::create(args),
        Command::Transition(args) => commands::refund::transition(args),
        Command::Show { reference } => commands::refund::show(reference),
        Command::List(args) => commands::refund::list(args),
        Command::Summary { owner } => commands::refund::summary(owner),
        Command::Vocabulary => commands::refund::vocabulary(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
