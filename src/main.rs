//! tack CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use tack::cli::commands;
use tack::cli::{Cli, Commands};
use tack::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info,reqwest=info,hyper=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let db = cli.db.as_ref();
    let owner = cli.owner.as_deref();

    match &cli.command {
        Commands::Init { force } => commands::init::execute(db, *force, json),
        Commands::Version => commands::version::execute(json),

        // Records
        Commands::Create(args) => commands::record::create(args, db, owner, json),
        Commands::List(args) => commands::record::list(args, db, owner, json),
        Commands::Show { id } => commands::record::show(id, db, json),
        Commands::Edit(args) => commands::record::edit(args, db, json),
        Commands::Status { id, status } => commands::record::set_status(id, status, db, json),
        Commands::Pin { id } => commands::record::pin(id, db, json),
        Commands::Highlight { id } => commands::record::highlight(id, db, json),
        Commands::Snooze(args) => commands::record::snooze(args, db, json),
        Commands::Delete { ids } => commands::record::delete(ids, db, json),
        Commands::Pending { conflicts } => commands::record::pending(*conflicts, db, owner, json),

        // Sync
        Commands::Sync => commands::sync::sync(db, owner, json),
        Commands::Watch => commands::sync::watch(db, owner, json),
        Commands::Config { command } => commands::config::execute(command, json),

        // Shell completions
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
