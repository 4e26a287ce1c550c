use std::io;
use std::process::ExitCode;
use syncql::config::{self, Config};
use syncql::repl;
use tracing::{error, info};

fn main() -> ExitCode {
    // Parse CLI arguments
    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1) {
        Some(path) => match config::load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    // Initialize the logging system using tracing subscriber
    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .with_writer(io::stderr)
        .init();

    info!("Starting syncql for database {}", config.database.name);

    let stdin = io::stdin();
    match repl::run_repl(config.database, stdin.lock(), io::stdout()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Shell stopped: {}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
