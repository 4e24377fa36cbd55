mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // Parse CLI and dispatch; logging is set up once flags are known.
    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("retryx error: {:#}", err);
        std::process::exit(1);
    }
}
