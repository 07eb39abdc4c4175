pub mod cli;
pub mod downloader;
pub mod logging;
pub mod settings;
pub mod ytdlp;

use std::process::ExitCode;

use clap::Parser;

use cli::Cli;

/// Parse arguments, set up logging and dispatch
pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.verbose) {
        logging::init_logging_stderr(cli.verbose);
        tracing::warn!("File logging unavailable ({:#}); logging to stderr", e);
    }

    match cli.run().await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("rev-downloader error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
