use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    rev_downloader::run().await
}
