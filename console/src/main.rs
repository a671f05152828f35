use std::process::ExitCode;

use clap::Parser;
use ollama_console_lib::cli::{self, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    ollama_console_lib::log::init();

    match cli::run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}
