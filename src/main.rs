use std::process::ExitCode;

use clap::Parser;
use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;

pub mod logic;
pub mod presentation;

use presentation::console;

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = console::Cli::parse();
    init_logging(&cli.log_level);

    // Requests are issued one after another, so a single thread is enough.
    let runtime = match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(console::run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            console::report_failure(&e);
            ExitCode::FAILURE
        }
    }
}
