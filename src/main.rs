use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use helios::cli::{self, Cli};
use helios::errors::HeliosError;
use helios::pipeline::RunOutcome;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(!cli.no_color)
            .with_writer(std::io::stderr)
            .init();
    }
    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let seeds = match cli::scan::load_seeds(&cli).await {
        Ok(seeds) => seeds,
        Err(e) => exit_with_error(e),
    };
    if seeds.is_empty() {
        error!("-u or --urls is required to start");
        std::process::exit(1);
    }

    match cli::scan::handle_scan(&cli, seeds).await {
        Ok(RunOutcome::Completed(_)) => {}
        Ok(RunOutcome::Interrupted) => std::process::exit(130),
        Ok(RunOutcome::Aborted { .. }) => std::process::exit(1),
        Err(e) => exit_with_error(e),
    }
}

fn exit_with_error(e: HeliosError) -> ! {
    eprintln!("Error: {}", e);
    let exit_code = match &e {
        HeliosError::Config(_) => 2,
        HeliosError::InvalidTarget(_) => 5,
        HeliosError::Interrupted => 130,
        _ => 1,
    };
    std::process::exit(exit_code);
}
