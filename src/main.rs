use std::process::ExitCode;

use clap::Parser;

use mobile_pilot::agent_engine::state::TerminalOutcome;
use mobile_pilot::cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    match mobile_pilot::run(&args).await {
        Ok(report) => {
            println!(
                "{} after {} iteration(s), {} action(s), healing rate {:.1}%",
                report.outcome,
                report.state.iteration,
                report.state.action_history.len(),
                report.healing.healing_rate * 100.0
            );
            if report.outcome == TerminalOutcome::Completed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "mobile-pilot failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
