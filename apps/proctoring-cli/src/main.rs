use clap::Parser;
use proctoring_cli::ProctoringCli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the worker protocol and command output, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    proctoring_cli::run(ProctoringCli::parse()).await
}
