use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    slotwatch::logging::init().context("init logging")?;

    let cli = slotwatch::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        slotwatch::cli::Command::Check(args) => {
            slotwatch::monitor::run(args).await.context("check")?;
        }
        slotwatch::cli::Command::Validate(args) => {
            slotwatch::config::run(args).context("validate")?;
        }
        slotwatch::cli::Command::Extract(args) => {
            slotwatch::extract::run(args).context("extract")?;
        }
    }

    Ok(())
}
