use std::io::IsTerminal as _;

use anyhow::Context as _;

/// Used when `RUST_LOG` is unset. The WebDriver and HTML parsing stacks are
/// chatty at info.
const DEFAULT_DIRECTIVES: &str = "info,fantoccini=warn,hyper=warn,hyper_util=warn,html5ever=warn,selectors=warn";

pub fn init() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_DIRECTIVES))
        .context("build log filter")?;

    // Scheduled runs log to a file or CI console; keep escape codes out of those.
    let ansi = std::io::stderr().is_terminal();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
