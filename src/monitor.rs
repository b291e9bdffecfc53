//! One availability check: validate, scrape, filter, notify.

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::NaiveDate;
use thiserror::Error;

use crate::browser::{BrowserLauncher, WebDriverLauncher};
use crate::cli::CheckArgs;
use crate::config::{ConfigError, ConfigValidator, RawMonitorConfig};
use crate::diagnostics::DiagnosticSink;
use crate::filter::filter_earlier;
use crate::formats::CheckOutcome;
use crate::notify::{DryRunNotifier, NotificationError, Notifier, SmtpNotifier};
use crate::scrape::{AvailabilityScraper, ScrapeError};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    #[error("scrape failed")]
    Scrape(#[from] ScrapeError),
    #[error("notification failed")]
    Notification(#[from] NotificationError),
}

#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub artifacts_dir: PathBuf,
    pub debug_snapshot: bool,
    /// Anchor for dates shown without a year.
    pub today: NaiveDate,
}

/// Runs one check.
///
/// The config is validated before any browser is launched. An email goes out
/// only when at least one slot falls strictly before the reference date; an
/// empty page is a normal outcome, not an error.
pub async fn run_check(
    raw: &RawMonitorConfig,
    launcher: &dyn BrowserLauncher,
    notifier: &dyn Notifier,
    options: &CheckOptions,
) -> Result<CheckOutcome, MonitorError> {
    let config = ConfigValidator::validate(raw)?;
    tracing::info!(
        provider = %config.provider_name,
        reference_date = %config.reference_date.format("%d/%m/%Y"),
        "config validated"
    );

    let scraper = AvailabilityScraper::new(&config, DiagnosticSink::new(&options.artifacts_dir))
        .map_err(ConfigError::from)?
        .with_debug_snapshot(options.debug_snapshot);
    let scraped = scraper.scrape(launcher).await?;

    let filtered = filter_earlier(&scraped.slots, config.reference_date, options.today);
    tracing::info!(
        extracted = scraped.slots.len(),
        qualifying = filtered.slots.len(),
        parse_failures = filtered.parse_failures,
        duplicates = filtered.duplicates,
        "filtered slots"
    );

    let notified = if filtered.slots.is_empty() {
        tracing::info!("no slot before the reference date; no notification");
        false
    } else {
        notifier.notify(&config, &filtered.slots).await?;
        true
    };

    Ok(CheckOutcome {
        extracted: scraped.slots.len(),
        qualifying: filtered.slots,
        parse_failures: filtered.parse_failures,
        notified,
        diagnostics: scraped.diagnostics,
    })
}

pub async fn run(args: CheckArgs) -> anyhow::Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut raw = RawMonitorConfig::load(&config_path)?
        .with_sender(args.sender.sender_email, args.sender.sender_password);
    if let Some(url) = args.webdriver_url {
        raw.browser.webdriver_url = url;
    }

    let options = CheckOptions {
        artifacts_dir: PathBuf::from(&args.artifacts_dir),
        debug_snapshot: args.debug_snapshot,
        today: chrono::Local::now().date_naive(),
    };

    let launcher = WebDriverLauncher;
    let notifier: Box<dyn Notifier> = if args.dry_run {
        Box::new(DryRunNotifier)
    } else {
        Box::new(SmtpNotifier)
    };

    let outcome = run_check(&raw, &launcher, notifier.as_ref(), &options)
        .await
        .context("availability check")?;

    for slot in &outcome.qualifying {
        println!("{} {}\t{}", slot.date_label(), slot.time_label(), slot.raw_text);
    }
    tracing::info!(
        extracted = outcome.extracted,
        qualifying = outcome.qualifying.len(),
        notified = outcome.notified,
        "check finished"
    );

    Ok(())
}
