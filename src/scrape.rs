use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::browser::{BrowserError, BrowserLauncher, BrowserSession};
use crate::config::{BrowserSettings, InteractionStep, MonitorConfig};
use crate::diagnostics::{ArtifactKind, DiagnosticSink};
use crate::extract::{InvalidSelector, SlotExtractor};
use crate::formats::ScrapeResult;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("launch browser")]
    Launch(#[source] BrowserError),
    #[error("navigate to {url}")]
    Navigation {
        url: Url,
        #[source]
        source: BrowserError,
    },
    #[error("switch into scheduling frame {src:?}")]
    Frame {
        src: String,
        #[source]
        source: BrowserError,
    },
    #[error("availability widget did not appear within {timeout:?}")]
    WidgetTimeout { timeout: Duration },
    #[error("read page")]
    Page(#[source] BrowserError),
}

/// Loads the provider's booking page in a headless browser and extracts the
/// listed slots.
#[derive(Debug)]
pub struct AvailabilityScraper {
    page_url: Url,
    settings: BrowserSettings,
    steps: Vec<InteractionStep>,
    extractor: SlotExtractor,
    artifacts: DiagnosticSink,
    debug_snapshot: bool,
}

impl AvailabilityScraper {
    pub fn new(config: &MonitorConfig, artifacts: DiagnosticSink) -> Result<Self, InvalidSelector> {
        Ok(Self {
            page_url: config.page_url.clone(),
            settings: config.browser.clone(),
            steps: config.steps.clone(),
            extractor: SlotExtractor::new(&config.strategies)?,
            artifacts,
            debug_snapshot: false,
        })
    }

    pub fn with_debug_snapshot(mut self, enabled: bool) -> Self {
        self.debug_snapshot = enabled;
        self
    }

    /// One scrape, start to finish. The browser session is closed on every
    /// path, and a failed scrape leaves a screenshot and HTML snapshot in the
    /// artifacts directory before the error is returned.
    pub async fn scrape(&self, launcher: &dyn BrowserLauncher) -> Result<ScrapeResult, ScrapeError> {
        tracing::info!(url = %self.page_url, "starting scrape");
        let mut session = launcher
            .launch(&self.settings)
            .await
            .map_err(ScrapeError::Launch)?;

        let capture_timeout = Duration::from_secs(self.settings.capture_timeout_secs);
        let result = match self.scrape_session(session.as_mut()).await {
            Ok(result) => Ok(result),
            Err(err) => {
                tracing::error!(?err, "scrape failed; saving page snapshot");
                let capture = self
                    .artifacts
                    .capture(session.as_mut(), ArtifactKind::Failure);
                if tokio::time::timeout(capture_timeout, capture).await.is_err() {
                    tracing::warn!(timeout = ?capture_timeout, "page snapshot timed out");
                }
                Err(err)
            }
        };

        match tokio::time::timeout(capture_timeout, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(?err, "close browser session"),
            Err(_) => tracing::warn!(timeout = ?capture_timeout, "close browser session timed out"),
        }

        result
    }

    async fn scrape_session(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<ScrapeResult, ScrapeError> {
        let navigation_timeout = Duration::from_secs(self.settings.navigation_timeout_secs);
        match tokio::time::timeout(navigation_timeout, session.goto(self.page_url.as_str())).await
        {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                return Err(ScrapeError::Navigation {
                    url: self.page_url.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(ScrapeError::Navigation {
                    url: self.page_url.clone(),
                    source: BrowserError::Timeout(navigation_timeout),
                });
            }
        }
        tokio::time::sleep(Duration::from_millis(self.settings.settle_ms)).await;

        self.run_steps(session).await;
        self.enter_scheduling_frame(session).await?;
        self.wait_for_widget(session).await?;

        let html = session.html().await.map_err(ScrapeError::Page)?;
        let outcome = self.extractor.extract(&html);
        let matched_strategy = outcome
            .matched
            .and_then(|index| self.extractor.strategy_label(index));
        tracing::info!(
            slots = outcome.slots.len(),
            skipped = outcome.skipped,
            strategy = matched_strategy.as_deref().unwrap_or("none"),
            "extraction finished"
        );

        let diagnostics = if self.debug_snapshot {
            self.artifacts.capture(session, ArtifactKind::Debug).await
        } else {
            None
        };

        Ok(ScrapeResult {
            slots: outcome.slots,
            matched_strategy,
            diagnostics,
        })
    }

    /// Runs the configured interaction steps. A step that fails is logged and
    /// skipped; the page may simply not need it.
    async fn run_steps(&self, session: &mut dyn BrowserSession) {
        let settle = Duration::from_millis(self.settings.step_settle_ms);
        for (index, step) in self.steps.iter().enumerate() {
            let result = match step {
                InteractionStep::Click { selector } => session.click(selector).await,
                InteractionStep::ClickText { text } => session.click_text(text).await,
                InteractionStep::Fill { selector, text } => session.fill(selector, text).await,
                InteractionStep::Wait { ms } => {
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                    continue;
                }
            };

            match result {
                Ok(()) => tracing::info!(step = index + 1, ?step, "interaction step done"),
                Err(err) => tracing::warn!(step = index + 1, ?step, ?err, "interaction step skipped"),
            }
            tokio::time::sleep(settle).await;
        }
    }

    /// Switches into the first iframe whose URL names a scheduling widget.
    /// Staying on the top-level page is fine when there is none.
    async fn enter_scheduling_frame(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<(), ScrapeError> {
        let sources = session.frame_sources().await.map_err(ScrapeError::Page)?;
        tracing::debug!(frames = sources.len(), "found iframes");

        let found = sources.iter().enumerate().find_map(|(index, src)| {
            let src = src.as_deref()?;
            let lower = src.to_lowercase();
            self.settings
                .frame_keywords
                .iter()
                .map(|keyword| keyword.trim())
                .filter(|keyword| !keyword.is_empty())
                .any(|keyword| lower.contains(&keyword.to_lowercase()))
                .then_some((index, src))
        });

        let Some((index, src)) = found else {
            tracing::debug!("no scheduling iframe; extracting from the main page");
            return Ok(());
        };

        tracing::info!(index, src, "switching into scheduling iframe");
        session
            .enter_frame(index)
            .await
            .map_err(|source| ScrapeError::Frame {
                src: src.to_owned(),
                source,
            })?;
        tokio::time::sleep(Duration::from_millis(self.settings.step_settle_ms)).await;
        Ok(())
    }

    /// Polls until the widget or any cascade selector matches.
    async fn wait_for_widget(&self, session: &mut dyn BrowserSession) -> Result<(), ScrapeError> {
        let mut selectors = self.settings.widget_selectors.clone();
        selectors.push(self.extractor.any_match_css());
        let css = selectors.join(", ");

        let timeout = Duration::from_secs(self.settings.widget_timeout_secs);
        let poll = Duration::from_millis(self.settings.poll_ms.max(1));

        let wait = async {
            loop {
                let found = session.count(&css).await?;
                if found > 0 {
                    tracing::debug!(found, "availability widget rendered");
                    return Ok::<(), BrowserError>(());
                }
                tokio::time::sleep(poll).await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ScrapeError::Page(source)),
            Err(_) => Err(ScrapeError::WidgetTimeout { timeout }),
        }
    }
}
