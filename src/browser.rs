//! Headless browser access.
//!
//! The scraper talks to the page only through [`BrowserLauncher`] and
//! [`BrowserSession`]; [`WebDriverLauncher`] is the real implementation,
//! driving Chrome through a WebDriver endpoint (chromedriver, selenium).

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::wd::TimeoutConfiguration;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use thiserror::Error;

use crate::config::BrowserSettings;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("start webdriver session at {url}")]
    Session {
        url: String,
        #[source]
        source: fantoccini::error::NewSessionError,
    },
    #[error("webdriver command failed")]
    Command(#[from] fantoccini::error::CmdError),
    #[error("no element matches {0:?}")]
    NotFound(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(
        &self,
        settings: &BrowserSettings,
    ) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// One browser tab. Queries run against the current browsing context, which
/// is the top-level document until [`BrowserSession::enter_frame`] is called.
#[async_trait]
pub trait BrowserSession: Send {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError>;
    async fn click(&mut self, css: &str) -> Result<(), BrowserError>;
    async fn click_text(&mut self, text: &str) -> Result<(), BrowserError>;
    async fn fill(&mut self, css: &str, text: &str) -> Result<(), BrowserError>;
    /// `src` of every iframe in the current context, in document order.
    async fn frame_sources(&mut self) -> Result<Vec<Option<String>>, BrowserError>;
    /// Switches into the `index`-th iframe reported by `frame_sources`.
    async fn enter_frame(&mut self, index: usize) -> Result<(), BrowserError>;
    async fn count(&mut self, css: &str) -> Result<usize, BrowserError>;
    async fn html(&mut self) -> Result<String, BrowserError>;
    /// PNG bytes of the visible viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError>;
    async fn close(&mut self) -> Result<(), BrowserError>;
}

#[derive(Debug, Clone, Default)]
pub struct WebDriverLauncher;

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(
        &self,
        settings: &BrowserSettings,
    ) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let args = vec![
            "--headless=new".to_owned(),
            "--no-sandbox".to_owned(),
            "--disable-gpu".to_owned(),
            "--disable-dev-shm-usage".to_owned(),
            "--disable-extensions".to_owned(),
            "--mute-audio".to_owned(),
            format!(
                "--window-size={},{}",
                settings.window_width, settings.window_height
            ),
            format!("--lang={}", settings.locale),
            format!("--user-agent={}", settings.user_agent),
        ];

        let mut caps = serde_json::map::Map::new();
        caps.insert("browserName".to_owned(), json!("chrome"));
        caps.insert(
            "goog:chromeOptions".to_owned(),
            json!({
                "args": args,
                "prefs": { "intl.accept_languages": settings.locale },
            }),
        );

        tracing::debug!(url = %settings.webdriver_url, "connecting to webdriver");
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&settings.webdriver_url)
            .await
            .map_err(|source| BrowserError::Session {
                url: settings.webdriver_url.clone(),
                source,
            })?;
        tracing::info!(url = %settings.webdriver_url, "webdriver session started");

        let navigation = Duration::from_secs(settings.navigation_timeout_secs);
        let timeouts = TimeoutConfiguration::new(
            Some(navigation),
            Some(navigation),
            Some(Duration::ZERO),
        );
        if let Err(err) = client.update_timeouts(timeouts).await {
            if let Err(close_err) = client.close().await {
                tracing::warn!(?close_err, "close webdriver session");
            }
            return Err(err.into());
        }

        Ok(Box::new(WebDriverSession { client }))
    }
}

pub struct WebDriverSession {
    client: Client,
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        self.client.goto(url).await?;
        Ok(())
    }

    async fn click(&mut self, css: &str) -> Result<(), BrowserError> {
        self.client.find(Locator::Css(css)).await?.click().await?;
        Ok(())
    }

    async fn click_text(&mut self, text: &str) -> Result<(), BrowserError> {
        let xpath = format!("//*[normalize-space(text())={}]", xpath_literal(text));
        let elements = self.client.find_all(Locator::XPath(&xpath)).await?;
        let element = elements
            .into_iter()
            .next()
            .ok_or_else(|| BrowserError::NotFound(text.to_owned()))?;
        element.click().await?;
        Ok(())
    }

    async fn fill(&mut self, css: &str, text: &str) -> Result<(), BrowserError> {
        let element = self.client.find(Locator::Css(css)).await?;
        element.clear().await?;
        element.send_keys(text).await?;
        Ok(())
    }

    async fn frame_sources(&mut self) -> Result<Vec<Option<String>>, BrowserError> {
        let frames = self.client.find_all(Locator::Css("iframe")).await?;
        let mut sources = Vec::with_capacity(frames.len());
        for frame in &frames {
            sources.push(frame.attr("src").await?);
        }
        Ok(sources)
    }

    async fn enter_frame(&mut self, index: usize) -> Result<(), BrowserError> {
        let frame = self
            .client
            .find_all(Locator::Css("iframe"))
            .await?
            .into_iter()
            .nth(index)
            .ok_or_else(|| BrowserError::NotFound(format!("iframe #{index}")))?;
        frame.enter_frame().await?;
        Ok(())
    }

    async fn count(&mut self, css: &str) -> Result<usize, BrowserError> {
        Ok(self.client.find_all(Locator::Css(css)).await?.len())
    }

    async fn html(&mut self) -> Result<String, BrowserError> {
        Ok(self.client.source().await?)
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        Ok(self.client.screenshot().await?)
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.client.clone().close().await?;
        Ok(())
    }
}

/// Quotes `text` as an XPath 1.0 string literal.
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{text}'");
    }
    if !text.contains('"') {
        return format!("\"{text}\"");
    }
    let parts = text
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect::<Vec<_>>()
        .join(", \"'\", ");
    format!("concat({parts})")
}
