use std::path::PathBuf;

use anyhow::Context as _;

use crate::browser::BrowserSession;
use crate::formats::DiagnosticArtifacts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Written when a scrape fails.
    Failure,
    /// Written after a successful scrape when debug snapshots are on.
    Debug,
}

impl ArtifactKind {
    fn file_stem(self) -> &'static str {
        match self {
            Self::Failure => "slotwatch-failure",
            Self::Debug => "slotwatch-debug",
        }
    }
}

/// Writes page snapshots into a fixed directory. Files of the same kind are
/// overwritten by the next run.
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    dir: PathBuf,
}

impl DiagnosticSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn paths(&self, kind: ArtifactKind) -> DiagnosticArtifacts {
        let stem = kind.file_stem();
        DiagnosticArtifacts {
            screenshot: self.dir.join(format!("{stem}.png")),
            html: self.dir.join(format!("{stem}.html")),
        }
    }

    /// Captures a screenshot and the page source from `session`.
    ///
    /// Never fails: a broken session still gets whatever could be read, and
    /// every problem is logged. Returns `None` when nothing was written.
    pub async fn capture(
        &self,
        session: &mut dyn BrowserSession,
        kind: ArtifactKind,
    ) -> Option<DiagnosticArtifacts> {
        let screenshot = match session.screenshot().await {
            Ok(png) => Some(png),
            Err(err) => {
                tracing::warn!(?err, "capture screenshot");
                None
            }
        };
        let html = match session.html().await {
            Ok(html) => Some(html),
            Err(err) => {
                tracing::warn!(?err, "capture page source");
                None
            }
        };

        match self.write(kind, screenshot.as_deref(), html.as_deref()) {
            Ok(Some(paths)) => {
                tracing::info!(
                    screenshot = %paths.screenshot.display(),
                    html = %paths.html.display(),
                    "saved page snapshot"
                );
                Some(paths)
            }
            Ok(None) => {
                tracing::warn!("page snapshot unavailable; nothing saved");
                None
            }
            Err(err) => {
                tracing::warn!(err = %format!("{err:#}"), "save page snapshot");
                None
            }
        }
    }

    pub fn write(
        &self,
        kind: ArtifactKind,
        screenshot: Option<&[u8]>,
        html: Option<&str>,
    ) -> anyhow::Result<Option<DiagnosticArtifacts>> {
        if screenshot.is_none() && html.is_none() {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create artifacts dir: {}", self.dir.display()))?;

        let paths = self.paths(kind);
        if let Some(png) = screenshot {
            std::fs::write(&paths.screenshot, png)
                .with_context(|| format!("write screenshot: {}", paths.screenshot.display()))?;
        }
        if let Some(html) = html {
            std::fs::write(&paths.html, html)
                .with_context(|| format!("write html snapshot: {}", paths.html.display()))?;
        }

        Ok(Some(paths))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context as _;

    use super::*;

    #[test]
    fn writes_both_files_under_the_artifacts_dir() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let sink = DiagnosticSink::new(tmp.path().join("artifacts"));

        let paths = sink
            .write(ArtifactKind::Failure, Some(b"\x89PNG"), Some("<html></html>"))?
            .context("expected artifacts")?;

        assert_eq!(paths.screenshot, tmp.path().join("artifacts/slotwatch-failure.png"));
        assert_eq!(std::fs::read(&paths.screenshot)?, b"\x89PNG");
        assert_eq!(std::fs::read_to_string(&paths.html)?, "<html></html>");
        Ok(())
    }

    #[test]
    fn nothing_to_write_creates_nothing() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let sink = DiagnosticSink::new(tmp.path().join("artifacts"));

        assert!(sink.write(ArtifactKind::Debug, None, None)?.is_none());
        assert!(!tmp.path().join("artifacts").exists());
        Ok(())
    }
}
