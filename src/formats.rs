use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// A candidate slot as it appeared on the page; date and time are still text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSlot {
    pub date_text: String,
    pub time_text: String,
    pub raw_text: String,
}

/// A slot whose date and time parsed into calendar values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub raw_text: String,
}

impl AppointmentSlot {
    /// `DD/MM/YYYY`, the way the booking site and the email show dates.
    pub fn date_label(&self) -> String {
        self.date.format("%d/%m/%Y").to_string()
    }

    /// `HH:MM`.
    pub fn time_label(&self) -> String {
        self.time.format("%H:%M").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticArtifacts {
    pub screenshot: PathBuf,
    pub html: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeResult {
    pub slots: Vec<ExtractedSlot>,
    /// Label of the extraction strategy that matched, if any did.
    pub matched_strategy: Option<String>,
    pub diagnostics: Option<DiagnosticArtifacts>,
}

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub extracted: usize,
    pub qualifying: Vec<AppointmentSlot>,
    pub parse_failures: usize,
    pub notified: bool,
    pub diagnostics: Option<DiagnosticArtifacts>,
}
