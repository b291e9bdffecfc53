use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::Context as _;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::cli::ExtractArgs;
use crate::formats::ExtractedSlot;

// ISO first, so "2026-04-20" is never read as "26-04-20".
static DATE_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{1,2}-\d{1,2}|\b\d{1,2}[/-]\d{1,2}(?:[/-]\d{2,4})?\b)")
        .expect("valid date-in-text regex")
});
static TIME_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}[:h]\d{2})").expect("valid time-in-text regex"));
static AGENDA_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}:\d{2})").expect("valid agenda time regex"));
static MONTH_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z][a-zç]{2}),\s*(\d{4})").expect("valid month header regex")
});

static DATE_CHILD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"[class*="data"], [class*="date"], [class*="dia"]"#)
        .expect("valid date child selector")
});
static TIME_CHILD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"[class*="hora"], [class*="time"], [class*="horario"]"#)
        .expect("valid time child selector")
});
static SELECTED_DAY: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"[class*="selected"], [class*="active"], [class*="highlight"], [aria-selected="true"]"#,
    )
    .expect("valid selected day selector")
});

pub const ENCAIXE_MARKER: &str = "(E)";

/// One entry of the selector cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Time buttons of a calendar agenda; the date comes from the month
    /// header and the highlighted day.
    CalendarAgenda { slot_selector: String },
    /// Elements each carrying their own date and time.
    Selector(String),
}

impl ExtractionStrategy {
    pub fn css(&self) -> &str {
        match self {
            Self::CalendarAgenda { slot_selector } => slot_selector,
            Self::Selector(css) => css,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::CalendarAgenda { slot_selector } => format!("calendar agenda ({slot_selector})"),
            Self::Selector(css) => css.clone(),
        }
    }
}

pub const DEFAULT_AGENDA_SLOT_SELECTOR: &str = "cura-button-outline";

/// Per-element slot selectors, most specific first.
pub const DEFAULT_SLOT_SELECTORS: [&str; 15] = [
    r#"div[class*="horario"]"#,
    r#"div[class*="hora"]"#,
    r#"button[class*="horario"]"#,
    r#"button[class*="schedule"]"#,
    r#"div[class*="disponivel"]"#,
    r#"div[class*="available"]"#,
    r#"div[class*="slot"]"#,
    r#"div[class*="appointment"]"#,
    r#"li[class*="time"]"#,
    "[data-time]",
    "[data-slot]",
    "[data-horario]",
    ".time-slot",
    ".available-time",
    ".schedule-item",
];

pub fn default_selector_strategies() -> impl Iterator<Item = ExtractionStrategy> {
    DEFAULT_SLOT_SELECTORS
        .into_iter()
        .map(|css| ExtractionStrategy::Selector(css.to_owned()))
}

pub fn default_strategies() -> Vec<ExtractionStrategy> {
    let mut strategies = vec![ExtractionStrategy::CalendarAgenda {
        slot_selector: DEFAULT_AGENDA_SLOT_SELECTOR.to_owned(),
    }];
    strategies.extend(default_selector_strategies());
    strategies
}

pub fn compile_selector(css: &str) -> Result<Selector, InvalidSelector> {
    Selector::parse(css).map_err(|err| InvalidSelector {
        selector: css.to_owned(),
        message: err.to_string(),
    })
}

#[derive(Debug, Error)]
#[error("invalid css selector {selector:?}: {message}")]
pub struct InvalidSelector {
    pub selector: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct CascadeOutcome {
    pub slots: Vec<ExtractedSlot>,
    /// Index of the strategy that matched.
    pub matched: Option<usize>,
    /// How many strategies were tried, the matching one included.
    pub evaluated: usize,
    /// Matched elements that yielded no date or no time.
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct SlotExtractor {
    strategies: Vec<(ExtractionStrategy, Selector)>,
}

impl SlotExtractor {
    pub fn new(strategies: &[ExtractionStrategy]) -> Result<Self, InvalidSelector> {
        let strategies = strategies
            .iter()
            .map(|strategy| Ok((strategy.clone(), compile_selector(strategy.css())?)))
            .collect::<Result<Vec<_>, InvalidSelector>>()?;
        Ok(Self { strategies })
    }

    pub fn strategies(&self) -> impl Iterator<Item = &ExtractionStrategy> {
        self.strategies.iter().map(|(strategy, _)| strategy)
    }

    pub fn strategy_label(&self, index: usize) -> Option<String> {
        self.strategies.get(index).map(|(strategy, _)| strategy.label())
    }

    /// Every cascade selector as one CSS selector list, for "is anything there yet" polling.
    pub fn any_match_css(&self) -> String {
        self.strategies()
            .map(ExtractionStrategy::css)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Runs the cascade; the first strategy with at least one matching
    /// element wins and later strategies are never looked at.
    pub fn extract(&self, html: &str) -> CascadeOutcome {
        let document = Html::parse_document(html);
        let mut outcome = CascadeOutcome::default();

        for (index, (strategy, selector)) in self.strategies.iter().enumerate() {
            outcome.evaluated += 1;
            let elements = document.select(selector).collect::<Vec<_>>();
            if elements.is_empty() {
                continue;
            }

            tracing::info!(
                strategy = %strategy.label(),
                elements = elements.len(),
                "extraction strategy matched"
            );
            outcome.matched = Some(index);

            match strategy {
                ExtractionStrategy::CalendarAgenda { .. } => {
                    extract_agenda(&document, &elements, &mut outcome);
                }
                ExtractionStrategy::Selector(_) => {
                    for element in &elements {
                        match extract_from_element(element) {
                            Some(slot) => {
                                tracing::debug!(
                                    date = %slot.date_text,
                                    time = %slot.time_text,
                                    "extracted slot"
                                );
                                outcome.slots.push(slot);
                            }
                            None => outcome.skipped += 1,
                        }
                    }
                }
            }
            break;
        }

        outcome
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_from_element(element: &ElementRef<'_>) -> Option<ExtractedSlot> {
    let text = element_text(element);
    if !text.chars().any(|ch| ch.is_ascii_digit()) {
        return None;
    }

    let (date_text, time_text) = structured_date_time(element)
        .or_else(|| regex_date_time(&text))?;

    Some(ExtractedSlot {
        date_text,
        time_text,
        raw_text: text,
    })
}

fn structured_date_time(element: &ElementRef<'_>) -> Option<(String, String)> {
    let attrs = element.value();
    let date = attrs
        .attr("data-date")
        .map(str::to_owned)
        .or_else(|| element.select(&DATE_CHILD).next().map(|e| element_text(&e)))
        .filter(|text| !text.is_empty())?;
    let time = attrs
        .attr("data-time")
        .map(str::to_owned)
        .or_else(|| element.select(&TIME_CHILD).next().map(|e| element_text(&e)))
        .filter(|text| !text.is_empty())?;
    Some((date.trim().to_owned(), time.trim().to_owned()))
}

/// Pulls a `dd/mm[/yyyy]` date and an `hh:mm` time out of free text.
pub fn regex_date_time(text: &str) -> Option<(String, String)> {
    let date = DATE_IN_TEXT.captures(text)?.get(1)?.as_str().to_owned();
    let time = TIME_IN_TEXT.captures(text)?.get(1)?.as_str().to_owned();
    Some((date, time))
}

fn extract_agenda(document: &Html, buttons: &[ElementRef<'_>], outcome: &mut CascadeOutcome) {
    let Some(date_text) = agenda_selected_date(document) else {
        tracing::warn!(
            buttons = buttons.len(),
            "agenda time buttons found but the selected day could not be determined"
        );
        outcome.skipped += buttons.len();
        return;
    };

    for button in buttons {
        let text = element_text(button);
        let Some(time) = AGENDA_TIME.captures(&text).and_then(|caps| caps.get(1)) else {
            outcome.skipped += 1;
            continue;
        };
        let time_text = time.as_str().to_owned();
        let mut raw_text = format!("{date_text} {time_text}");
        if text.contains(ENCAIXE_MARKER) {
            raw_text.push_str(" (Encaixe)");
        }
        tracing::debug!(date = %date_text, time = %time_text, "extracted agenda slot");
        outcome.slots.push(ExtractedSlot {
            date_text: date_text.clone(),
            time_text,
            raw_text,
        });
    }
}

/// `dd/mm/yyyy` from the agenda's month header ("Mar, 2026") and highlighted day.
fn agenda_selected_date(document: &Html) -> Option<String> {
    let page_text = element_text(&document.root_element());
    let (month, year) = MONTH_HEADER.captures_iter(&page_text).find_map(|caps| {
        let month = crate::dates::month_from_name(&caps[1])?;
        let year = caps[2].parse::<i32>().ok()?;
        Some((month, year))
    })?;

    let day = document.select(&SELECTED_DAY).find_map(|element| {
        let text = element_text(&element);
        if text.is_empty() || !text.chars().all(|ch| ch.is_ascii_digit()) {
            return None;
        }
        text.parse::<u32>().ok().filter(|day| (1..=31).contains(day))
    })?;

    Some(format!("{day:02}/{month:02}/{year}"))
}

pub fn run(args: ExtractArgs) -> anyhow::Result<()> {
    let html_path = PathBuf::from(&args.html);
    let html = std::fs::read_to_string(&html_path)
        .with_context(|| format!("read html snapshot: {}", html_path.display()))?;

    let today = match args.today.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").context("parse --today")?,
        None => chrono::Local::now().date_naive(),
    };
    let reference = match args.reference_date.as_deref() {
        Some(raw) => {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").context("parse --reference-date")?
        }
        None => NaiveDate::MAX,
    };

    let extractor = SlotExtractor::new(&default_strategies()).context("compile selectors")?;
    let outcome = extractor.extract(&html);
    match outcome.matched.and_then(|index| extractor.strategy_label(index)) {
        Some(label) => tracing::info!(
            strategy = %label,
            slots = outcome.slots.len(),
            skipped = outcome.skipped,
            "extraction finished"
        ),
        None => tracing::info!("no extraction strategy matched"),
    }

    let filtered = crate::filter::filter_earlier(&outcome.slots, reference, today);
    for slot in &filtered.slots {
        println!("{} {}\t{}", slot.date_label(), slot.time_label(), slot.raw_text);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::Context as _;

    use super::*;

    fn selector(css: &str) -> ExtractionStrategy {
        ExtractionStrategy::Selector(css.to_owned())
    }

    #[test]
    fn regex_fallback_reads_date_and_time_from_free_text() -> anyhow::Result<()> {
        let (date, time) =
            regex_date_time("15/02/2026 às 14:30").context("expected date and time")?;
        assert_eq!(date, "15/02/2026");
        assert_eq!(time, "14:30");

        let today = NaiveDate::from_ymd_opt(2026, 1, 1).context("date")?;
        assert_eq!(
            crate::dates::parse_date(&date, today)?,
            NaiveDate::from_ymd_opt(2026, 2, 15).context("date")?
        );
        assert_eq!(crate::dates::parse_time(&time)?.to_string(), "14:30:00");
        Ok(())
    }

    #[test]
    fn cascade_stops_at_first_matching_strategy() -> anyhow::Result<()> {
        let html = r#"<html><body>
            <div class="horario-card">15/02/2026 às 14:30</div>
            <li class="time-entry">16/02/2026 às 09:00</li>
        </body></html>"#;
        let extractor = SlotExtractor::new(&[
            selector(r#"div[class*="horario"]"#),
            selector(r#"li[class*="time"]"#),
        ])?;

        let outcome = extractor.extract(html);

        assert_eq!(outcome.matched, Some(0));
        assert_eq!(outcome.evaluated, 1);
        assert_eq!(outcome.slots.len(), 1);
        assert_eq!(outcome.slots[0].date_text, "15/02/2026");
        Ok(())
    }

    #[test]
    fn cascade_falls_through_to_later_strategies() -> anyhow::Result<()> {
        let html = r#"<ul><li class="time-entry">16/02/2026 09:00</li></ul>"#;
        let extractor = SlotExtractor::new(&[
            selector(r#"div[class*="horario"]"#),
            selector(r#"li[class*="time"]"#),
        ])?;

        let outcome = extractor.extract(html);

        assert_eq!(outcome.matched, Some(1));
        assert_eq!(outcome.evaluated, 2);
        assert_eq!(outcome.slots[0].time_text, "09:00");
        Ok(())
    }

    #[test]
    fn no_match_is_an_empty_outcome() -> anyhow::Result<()> {
        let extractor = SlotExtractor::new(&default_strategies())?;
        let outcome = extractor.extract("<html><body><p>Sem horários</p></body></html>");
        assert!(outcome.slots.is_empty());
        assert_eq!(outcome.matched, None);
        assert_eq!(outcome.evaluated, default_strategies().len());
        Ok(())
    }

    #[test]
    fn structured_children_take_priority_over_text() -> anyhow::Result<()> {
        let html = r#"<div class="slot">
            <span class="slot-dia">Qui, 19/02</span>
            <span class="slot-hora">10h15</span>
            <small>código 99/99</small>
        </div>"#;
        let extractor = SlotExtractor::new(&[selector(r#"div[class*="slot"]"#)])?;

        let outcome = extractor.extract(html);

        assert_eq!(outcome.slots.len(), 1);
        assert_eq!(outcome.slots[0].date_text, "Qui, 19/02");
        assert_eq!(outcome.slots[0].time_text, "10h15");
        Ok(())
    }

    #[test]
    fn data_attributes_are_structured_fields() -> anyhow::Result<()> {
        let html = r#"<button data-time="08:40" data-date="2026-02-20">Manhã 1</button>"#;
        let extractor = SlotExtractor::new(&[selector("[data-time]")])?;

        let outcome = extractor.extract(html);

        assert_eq!(outcome.slots[0].date_text, "2026-02-20");
        assert_eq!(outcome.slots[0].time_text, "08:40");
        Ok(())
    }

    #[test]
    fn elements_without_date_or_time_are_skipped() -> anyhow::Result<()> {
        let html = r#"
            <div class="horario">Nenhum horário</div>
            <div class="horario">Sala 12</div>
            <div class="horario">20/02/2026 - 11:00</div>"#;
        let extractor = SlotExtractor::new(&[selector(r#"div[class*="horario"]"#)])?;

        let outcome = extractor.extract(html);

        assert_eq!(outcome.slots.len(), 1);
        assert_eq!(outcome.skipped, 2);
        Ok(())
    }

    #[test]
    fn calendar_agenda_uses_month_header_and_selected_day() -> anyhow::Result<()> {
        let html = r#"<html><body>
            <div class="calendar-header">Fev, 2026</div>
            <div class="day">18</div>
            <div class="day day--selected">19</div>
            <cura-button-outline>08:30</cura-button-outline>
            <cura-button-outline>09:10 (E)</cura-button-outline>
            <cura-button-outline>indisponível</cura-button-outline>
        </body></html>"#;
        let extractor = SlotExtractor::new(&default_strategies())?;

        let outcome = extractor.extract(html);

        assert_eq!(outcome.matched, Some(0));
        assert_eq!(outcome.slots.len(), 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.slots[0].date_text, "19/02/2026");
        assert_eq!(outcome.slots[0].time_text, "08:30");
        assert_eq!(outcome.slots[1].raw_text, "19/02/2026 09:10 (Encaixe)");
        Ok(())
    }

    #[test]
    fn calendar_agenda_without_selected_day_yields_nothing() -> anyhow::Result<()> {
        let html = r#"<div>Mar, 2026</div><cura-button-outline>08:30</cura-button-outline>"#;
        let extractor = SlotExtractor::new(&default_strategies())?;

        let outcome = extractor.extract(html);

        assert_eq!(outcome.matched, Some(0));
        assert!(outcome.slots.is_empty());
        Ok(())
    }

    #[test]
    fn iso_date_in_free_text_is_read_whole() -> anyhow::Result<()> {
        let (date, time) =
            regex_date_time("2026-04-20 10:00").context("expected date and time")?;
        assert_eq!(date, "2026-04-20");
        assert_eq!(time, "10:00");

        let extractor = SlotExtractor::new(&[selector(r#"div[class*="horario"]"#)])?;
        let outcome = extractor.extract(r#"<div class="horario">2026-04-20 10:00</div>"#);
        assert_eq!(outcome.slots[0].date_text, "2026-04-20");

        let today = NaiveDate::from_ymd_opt(2026, 1, 10).context("date")?;
        let reference = NaiveDate::from_ymd_opt(2026, 3, 11).context("date")?;
        let filtered = crate::filter::filter_earlier(&outcome.slots, reference, today);
        assert!(filtered.slots.is_empty());
        Ok(())
    }

    #[test]
    fn numeric_date_must_stand_alone() {
        assert_eq!(regex_date_time("protocolo 123/456 às 10:00"), None);
    }

    #[test]
    fn invalid_selector_is_reported() {
        let err = SlotExtractor::new(&[selector("div[class*=")]).unwrap_err();
        assert_eq!(err.selector, "div[class*=");
    }
}
