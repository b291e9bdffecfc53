use std::collections::HashSet;

use chrono::NaiveDate;

use crate::dates::{ParseError, parse_date, parse_time};
use crate::formats::{AppointmentSlot, ExtractedSlot};

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Slots strictly before the reference date, ordered by (date, time).
    pub slots: Vec<AppointmentSlot>,
    pub parse_failures: usize,
    pub duplicates: usize,
}

pub fn parse_slot(slot: &ExtractedSlot, today: NaiveDate) -> Result<AppointmentSlot, ParseError> {
    Ok(AppointmentSlot {
        date: parse_date(&slot.date_text, today)?,
        time: parse_time(&slot.time_text)?,
        raw_text: slot.raw_text.clone(),
    })
}

/// Keeps the slots dated strictly before `reference`.
///
/// Unparseable slots are dropped and counted. Slots sharing a (date, time)
/// with an earlier one are dropped as duplicates.
pub fn filter_earlier(
    slots: &[ExtractedSlot],
    reference: NaiveDate,
    today: NaiveDate,
) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();
    let mut seen = HashSet::new();

    for extracted in slots {
        let slot = match parse_slot(extracted, today) {
            Ok(slot) => slot,
            Err(err) => {
                tracing::warn!(raw = %extracted.raw_text, %err, "dropping unparseable slot");
                outcome.parse_failures += 1;
                continue;
            }
        };

        if slot.date >= reference {
            tracing::info!(
                date = %slot.date_label(),
                reference = %reference.format("%d/%m/%Y"),
                "slot is not before the reference date"
            );
            continue;
        }

        if !seen.insert((slot.date, slot.time)) {
            outcome.duplicates += 1;
            continue;
        }

        tracing::info!(
            date = %slot.date_label(),
            time = %slot.time_label(),
            "slot is before the reference date"
        );
        outcome.slots.push(slot);
    }

    outcome.slots.sort_by_key(|slot| (slot.date, slot.time));
    outcome
}
