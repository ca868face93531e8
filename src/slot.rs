//! Timestamp parsing and slot key derivation.
//!
//! Slot keys are computed in the offset carried by the parsed timestamp, so
//! `2026-01-15T12:45:00+03:00` lands in the `12:45` bucket.

use crate::error::AppError;
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

/// Start, end and time-of-day key of a requested slot. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotWindow {
    pub slot_start_date: OffsetDateTime,
    pub slot_end_date: OffsetDateTime,
    pub slot_key: String,
}

impl SlotWindow {
    pub fn parse(slot_start: &str, slot_end: &str) -> Result<Self, AppError> {
        let slot_start_date = parse_timestamp(slot_start)?;
        let slot_end_date = parse_timestamp(slot_end)?;
        Ok(Self {
            slot_key: slot_key_from_start(slot_start_date),
            slot_start_date,
            slot_end_date,
        })
    }
}

/// Parse an ISO-8601 timestamp. Timestamps without an offset are taken as UTC.
pub fn parse_timestamp(text: &str) -> Result<OffsetDateTime, AppError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidTimestamp(text.to_string()));
    }
    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(parsed);
    }
    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Iso8601::DEFAULT) {
        return Ok(parsed);
    }
    PrimitiveDateTime::parse(trimmed, &Iso8601::DEFAULT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|_| AppError::InvalidTimestamp(text.to_string()))
}

/// `HH:MM` bucket of the slot start, independent of the date.
pub fn slot_key_from_start(start: OffsetDateTime) -> String {
    format!("{:02}:{:02}", start.hour(), start.minute())
}

/// `YYYY-MM-DD_HH:MM` identifier of one concrete slot.
pub fn slot_id_from_start(start: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}_{}",
        start.year(),
        u8::from(start.month()),
        start.day(),
        slot_key_from_start(start)
    )
}

pub fn minutes_between(from: OffsetDateTime, to: OffsetDateTime) -> f64 {
    (to - from).as_seconds_f64() / 60.0
}
