//! Scan response decoding.
//!
//! With `FORM:READ:TIME ON` and absolute time format, each channel in a scan
//! response is a 7-field record:
//!
//! `value, year, month, day, hour, minute, second.fraction`
//!
//! The fractional-seconds digits are read as a millisecond count (the
//! instrument emits exactly three), so `45.123` is 45 s + 123 ms. Calendar
//! fields are the instrument's wall clock and are read in the host's local
//! zone by `decode`; `decode_in` takes the zone explicitly.

use chrono::{Local, NaiveDate, TimeZone};

use crate::error::DecodeError;

/// Number of comma-separated fields per channel record.
pub const FIELDS_PER_RECORD: usize = 7;

const FIELD_NAMES: [&str; FIELDS_PER_RECORD] =
    ["value", "year", "month", "day", "hour", "minute", "second"];

/// One decoded scan: per-channel voltage and epoch timestamp, in scan order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSample {
    pub values: Vec<f64>,
    /// Seconds since the Unix epoch, microsecond resolution.
    pub timestamps: Vec<f64>,
}

impl RawSample {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(value, timestamp)` pairs in scan order.
    pub fn readings(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.values.iter().copied().zip(self.timestamps.iter().copied())
    }
}

/// Decode one scan response carrying `total_channels` records, reading
/// time stamps as local time.
///
/// All-or-nothing: any bad field fails the whole scan.
pub fn decode(response: &str, total_channels: usize) -> Result<RawSample, DecodeError> {
    decode_in(response, total_channels, &Local)
}

/// `decode` with the instrument clock's zone given explicitly.
///
/// A wall-clock time that occurs twice (DST fall-back) takes the earlier
/// instant; one that never occurs (spring-forward gap) is `InvalidNumber`.
pub fn decode_in<Tz: TimeZone>(
    response: &str,
    total_channels: usize,
    zone: &Tz,
) -> Result<RawSample, DecodeError> {
    let trimmed = response.trim();
    let fields: Vec<&str> = if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split(',').map(str::trim).collect()
    };

    let expected = total_channels * FIELDS_PER_RECORD;
    if fields.len() < expected || fields.len() % FIELDS_PER_RECORD != 0 {
        return Err(DecodeError::MalformedRecord {
            expected,
            found: fields.len(),
        });
    }
    if fields.len() > expected {
        tracing::debug!(
            expected,
            found = fields.len(),
            "ignoring surplus records in scan response"
        );
    }

    let mut values = Vec::with_capacity(total_channels);
    let mut timestamps = Vec::with_capacity(total_channels);
    for (record, chunk) in fields
        .chunks_exact(FIELDS_PER_RECORD)
        .take(total_channels)
        .enumerate()
    {
        let (value, ts) = decode_record(record, chunk, zone)?;
        values.push(value);
        timestamps.push(ts);
    }
    Ok(RawSample { values, timestamps })
}

fn invalid(record: usize, field: &'static str, text: &str) -> DecodeError {
    DecodeError::InvalidNumber {
        record,
        field,
        text: text.to_string(),
    }
}

fn parse_field<T: std::str::FromStr>(
    record: usize,
    chunk: &[&str],
    field: usize,
) -> Result<T, DecodeError> {
    chunk[field]
        .parse::<T>()
        .map_err(|_| invalid(record, FIELD_NAMES[field], chunk[field]))
}

fn decode_record<Tz: TimeZone>(
    record: usize,
    chunk: &[&str],
    zone: &Tz,
) -> Result<(f64, f64), DecodeError> {
    let value: f64 = parse_field(record, chunk, 0)?;
    if !value.is_finite() {
        return Err(invalid(record, FIELD_NAMES[0], chunk[0]));
    }
    let year: i32 = parse_field(record, chunk, 1)?;
    let month: u32 = parse_field(record, chunk, 2)?;
    let day: u32 = parse_field(record, chunk, 3)?;
    let hour: u32 = parse_field(record, chunk, 4)?;
    let minute: u32 = parse_field(record, chunk, 5)?;

    let sec_text = chunk[6];
    let bad_second = || invalid(record, FIELD_NAMES[6], sec_text);
    let (whole, frac) = sec_text.split_once('.').ok_or_else(bad_second)?;
    if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad_second());
    }
    let second: u32 = whole.parse().map_err(|_| bad_second())?;
    let micros = frac
        .parse::<u32>()
        .ok()
        .and_then(|ms| ms.checked_mul(1000))
        .filter(|us| *us < 1_000_000)
        .ok_or_else(bad_second)?;

    let epoch_us = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_micro_opt(hour, minute, second, micros))
        .and_then(|naive| zone.from_local_datetime(&naive).earliest())
        .ok_or_else(|| invalid(record, "timestamp", &chunk[1..].join(",")))?
        .timestamp_micros();
    Ok((value, epoch_us as f64 / 1e6))
}
