//! Validation rules
//!
//! Pure checks over caller parameters. No I/O, no shared state.

use uuid::Uuid;

use crate::error::{FieldViolation, ValidationError};
use crate::types::{is_path_segment, DeviceIdentifier, OtaMode, OtaWindow, Pagination, ALL_DAY};

const EXECUTE_DATETIME_LEN: usize = 12;

/// Collects every violation before failing.
#[derive(Debug, Default)]
pub struct Violations {
    violations: Vec<FieldViolation>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: FieldViolation) {
        self.violations.push(violation);
    }

    /// Keep the value, or record the violation.
    pub fn check<T>(&mut self, result: Result<T, FieldViolation>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(violation) => {
                self.push(violation);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn into_error(self) -> ValidationError {
        ValidationError::new(self.violations)
    }

    pub fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, ValidationError> {
        if self.violations.is_empty() {
            Ok(value())
        } else {
            Err(ValidationError::new(self.violations))
        }
    }
}

/// The whole batch fails if any identifier does; every bad value is named.
pub fn device_ids(field: &str, raw: &[String]) -> Result<Vec<DeviceIdentifier>, FieldViolation> {
    if raw.is_empty() {
        return Err(FieldViolation::new(field, "at least one device identifier is required"));
    }

    let mut parsed = Vec::with_capacity(raw.len());
    let mut invalid = Vec::new();
    let mut reasons = Vec::new();
    for value in raw {
        match DeviceIdentifier::parse(value.trim()) {
            Ok(id) => parsed.push(id),
            Err(reason) => {
                invalid.push(value.clone());
                reasons.push(reason);
            }
        }
    }

    if invalid.is_empty() {
        Ok(parsed)
    } else {
        Err(FieldViolation::new(
            field,
            format!(
                "{} invalid device identifier(s), expected mn=<base64>:sn=<base64>: {}",
                invalid.len(),
                reasons.join("; ")
            ),
        )
        .with_values(invalid))
    }
}

pub fn firmware_id(field: &str, raw: &str) -> Result<Uuid, FieldViolation> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| FieldViolation::new(field, format!("'{}' is not a UUID", raw)))
}

/// Exactly twelve ASCII digits. Calendar correctness is the remote's call.
pub fn execute_datetime(field: &str, raw: &str) -> Result<String, FieldViolation> {
    if raw.len() == EXECUTE_DATETIME_LEN && raw.bytes().all(|b| b.is_ascii_digit()) {
        Ok(raw.to_string())
    } else {
        Err(FieldViolation::new(
            field,
            format!("'{}' must be exactly 12 digits (YYYYMMDDHHMM)", raw),
        ))
    }
}

/// Strictly after `now_ms`; equal counts as not in the future.
pub fn transfer_datetime(field: &str, at_ms: i64, now_ms: i64) -> Result<i64, FieldViolation> {
    if at_ms > now_ms {
        Ok(at_ms)
    } else {
        Err(FieldViolation::new(
            field,
            format!("{} is not after the current time {}", at_ms, now_ms),
        ))
    }
}

pub fn ota_mode(field: &str, raw: &str) -> Result<OtaMode, FieldViolation> {
    raw.parse::<OtaMode>()
        .map_err(|message| FieldViolation::new(field, message))
}

fn ota_hour(field: &str, hour: i32) -> Result<i32, FieldViolation> {
    if hour == ALL_DAY || (0..=23).contains(&hour) {
        Ok(hour)
    } else {
        Err(FieldViolation::new(
            field,
            format!("{} must be -1 (all day) or between 0 and 23", hour),
        ))
    }
}

/// Hour bounds, then ordering when the window actually drives updates.
pub fn ota_window(mode: Option<OtaMode>, start_hour: i32, end_hour: i32, violations: &mut Violations) -> Option<OtaWindow> {
    let start = violations.check(ota_hour("start_hour", start_hour));
    let end = violations.check(ota_hour("end_hour", end_hour));
    let window = OtaWindow {
        start_hour: start?,
        end_hour: end?,
    };

    if mode == Some(OtaMode::Auto) && !window.is_all_day() && window.start_hour >= window.end_hour {
        violations.push(FieldViolation::new(
            "start_hour",
            format!(
                "window {}..{} is inverted or empty; start must be before end in auto mode",
                window.start_hour, window.end_hour
            ),
        ));
        return None;
    }
    Some(window)
}

/// Out-of-range values saturate instead of failing.
pub fn pagination(page: Option<i64>, count: Option<i64>, default_count: u32, max: u32) -> Pagination {
    let max = i64::from(max.max(1));
    Pagination {
        page: page.unwrap_or(1).clamp(1, max) as u32,
        count: count
            .unwrap_or(i64::from(default_count))
            .clamp(1, max) as u32,
    }
}

pub fn group_id(raw: Option<&str>) -> Result<Option<String>, FieldViolation> {
    match raw.map(str::trim).filter(|g| !g.is_empty()) {
        None => Ok(None),
        Some(group) if is_path_segment(group) => Ok(Some(group.to_string())),
        Some(group) => Err(FieldViolation::new(
            "group_id",
            format!("'{}' contains characters not allowed in a path segment", group),
        )),
    }
}
