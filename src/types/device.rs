//! Device and Firmware Types
//!
//! Value types for device identifiers, firmware schedules and OTA settings.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const MODEL_MARKER: &str = "mn=";
const SERIAL_MARKER: &str = ":sn=";

/// Compound device identifier `mn=<base64>:sn=<base64>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceIdentifier {
    raw: String,
    model_name: String,
    serial_number: String,
}

impl DeviceIdentifier {
    /// Parse an identifier, splitting on the literal `mn=` / `:sn=` markers.
    ///
    /// Both segments may carry `=` padding, so a plain colon or `=` split is
    /// not enough.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let rest = raw
            .strip_prefix(MODEL_MARKER)
            .ok_or_else(|| format!("'{}' does not start with '{}'", raw, MODEL_MARKER))?;
        let (model, serial) = rest
            .split_once(SERIAL_MARKER)
            .ok_or_else(|| format!("'{}' is missing the '{}' segment", raw, SERIAL_MARKER))?;

        let model_name = decode_segment(model).map_err(|e| format!("'{}': model {}", raw, e))?;
        let serial_number =
            decode_segment(serial).map_err(|e| format!("'{}': serial {}", raw, e))?;

        Ok(Self {
            raw: raw.to_string(),
            model_name,
            serial_number,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }
}

fn decode_segment(segment: &str) -> Result<String, String> {
    if segment.is_empty() {
        return Err("segment is empty".to_string());
    }
    let bytes = STANDARD
        .decode(segment)
        .map_err(|e| format!("segment is not valid base64: {}", e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for DeviceIdentifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// OTA update mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtaMode {
    Auto,
    Confirmation,
    Off,
}

impl OtaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Confirmation => "confirmation",
            Self::Off => "off",
        }
    }
}

impl FromStr for OtaMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "confirmation" => Ok(Self::Confirmation),
            "off" => Ok(Self::Off),
            other => Err(format!(
                "'{}' is not one of auto, confirmation, off",
                other
            )),
        }
    }
}

/// Sentinel hour meaning "all day".
pub const ALL_DAY: i32 = -1;

/// OTA maintenance window in device-local hours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtaWindow {
    pub start_hour: i32,
    pub end_hour: i32,
}

impl OtaWindow {
    pub fn all_day() -> Self {
        Self {
            start_hour: ALL_DAY,
            end_hour: ALL_DAY,
        }
    }

    pub fn is_all_day(&self) -> bool {
        self.start_hour == ALL_DAY || self.end_hour == ALL_DAY
    }
}

/// Validated firmware schedule, built per call and never tracked locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleSpec {
    pub devices: Vec<DeviceIdentifier>,
    pub firmware_id: Uuid,
    /// Unix milliseconds, strictly in the future at validation time.
    pub transfer_at_ms: i64,
    /// `YYYYMMDDHHMM` in the device's configured timezone.
    pub execute_at: String,
}

/// Clamped pagination window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub count: u32,
}
