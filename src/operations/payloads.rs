//! Operation Payloads
//!
//! Success payloads, flattened into the result envelope next to `success`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::types::CallRecord;

/// One page of devices.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceList {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Remote payload, untouched.
    pub devices: Value,
}

/// One page of firmware.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FirmwareList {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub firmwares: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScheduleResult {
    pub endpoint: String,
    pub status_code: u16,
    pub device_count: usize,
    pub firmware_id: String,
    pub response_data: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CancelResult {
    pub endpoint: String,
    pub status_code: u16,
    pub device_count: usize,
    pub response_data: Value,
}

/// OTA settings as read back from, or accepted by, the remote service.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OtaSettingsResult {
    pub endpoint: String,
    pub status_code: u16,
    pub settings: Value,
}

/// Response of an arbitrary call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RawResponse {
    pub status_code: u16,
    pub endpoint: String,
    pub method: String,
    pub response_data: Value,
    pub requested_at: DateTime<Utc>,
}

/// Recent gateway attempts, oldest first.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CallHistory {
    pub total_calls: usize,
    pub capacity: usize,
    pub recent_calls: Vec<CallRecord>,
    pub retrieved_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClearResult {
    pub message: String,
}
