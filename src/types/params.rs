//! Operation Parameters
//!
//! Caller-supplied parameters, exactly as received from the tool layer.

use serde::Deserialize;
use serde_json::Value;

use super::ALL_DAY;

/// Parameters for operations scoped to a group only.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct GroupParams {
    #[serde(default)]
    pub group_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ListDevicesParams {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub count: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ListFirmwareParams {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub count: Option<i64>,
    /// Restrict to firmware for one model.
    #[serde(default)]
    pub model_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ScheduleUpdateParams {
    #[serde(default)]
    pub group_id: Option<String>,
    pub device_ids: Vec<String>,
    pub firmware_id: String,
    /// Unix milliseconds.
    pub transfer_datetime: i64,
    /// `YYYYMMDDHHMM`, device-local.
    pub execute_datetime: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CancelUpdateParams {
    #[serde(default)]
    pub group_id: Option<String>,
    pub device_ids: Vec<String>,
    #[serde(default)]
    pub firmware_id: Option<String>,
}

fn all_day() -> i32 {
    ALL_DAY
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ConfigureOtaParams {
    #[serde(default)]
    pub group_id: Option<String>,
    pub ota_mode: String,
    #[serde(default = "all_day")]
    pub start_hour: i32,
    #[serde(default = "all_day")]
    pub end_hour: i32,
}

fn get() -> String {
    "GET".to_string()
}

/// Arbitrary call against the vendor API.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawRequestParams {
    /// Relative path, optionally with a query string.
    pub endpoint: String,
    #[serde(default = "get")]
    pub method: String,
    #[serde(default)]
    pub data: Option<Value>,
}
