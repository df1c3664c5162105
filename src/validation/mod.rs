//! Request Validation
//!
//! Turns caller parameters into [`ValidatedRequest`]s, reporting every
//! violated field at once.

pub mod rules;

use serde_json::{json, Value};
use std::sync::Arc;

use crate::core::{Clock, HttpMethod, SystemClock};
use crate::error::{FieldViolation, ValidationError};
use crate::types::{
    CancelUpdateParams, ConfigureOtaParams, GroupParams, ListDevicesParams, ListFirmwareParams,
    RawRequestParams, ScheduleSpec, ScheduleUpdateParams, ValidatedRequest,
    DEFAULT_MAX_PAGE_SIZE,
};
use rules::Violations;

/// Page size used when the caller gives none.
pub const DEFAULT_PAGE_COUNT: u32 = 20;

/// Vendor API paths.
pub mod paths {
    pub const DEVICES: &str = "/groups/{group}/devices";
    pub const FIRMWARES: &str = "/groups/{group}/firmwares";
    pub const FIRMWARE_UPDATES: &str = "/groups/{group}/firmware-updates";
    pub const FIRMWARE_UPDATES_CANCEL: &str = "/groups/{group}/firmware-updates/cancel";
    pub const OTA_SETTINGS: &str = "/groups/{group}/ota-settings";
}

/// Request validator.
pub struct RequestValidator<C: Clock = SystemClock> {
    clock: Arc<C>,
    max_page_size: u32,
}

impl RequestValidator<SystemClock> {
    pub fn new(max_page_size: u32) -> Self {
        Self::with_clock(Arc::new(SystemClock), max_page_size)
    }
}

impl Default for RequestValidator<SystemClock> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAGE_SIZE)
    }
}

impl<C: Clock> RequestValidator<C> {
    pub fn with_clock(clock: Arc<C>, max_page_size: u32) -> Self {
        Self {
            clock,
            max_page_size: max_page_size.max(1),
        }
    }

    pub fn list_devices(&self, params: &ListDevicesParams) -> Result<ValidatedRequest, ValidationError> {
        let mut violations = Violations::new();
        let group = violations.check(rules::group_id(params.group_id.as_deref()));
        let page = rules::pagination(params.page, params.count, DEFAULT_PAGE_COUNT, self.max_page_size);

        violations.finish(|| {
            ValidatedRequest::new("list_devices", HttpMethod::Get, paths::DEVICES)
                .with_group(group.flatten())
                .with_query("page", page.page)
                .with_query("count", page.count)
        })
    }

    pub fn list_firmware(&self, params: &ListFirmwareParams) -> Result<ValidatedRequest, ValidationError> {
        let mut violations = Violations::new();
        let group = violations.check(rules::group_id(params.group_id.as_deref()));
        let page = rules::pagination(params.page, params.count, DEFAULT_PAGE_COUNT, self.max_page_size);
        let model = params
            .model_name
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from);

        violations.finish(|| {
            let request = ValidatedRequest::new("list_firmware", HttpMethod::Get, paths::FIRMWARES)
                .with_group(group.flatten())
                .with_query("page", page.page)
                .with_query("count", page.count);
            match model {
                Some(model) => request.with_query("modelName", model),
                None => request,
            }
        })
    }

    /// Validate a schedule. The execute time is device-local and may be in
    /// the past from this host's point of view.
    pub fn schedule_firmware_update(
        &self,
        params: &ScheduleUpdateParams,
    ) -> Result<ValidatedRequest, ValidationError> {
        let now_ms = self.clock.now_ms();
        let mut violations = Violations::new();

        let group = violations.check(rules::group_id(params.group_id.as_deref()));
        let devices = violations.check(rules::device_ids("device_ids", &params.device_ids));
        let firmware = violations.check(rules::firmware_id("firmware_id", &params.firmware_id));
        let transfer = violations.check(rules::transfer_datetime(
            "transfer_datetime",
            params.transfer_datetime,
            now_ms,
        ));
        let execute =
            violations.check(rules::execute_datetime("execute_datetime", &params.execute_datetime));

        let (Some(group), Some(devices), Some(firmware_id), Some(transfer_at_ms), Some(execute_at)) =
            (group, devices, firmware, transfer, execute)
        else {
            return Err(violations.into_error());
        };

        let spec = ScheduleSpec {
            devices,
            firmware_id,
            transfer_at_ms,
            execute_at,
        };
        Ok(
            ValidatedRequest::new("schedule_firmware_update", HttpMethod::Post, paths::FIRMWARE_UPDATES)
                .with_group(group)
                .with_body(schedule_body(&spec)),
        )
    }

    pub fn cancel_firmware_update(
        &self,
        params: &CancelUpdateParams,
    ) -> Result<ValidatedRequest, ValidationError> {
        let mut violations = Violations::new();
        let group = violations.check(rules::group_id(params.group_id.as_deref()));
        let devices = violations.check(rules::device_ids("device_ids", &params.device_ids));
        let firmware = match params.firmware_id.as_deref() {
            Some(raw) => violations
                .check(rules::firmware_id("firmware_id", raw))
                .map(Some),
            None => Some(None),
        };

        let (Some(group), Some(devices), Some(firmware)) = (group, devices, firmware) else {
            return Err(violations.into_error());
        };

        let mut body = json!({ "deviceIds": devices });
        if let Some(firmware_id) = firmware {
            body["firmwareId"] = json!(firmware_id.to_string());
        }
        Ok(ValidatedRequest::new(
            "cancel_firmware_update",
            HttpMethod::Post,
            paths::FIRMWARE_UPDATES_CANCEL,
        )
        .with_group(group)
        .with_body(body))
    }

    pub fn get_ota_settings(&self, params: &GroupParams) -> Result<ValidatedRequest, ValidationError> {
        let mut violations = Violations::new();
        let group = violations.check(rules::group_id(params.group_id.as_deref()));
        violations.finish(|| {
            ValidatedRequest::new("get_ota_settings", HttpMethod::Get, paths::OTA_SETTINGS)
                .with_group(group.flatten())
        })
    }

    pub fn configure_ota(&self, params: &ConfigureOtaParams) -> Result<ValidatedRequest, ValidationError> {
        let mut violations = Violations::new();
        let group = violations.check(rules::group_id(params.group_id.as_deref()));
        let mode = violations.check(rules::ota_mode("ota_mode", &params.ota_mode));
        let window = rules::ota_window(mode, params.start_hour, params.end_hour, &mut violations);

        let (Some(group), Some(mode), Some(window)) = (group, mode, window) else {
            return Err(violations.into_error());
        };

        Ok(
            ValidatedRequest::new("configure_ota", HttpMethod::Put, paths::OTA_SETTINGS)
                .with_group(group)
                .with_body(json!({
                    "otaMode": mode,
                    "startHour": window.start_hour,
                    "endHour": window.end_hour,
                })),
        )
    }

    /// Arbitrary relative call. Absolute URLs are refused so the credential
    /// never leaves the configured host.
    pub fn raw_request(&self, params: &RawRequestParams) -> Result<ValidatedRequest, ValidationError> {
        let mut violations = Violations::new();

        let method = HttpMethod::parse(&params.method);
        if method.is_none() {
            violations.push(FieldViolation::new(
                "method",
                format!("'{}' is not one of GET, POST, PUT, DELETE", params.method),
            ));
        }

        let endpoint = params.endpoint.trim();
        let (path, query) = endpoint.split_once('?').unwrap_or((endpoint, ""));
        if !is_relative_path(path) {
            violations.push(FieldViolation::new(
                "endpoint",
                format!("'{}' must be a relative path starting with '/'", params.endpoint),
            ));
        }

        let body = params.data.clone().filter(|d| !d.is_null());
        if body.is_some() && matches!(method, Some(HttpMethod::Get | HttpMethod::Delete)) {
            violations.push(FieldViolation::new(
                "data",
                format!("a body is not allowed with {}", params.method.to_uppercase()),
            ));
        }

        let Some(method) = method else {
            return Err(violations.into_error());
        };

        violations.finish(|| {
            let mut request = ValidatedRequest::new("raw_request", method, path);
            for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
                request = request.with_query(name, value);
            }
            match body {
                Some(body) => request.with_body(body),
                None => request,
            }
        })
    }

    /// Authenticated request confirming the credential is accepted.
    pub fn probe(&self, probe_path: &str) -> ValidatedRequest {
        ValidatedRequest::new("verify_credential", HttpMethod::Get, probe_path)
    }
}

fn is_relative_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains("://")
        && !path.contains("..")
        && !path.to_ascii_lowercase().contains("%2e")
        && !path.chars().any(|c| c.is_whitespace() || c.is_control() || c == '#')
}

fn schedule_body(spec: &ScheduleSpec) -> Value {
    json!({
        "deviceIds": spec.devices,
        "firmwareId": spec.firmware_id.to_string(),
        "transferDateTime": spec.transfer_at_ms,
        "executeDateTime": spec.execute_at,
    })
}
