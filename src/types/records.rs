//! Diagnostic Records
//!
//! Append-only records of credential acquisitions and gateway attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Classified outcome of one gateway attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Success,
    AuthFailure,
    NotFound,
    ValidationRejected,
    RateLimited,
    Transient,
    Fatal,
}

/// One gateway attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Resolved request path.
    pub endpoint: String,
    /// HTTP method.
    pub method: String,
    /// Status code, when a response was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Outcome class.
    pub outcome: CallOutcome,
    /// Error description for failed attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 1-based attempt number within the gateway call.
    pub attempt: u32,
    /// When the attempt completed.
    pub timestamp: DateTime<Utc>,
    /// Attempt duration in milliseconds.
    pub duration_ms: u64,
}

/// One credential acquisition attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionRecord {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    /// How the credential was obtained (`command`, `static`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Status code returned by the validation probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Bounded call log; the oldest record is evicted first.
#[derive(Clone, Debug)]
pub struct CallHistoryBuffer {
    capacity: usize,
    records: VecDeque<CallRecord>,
}

impl CallHistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: CallRecord) {
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Records in completion order, oldest first.
    pub fn to_vec(&self) -> Vec<CallRecord> {
        self.records.iter().cloned().collect()
    }
}
