//! RMM Gateway
//!
//! Credential-managing gateway for a remote device-management (RMM) vendor
//! API: fleet listing, firmware scheduling and OTA configuration behind a
//! single, slow, interactive login flow.
//!
//! # Features
//!
//! - Single-flight credential acquisition shared by every concurrent caller
//! - Pre-flight validation of device identifiers, schedules and OTA windows
//! - Bounded retry with backoff for rate-limited and transient failures
//! - One forced re-login on 401/403, never a loop
//! - Bounded call history with an optional diagnostics snapshot file
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rmm_gateway::{gateway_config, CommandCredentialAcquirer, FleetClient, ListDevicesParams};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = gateway_config()
//!         .base_url("https://api.example.com/rmm/v1")
//!         .subscription_key("my-subscription-key")
//!         .token_file("auth_token.json")
//!         .build()?;
//!
//!     let acquirer = CommandCredentialAcquirer::new("python3")
//!         .arg("login.py")
//!         .token_file("auth_token_login.json");
//!     let client = FleetClient::new(config, Arc::new(acquirer))?;
//!
//!     let devices = client.list_devices(ListDevicesParams::default()).await;
//!     println!("{}", serde_json::to_string_pretty(&devices)?);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: credentials, records, device values, requests, envelopes, config
//! - `error`: error hierarchy
//! - `core`: HTTP transport and clock
//! - `acquisition`: login flow implementations
//! - `token`: lifecycle manager, probe and diagnostics store
//! - `validation`: pre-flight request validation
//! - `resilience`: retry policy
//! - `gateway`: authenticated execution with classification and retry
//! - `operations`: tool-facing operations returning result envelopes

pub mod acquisition;
pub mod builders;
pub mod core;
pub mod error;
pub mod gateway;
pub mod operations;
pub mod resilience;
pub mod token;
pub mod types;
pub mod validation;

// Re-export main client
pub use operations::{
    fleet_client, CallHistory, CancelResult, ClearResult, DeviceList, FirmwareList, FleetClient,
    OtaSettingsResult, RawResponse, ScheduleResult,
};

// Re-export builders
pub use builders::{gateway_config, GatewayConfigBuilder};

// Re-export errors
pub use error::{
    AcquisitionError, ApiError, ConfigurationError, FieldViolation, GatewayError, GatewayResult,
    NetworkError, StorageError, ValidationError,
};

// Re-export types
pub use types::{
    // Config
    GatewayConfig,
    // Credential
    Credential, CredentialClaims,
    // Device
    DeviceIdentifier, OtaMode, OtaWindow,
    // Params
    CancelUpdateParams, ConfigureOtaParams, GroupParams, ListDevicesParams, ListFirmwareParams,
    RawRequestParams, ScheduleUpdateParams,
    // Records
    AcquisitionRecord, CallOutcome, CallRecord,
    // Envelope
    OperationFailure, OperationResult,
    // Request
    ValidatedRequest,
};

// Re-export core components
pub use core::{
    Clock, FixedClock, HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockHttpTransport,
    ReqwestHttpTransport, SystemClock,
};

// Re-export acquisition
pub use acquisition::{
    AcquiredCredential, CommandCredentialAcquirer, CredentialAcquirer, MockCredentialAcquirer,
    StaticCredentialAcquirer,
};

// Re-export token management
pub use token::{
    CredentialProbe, FileSnapshotWriter, HttpCredentialProbe, MemorySnapshotWriter,
    MockCredentialProbe, MockTokenProvider, NoopSnapshotWriter, SnapshotWriter,
    TokenLifecycleManager, TokenManagerConfig, TokenProvider, TokenSnapshot, TokenState,
    TokenStatus, TokenStore,
};

// Re-export validation, resilience and gateway
pub use gateway::{ApiGateway, ApiResponse};
pub use resilience::{RetryPolicy, DEFAULT_RETRY_POLICY};
pub use validation::RequestValidator;
