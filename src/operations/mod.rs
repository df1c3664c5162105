//! Domain Operations
//!
//! The tool-facing surface: each operation validates, executes through the
//! gateway and folds every outcome into an [`OperationResult`].

mod payloads;

pub use payloads::*;

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::acquisition::CredentialAcquirer;
use crate::core::{Clock, HttpTransport, ReqwestHttpTransport, SystemClock, DEFAULT_MAX_RESPONSE_SIZE};
use crate::error::{GatewayError, GatewayResult, ValidationError};
use crate::gateway::{ApiGateway, ApiResponse};
use crate::token::{
    CredentialProbe, FileSnapshotWriter, HttpCredentialProbe, NoopSnapshotWriter, SnapshotWriter,
    TokenLifecycleManager, TokenManagerConfig, TokenProvider, TokenStatus, TokenStore,
};
use crate::types::{
    CancelUpdateParams, ConfigureOtaParams, GatewayConfig, GroupParams, ListDevicesParams,
    ListFirmwareParams, OperationResult, RawRequestParams, ScheduleUpdateParams, ValidatedRequest,
};
use crate::validation::RequestValidator;

/// Fleet management client.
pub struct FleetClient<
    T: HttpTransport = ReqwestHttpTransport,
    P: TokenProvider = TokenLifecycleManager,
    C: Clock = SystemClock,
> {
    gateway: ApiGateway<T, P>,
    validator: RequestValidator<C>,
}

impl FleetClient<ReqwestHttpTransport, TokenLifecycleManager, SystemClock> {
    /// Create a client with the default transport, probe and token store.
    pub fn new(config: GatewayConfig, acquirer: Arc<dyn CredentialAcquirer>) -> GatewayResult<Self> {
        let config = Arc::new(config);
        let transport = Arc::new(ReqwestHttpTransport::with_options(
            config.attempt_timeout,
            DEFAULT_MAX_RESPONSE_SIZE,
        )?);

        let writer: Arc<dyn SnapshotWriter> = match &config.token_file {
            Some(path) => Arc::new(FileSnapshotWriter::new(path.clone())),
            None => Arc::new(NoopSnapshotWriter),
        };
        let store = Arc::new(TokenStore::new(config.call_history_capacity, writer));

        let probe: Option<Arc<dyn CredentialProbe>> = if config.probe_enabled {
            Some(Arc::new(HttpCredentialProbe::new(
                Arc::clone(&config),
                Arc::clone(&transport),
            )))
        } else {
            None
        };
        let tokens = Arc::new(TokenLifecycleManager::new(
            TokenManagerConfig::from(config.as_ref()),
            acquirer,
            probe,
            Arc::clone(&store),
        ));

        let validator = RequestValidator::new(config.max_page_size);
        Ok(Self::with_components(
            ApiGateway::new(config, transport, tokens, store),
            validator,
        ))
    }
}

impl<T: HttpTransport, P: TokenProvider, C: Clock> FleetClient<T, P, C> {
    /// Create a client from prebuilt components.
    pub fn with_components(gateway: ApiGateway<T, P>, validator: RequestValidator<C>) -> Self {
        Self { gateway, validator }
    }

    pub fn gateway(&self) -> &ApiGateway<T, P> {
        &self.gateway
    }

    pub async fn list_devices(&self, params: ListDevicesParams) -> OperationResult<DeviceList> {
        self.run(self.validator.list_devices(&params), |request, response| DeviceList {
            endpoint: response.endpoint,
            page: query_number(request, "page"),
            count: query_number(request, "count"),
            devices: response.body,
        })
        .await
    }

    pub async fn list_firmware(&self, params: ListFirmwareParams) -> OperationResult<FirmwareList> {
        self.run(self.validator.list_firmware(&params), |request, response| FirmwareList {
            endpoint: response.endpoint,
            page: query_number(request, "page"),
            count: query_number(request, "count"),
            model_name: request.query_param("modelName").map(String::from),
            firmwares: response.body,
        })
        .await
    }

    /// Schedule a firmware update. Not retried once the request may have
    /// reached the remote service.
    pub async fn schedule_firmware_update(
        &self,
        params: ScheduleUpdateParams,
    ) -> OperationResult<ScheduleResult> {
        let device_count = params.device_ids.len();
        let firmware_id = params.firmware_id.trim().to_ascii_lowercase();
        self.run(self.validator.schedule_firmware_update(&params), move |_, response| {
            ScheduleResult {
                endpoint: response.endpoint,
                status_code: response.status,
                device_count,
                firmware_id,
                response_data: response.body,
            }
        })
        .await
    }

    pub async fn cancel_firmware_update(
        &self,
        params: CancelUpdateParams,
    ) -> OperationResult<CancelResult> {
        let device_count = params.device_ids.len();
        self.run(self.validator.cancel_firmware_update(&params), move |_, response| {
            CancelResult {
                endpoint: response.endpoint,
                status_code: response.status,
                device_count,
                response_data: response.body,
            }
        })
        .await
    }

    pub async fn get_ota_settings(&self, params: GroupParams) -> OperationResult<OtaSettingsResult> {
        self.run(self.validator.get_ota_settings(&params), |_, response| ota_settings(response))
            .await
    }

    pub async fn configure_ota(&self, params: ConfigureOtaParams) -> OperationResult<OtaSettingsResult> {
        self.run(self.validator.configure_ota(&params), |_, response| ota_settings(response))
            .await
    }

    /// Arbitrary call relative to the configured base URL.
    pub async fn raw_request(&self, params: RawRequestParams) -> OperationResult<RawResponse> {
        self.run(self.validator.raw_request(&params), raw_response).await
    }

    /// Authenticated probe call confirming the current credential works.
    pub async fn verify_credential(&self) -> OperationResult<RawResponse> {
        let request = self.validator.probe(&self.gateway.config().probe_path);
        self.run(Ok(request), raw_response).await
    }

    pub async fn token_status(&self) -> OperationResult<TokenStatus> {
        OperationResult::Success(self.gateway.tokens().status().await)
    }

    /// Drive acquisition now instead of on the first call.
    pub async fn ensure_credential(&self) -> OperationResult<TokenStatus> {
        match self.gateway.tokens().ensure_valid().await {
            Ok(_) => OperationResult::Success(self.gateway.tokens().status().await),
            Err(e) => GatewayError::from(e).into(),
        }
    }

    pub async fn call_history(&self) -> OperationResult<CallHistory> {
        let store = self.gateway.store();
        let recent_calls = store.call_history().await;
        OperationResult::Success(CallHistory {
            total_calls: recent_calls.len(),
            capacity: store.call_history_capacity().await,
            recent_calls,
            retrieved_at: Utc::now(),
        })
    }

    /// Drop the cached credential, the history and the snapshot file.
    pub async fn clear_token_data(&self) -> OperationResult<ClearResult> {
        self.gateway.tokens().reset().await;
        match self.gateway.store().clear().await {
            Ok(()) => {
                info!("Token data cleared");
                OperationResult::Success(ClearResult {
                    message: "Token data cleared successfully".to_string(),
                })
            }
            Err(e) => GatewayError::from(e).into(),
        }
    }

    async fn run<R>(
        &self,
        request: Result<ValidatedRequest, ValidationError>,
        into_payload: impl FnOnce(&ValidatedRequest, ApiResponse) -> R,
    ) -> OperationResult<R> {
        self.execute(request, into_payload).await.into()
    }

    async fn execute<R>(
        &self,
        request: Result<ValidatedRequest, ValidationError>,
        into_payload: impl FnOnce(&ValidatedRequest, ApiResponse) -> R,
    ) -> GatewayResult<R> {
        let request = request?;
        let response = self.gateway.execute(&request).await?;
        Ok(into_payload(&request, response))
    }
}

/// Build a client with the default components.
pub fn fleet_client(
    config: GatewayConfig,
    acquirer: Arc<dyn CredentialAcquirer>,
) -> GatewayResult<FleetClient> {
    FleetClient::new(config, acquirer)
}

fn query_number(request: &ValidatedRequest, name: &str) -> Option<u32> {
    request.query_param(name).and_then(|v| v.parse().ok())
}

fn ota_settings(response: ApiResponse) -> OtaSettingsResult {
    OtaSettingsResult {
        endpoint: response.endpoint,
        status_code: response.status,
        settings: response.body,
    }
}

fn raw_response(request: &ValidatedRequest, response: ApiResponse) -> RawResponse {
    RawResponse {
        status_code: response.status,
        endpoint: response.endpoint,
        method: request.method().as_str().to_string(),
        response_data: response.body,
        requested_at: Utc::now(),
    }
}
