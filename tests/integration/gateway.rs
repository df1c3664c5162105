//! Gateway behavior over a real HTTP transport

use super::*;
use rmm_gateway::{
    FleetClient, ListDevicesParams, MockCredentialAcquirer, RawRequestParams,
    ScheduleUpdateParams, TokenState,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_test::assert_ok;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};

fn client(server: &MockServer, acquirer: &Arc<MockCredentialAcquirer>) -> FleetClient {
    let config = test_config(server).build().unwrap();
    FleetClient::new(config, acquirer.clone()).unwrap()
}

#[tokio::test]
async fn test_request_carries_credential_and_subscription_key() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;
    let token = test_token("auth0|operator");

    Mock::given(method("GET"))
        .and(path("/v1/groups/group-42/devices"))
        .and(query_param("page", "2"))
        .and(query_param("count", "20"))
        .and(header("authorization", bearer(&token).as_str()))
        .and(header("ocp-apim-subscription-key", SUBSCRIPTION_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [], "total": 0})))
        .expect(1)
        .mount(&server)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::with_token(token));
    let client = client(&server, &acquirer);

    let result = client
        .list_devices(ListDevicesParams {
            page: Some(2),
            ..Default::default()
        })
        .await;

    let devices = result.into_success().unwrap();
    assert_eq!(devices.devices["total"], 0);
    assert_eq!(acquirer.call_count(), 1);
}

#[tokio::test]
async fn test_rate_limit_waits_for_retry_after() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/groups/group-42/ota-settings"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/groups/group-42/ota-settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"otaMode": "off"})))
        .expect(1)
        .mount(&server)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = client(&server, &acquirer);

    let started = Instant::now();
    let settings = client
        .get_ota_settings(Default::default())
        .await
        .into_success()
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(settings.settings["otaMode"], "off");
}

#[tokio::test]
async fn test_rate_limit_budget_surfaces_last_error() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/groups/group-42/devices"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "0")
                .set_body_json(json!({"message": "Rate limit is exceeded"})),
        )
        .expect(3)
        .mount(&server)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = client(&server, &acquirer);

    let result = client.list_devices(Default::default()).await;
    let failure = result.failure().unwrap();
    assert_eq!(failure.error_code, "RMM_RATE_LIMITED");
    assert_eq!(
        failure.error_details.as_ref().unwrap()["message"],
        "Rate limit is exceeded"
    );
}

#[tokio::test]
async fn test_auth_failure_reacquires_once_and_retries() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;
    let stale = test_token("auth0|stale");
    let fresh = test_token("auth0|fresh");

    Mock::given(method("GET"))
        .and(path("/v1/groups/group-42/devices"))
        .and(header("authorization", bearer(&stale).as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/groups/group-42/devices"))
        .and(header("authorization", bearer(&fresh).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::new());
    acquirer.queue_token(stale).queue_token(fresh);
    let client = client(&server, &acquirer);

    let result = client.list_devices(Default::default()).await;
    assert!(result.is_success());
    assert_eq!(acquirer.call_count(), 2);

    let status = client.token_status().await.into_success().unwrap();
    assert_eq!(status.state, TokenState::Valid);
    assert_eq!(status.subject.as_deref(), Some("auth0|fresh"));
}

#[tokio::test]
async fn test_second_auth_failure_is_surfaced() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/groups/group-42/devices"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
        .expect(2)
        .mount(&server)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = client(&server, &acquirer);

    let result = client.list_devices(Default::default()).await;
    assert_eq!(result.failure().unwrap().error_code, "RMM_AUTH");
    assert_eq!(acquirer.call_count(), 2);
}

#[tokio::test]
async fn test_schedule_not_retried_after_server_error() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/groups/group-42/firmware-updates"))
        .and(body_partial_json(json!({
            "deviceIds": ["mn=U2hhcnA=:sn=MTIzNDU2Nzg="],
            "executeDateTime": "202501011230",
        })))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = client(&server, &acquirer);

    let result = client
        .schedule_firmware_update(ScheduleUpdateParams {
            group_id: None,
            device_ids: vec!["mn=U2hhcnA=:sn=MTIzNDU2Nzg=".to_string()],
            firmware_id: uuid::Uuid::new_v4().to_string(),
            transfer_datetime: chrono::Utc::now().timestamp_millis() + 3_600_000,
            execute_datetime: "202501011230".to_string(),
        })
        .await;

    assert_eq!(result.failure().unwrap().error_code, "RMM_TRANSIENT");
}

#[tokio::test]
async fn test_idempotent_request_retried_after_server_error() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;

    Mock::given(method("PUT"))
        .and(path("/v1/groups/group-42/ota-settings"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/groups/group-42/ota-settings"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = client(&server, &acquirer);

    let result = client
        .raw_request(RawRequestParams {
            endpoint: "/groups/group-42/ota-settings".to_string(),
            method: "PUT".to_string(),
            data: Some(json!({"otaMode": "off", "startHour": -1, "endHour": -1})),
        })
        .await;

    let response = result.into_success().unwrap();
    assert_eq!(response.status_code, 204);
    assert!(response.response_data.is_null());
}

#[tokio::test]
async fn test_probe_rejection_fails_without_calling_endpoint() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/v1/tenants"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/groups/group-42/devices"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = client(&server, &acquirer);

    let result = client.list_devices(Default::default()).await;
    let failure = result.failure().unwrap();
    assert_eq!(failure.error_code, "RMM_ACQUISITION");
    assert!(failure.error.contains("403"));

    let status = client.token_status().await.into_success().unwrap();
    assert_eq!(status.state, TokenState::Invalid);
}

#[tokio::test]
async fn test_concurrent_operations_share_one_login() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/groups/group-42/firmwares"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(8)
        .mount(&server)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    acquirer.set_delay(Duration::from_millis(200));
    let client = Arc::new(client(&server, &acquirer));

    let calls: Vec<_> = (0..8)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.list_firmware(Default::default()).await })
        })
        .collect();
    for call in calls {
        let result = assert_ok!(call.await);
        assert!(result.is_success());
    }

    assert_eq!(acquirer.call_count(), 1);
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    let server = setup_mock_server().await;
    let base = server.uri();
    drop(server);

    let config = gateway_config()
        .base_url(format!("{}/v1", base))
        .probe_enabled(false)
        .retry(RetryPolicy::none())
        .build()
        .unwrap();
    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = FleetClient::new(config, acquirer).unwrap();

    let result = client.verify_credential().await;
    assert_eq!(result.failure().unwrap().error_code, "RMM_TRANSIENT");
}

#[tokio::test]
async fn test_redirect_is_not_followed() {
    let server = setup_mock_server().await;
    let elsewhere = setup_mock_server().await;
    mount_probe(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/groups/group-42/devices"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/collect", elsewhere.uri()).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(0)
        .mount(&elsewhere)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = client(&server, &acquirer);

    let result = client.list_devices(Default::default()).await;
    assert_eq!(result.failure().unwrap().error_code, "RMM_FATAL");
    assert!(elsewhere.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_slow_read_times_out_and_is_retried() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/groups/group-42/devices"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"items": []}))
                .set_delay(Duration::from_secs(2)),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/groups/group-42/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [], "total": 0})))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server)
        .attempt_timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = FleetClient::new(config, acquirer).unwrap();

    let started = Instant::now();
    let devices = client
        .list_devices(Default::default())
        .await
        .into_success()
        .unwrap();

    assert_eq!(devices.devices["total"], 0);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_slow_schedule_surfaced_after_one_attempt() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/groups/group-42/firmware-updates"))
        .respond_with(ResponseTemplate::new(202).set_delay(Duration::from_secs(2)))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server)
        .attempt_timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = FleetClient::new(config, acquirer).unwrap();

    let result = client
        .schedule_firmware_update(ScheduleUpdateParams {
            group_id: None,
            device_ids: vec!["mn=U2hhcnA=:sn=MTIzNDU2Nzg=".to_string()],
            firmware_id: uuid::Uuid::new_v4().to_string(),
            transfer_datetime: chrono::Utc::now().timestamp_millis() + 3_600_000,
            execute_datetime: "202501011230".to_string(),
        })
        .await;

    let failure = result.failure().unwrap();
    assert_eq!(failure.error_code, "RMM_TRANSIENT");
    assert!(failure.error.contains("timeout"), "{}", failure.error);
}
