//! Domain operations end to end

use super::*;
use rmm_gateway::{
    CancelUpdateParams, ConfigureOtaParams, FleetClient, ListFirmwareParams,
    MockCredentialAcquirer, RawRequestParams,
};
use std::sync::Arc;
use wiremock::matchers::{body_json, method, path, query_param};

#[tokio::test]
async fn test_snapshot_file_tracks_calls_and_never_holds_token() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("state").join("auth_token.json");
    let token = test_token("auth0|operator");

    Mock::given(method("GET"))
        .and(path("/v1/groups/group-42/firmwares"))
        .and(query_param("modelName", "BP-70C65"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"id": "fw-1"}]})))
        .mount(&server)
        .await;

    let config = test_config(&server)
        .token_file(&token_file)
        .call_history_capacity(2)
        .build()
        .unwrap();
    let acquirer = Arc::new(MockCredentialAcquirer::with_token(token.clone()));
    let client = FleetClient::new(config, acquirer).unwrap();

    for _ in 0..3 {
        let result = client
            .list_firmware(ListFirmwareParams {
                model_name: Some("BP-70C65".to_string()),
                ..Default::default()
            })
            .await;
        assert!(result.is_success());
    }

    let raw = std::fs::read_to_string(&token_file).unwrap();
    assert!(!raw.contains(&token));
    let snapshot: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(snapshot["credential"]["subject"], "auth0|operator");
    assert_eq!(snapshot["credential"]["group_id"], "group-42");
    assert_eq!(snapshot["last_acquisition"]["success"], true);
    assert_eq!(snapshot["last_acquisition"]["probe_status"], 200);
    assert_eq!(snapshot["api_calls"].as_array().unwrap().len(), 2);

    let history = client.call_history().await.into_success().unwrap();
    assert_eq!(history.total_calls, 2);
    assert_eq!(history.capacity, 2);

    let cleared = client.clear_token_data().await;
    assert!(cleared.is_success());
    assert!(!token_file.exists());
    assert_eq!(client.call_history().await.into_success().unwrap().total_calls, 0);
}

#[tokio::test]
async fn test_remote_validation_body_surfaced_verbatim() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;
    let rejection = json!({
        "errors": [{"field": "firmwareId", "message": "firmware not applicable to model"}]
    });

    Mock::given(method("POST"))
        .and(path("/v1/groups/group-42/firmware-updates/cancel"))
        .and(body_json(json!({
            "deviceIds": ["mn=U2hhcnA=:sn=MTIzNDU2Nzg="],
            "firmwareId": "3f2504e0-4f89-11d3-9a0c-0305e82c3301",
        })))
        .respond_with(ResponseTemplate::new(422).set_body_json(rejection.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = FleetClient::new(test_config(&server).build().unwrap(), acquirer).unwrap();

    let result = client
        .cancel_firmware_update(CancelUpdateParams {
            group_id: None,
            device_ids: vec!["mn=U2hhcnA=:sn=MTIzNDU2Nzg=".to_string()],
            firmware_id: Some("3F2504E0-4F89-11D3-9A0C-0305E82C3301".to_string()),
        })
        .await;

    let envelope = serde_json::to_value(&result).unwrap();
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error_code"], "RMM_REJECTED");
    assert_eq!(envelope["error_details"], rejection);
}

#[tokio::test]
async fn test_invalid_ota_window_never_reaches_network() {
    let server = setup_mock_server().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = FleetClient::new(test_config(&server).build().unwrap(), acquirer.clone()).unwrap();

    let result = client
        .configure_ota(ConfigureOtaParams {
            group_id: None,
            ota_mode: "auto".to_string(),
            start_hour: 6,
            end_hour: 2,
        })
        .await;

    let failure = result.failure().unwrap();
    assert_eq!(failure.error_code, "RMM_VALIDATION");
    assert_eq!(failure.error_details.as_ref().unwrap()[0]["field"], "start_hour");
    assert_eq!(acquirer.call_count(), 0);
}

#[tokio::test]
async fn test_explicit_group_overrides_token_claim() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;

    Mock::given(method("PUT"))
        .and(path("/v1/groups/group-7/ota-settings"))
        .and(body_json(json!({"otaMode": "auto", "startHour": 1, "endHour": 5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"otaMode": "auto"})))
        .expect(1)
        .mount(&server)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = FleetClient::new(test_config(&server).build().unwrap(), acquirer).unwrap();

    let result = client
        .configure_ota(ConfigureOtaParams {
            group_id: Some("group-7".to_string()),
            ota_mode: "AUTO".to_string(),
            start_hour: 1,
            end_hour: 5,
        })
        .await;

    let settings = result.into_success().unwrap();
    assert_eq!(settings.endpoint, "/groups/group-7/ota-settings");
    assert_eq!(settings.settings["otaMode"], "auto");
}

#[tokio::test]
async fn test_raw_request_passes_query_and_body() {
    let server = setup_mock_server().await;
    mount_probe(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/groups/group-42/devices/search"))
        .and(query_param("expand", "firmware"))
        .and(body_json(json!({"modelName": "BP-70C65"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let acquirer = Arc::new(MockCredentialAcquirer::with_token(test_token("auth0|operator")));
    let client = FleetClient::new(test_config(&server).build().unwrap(), acquirer).unwrap();

    let result = client
        .raw_request(RawRequestParams {
            endpoint: "/groups/group-42/devices/search?expand=firmware".to_string(),
            method: "post".to_string(),
            data: Some(json!({"modelName": "BP-70C65"})),
        })
        .await;

    let envelope = serde_json::to_value(&result).unwrap();
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["status_code"], 200);
    assert_eq!(envelope["method"], "POST");
    assert_eq!(envelope["endpoint"], "/groups/group-42/devices/search");
}
