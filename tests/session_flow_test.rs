mod common;

use axum::extract::{Multipart, Query};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use otaflow_lib::engine::config::{Channel, Config};
use otaflow_lib::engine::device::DeviceClient;
use otaflow_lib::engine::locks::{LockType, OperationLock};
use otaflow_lib::engine::updater::{
    session_from_config, SessionState, SignalBoard, UpdateKind,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A fake controller plus release proxy and download proxy on one server
struct MockWorld {
    base: String,
    flashed: Arc<Mutex<Vec<u8>>>,
}

async fn mock_world(tag: &str, image: Vec<u8>, ota_status: StatusCode) -> MockWorld {
    let flashed = Arc::new(Mutex::new(Vec::new()));
    let releases = common::releases_json(tag, false);

    let router = Router::new()
        .route(
            "/api/stats",
            get(|| async {
                Json(serde_json::json!({
                    "DEVICE": "Hyperk", "IP": "127.0.0.1", "RSSI": "-55 dBm",
                    "UPTIME": "120", "HEAP": "150 kB", "ARCH": "ESP32",
                    "FPS": 50, "SKIPPED": 0
                }))
            }),
        )
        .route("/releases", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route(
            "/github/releases",
            get(move || {
                let releases = releases.clone();
                async move { Json(releases) }
            }),
        )
        .route(
            "/proxy",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let image = image.clone();
                async move {
                    match params.get("url") {
                        Some(url) if url.ends_with("_esp32.bin") => Ok(image),
                        _ => Err(StatusCode::NOT_FOUND),
                    }
                }
            }),
        )
        .route(
            "/ota",
            post({
                let flashed = flashed.clone();
                move |mut multipart: Multipart| {
                    let flashed = flashed.clone();
                    async move {
                        while let Some(field) = multipart.next_field().await.unwrap() {
                            *flashed.lock().unwrap() = field.bytes().await.unwrap().to_vec();
                        }
                        (ota_status, if ota_status == StatusCode::OK { "OK" } else { "FAIL" })
                    }
                }
            }),
        );

    MockWorld {
        base: common::serve(router).await,
        flashed,
    }
}

fn config_for(world: &MockWorld, current: &str) -> Config {
    let mut config = Config::default_for_device(&world.base);
    config.device.firmware_version = Some(current.to_string());
    config.update.release_url = format!("{}/releases", world.base);
    config.update.fallback_release_url = format!("{}/github/releases", world.base);
    config.update.download_proxy_url = format!("{}/proxy", world.base);
    config
}

#[tokio::test]
async fn test_full_upgrade_over_http() {
    let image = common::firmware(120_000);
    let world = mock_world("1.5.0", image.clone(), StatusCode::OK).await;
    let mut config = config_for(&world, "1.4.0");

    let stats = DeviceClient::new(reqwest::Client::new(), &world.base)
        .stats()
        .await
        .unwrap();
    config.device.architecture = Some(stats.arch);

    let board = Arc::new(SignalBoard::new());
    let session = session_from_config(&config)
        .unwrap()
        .with_observer(board.clone());

    assert_eq!(
        session.check().await.unwrap(),
        SessionState::Available(UpdateKind::Upgrade)
    );
    assert_eq!(session.snapshot().remote_version.as_deref(), Some("1.5.0"));

    let gate = session.gate();
    let (state, _) = tokio::join!(session.request_install(), async {
        let message = gate.next_request().await;
        assert_eq!(message, "Are you sure to upgrade firmware 1.4.0 to: 1.5.0?");
        gate.resolve(true).unwrap();
    });

    assert_eq!(state.unwrap(), SessionState::Succeeded);
    assert_eq!(*world.flashed.lock().unwrap(), image);
    assert_eq!(board.status(), "Update successful! Rebooting...");
    assert_eq!(board.progress(), 100);
    assert!(board.success());
    assert!(board.save_enabled());
    assert!(!board.update_in_progress());

    let history = board.progress_history();
    assert!(history.windows(2).all(|w| w[0] <= w[1]), "{:?}", history);
}

#[tokio::test]
async fn test_device_rejects_image() {
    let world = mock_world("1.5.0", common::firmware(20_000), StatusCode::INTERNAL_SERVER_ERROR).await;
    let mut config = config_for(&world, "1.4.0");
    config.device.architecture = Some("ESP32".to_string());

    let board = Arc::new(SignalBoard::new());
    let session = session_from_config(&config)
        .unwrap()
        .with_observer(board.clone());
    session.check().await.unwrap();

    let gate = session.gate();
    let (state, _) = tokio::join!(session.request_install(), async {
        gate.next_request().await;
        gate.resolve(true).unwrap();
    });

    assert_eq!(state.unwrap(), SessionState::Failed);
    assert_eq!(board.status(), "Flash failed: FAIL");
    assert!(board.save_enabled());
    assert!(!board.success());
}

#[tokio::test]
async fn test_missing_firmware_for_architecture() {
    let world = mock_world("1.5.0", Vec::new(), StatusCode::OK).await;
    let mut config = config_for(&world, "1.4.0");
    config.device.architecture = Some("ESP32-C3".to_string());

    let session = session_from_config(&config).unwrap();
    assert_eq!(session.check().await.unwrap(), SessionState::Failed);
    assert!(session
        .snapshot()
        .failure
        .unwrap()
        .contains("_esp32-c3.bin"));
}

#[tokio::test]
async fn test_testing_channel_sees_prerelease() {
    let releases = serde_json::json!([
        {"tag_name": "1.6.0-beta.1", "prerelease": true,
         "assets": [{"name": "OTA_1.6.0-beta.1_esp32.bin", "browser_download_url": "https://example.com/b.bin"}]},
        {"tag_name": "1.5.0", "prerelease": false,
         "assets": [{"name": "OTA_1.5.0_esp32.bin", "browser_download_url": "https://example.com/s.bin"}]}
    ]);
    let base = common::serve(Router::new().route(
        "/releases",
        get(move || {
            let releases = releases.clone();
            async move { Json(releases) }
        }),
    ))
    .await;

    let mut config = Config::default_for_device(&base);
    config.device.architecture = Some("ESP32".to_string());
    config.device.firmware_version = Some("1.5.0".to_string());
    config.update.release_url = format!("{}/releases", base);

    let stable = session_from_config(&config).unwrap();
    assert_eq!(stable.check().await.unwrap(), SessionState::UpToDate);

    config.update.channel = Channel::Testing;
    let testing = session_from_config(&config).unwrap();
    assert_eq!(
        testing.check().await.unwrap(),
        SessionState::Available(UpdateKind::Upgrade)
    );
    assert_eq!(testing.snapshot().remote_version.as_deref(), Some("1.6.0-beta.1"));
}

#[test]
fn test_config_save_waits_for_flash() {
    let dir = tempfile::tempdir().unwrap();
    let locks = OperationLock::new(dir.path());

    let flash = locks.acquire(LockType::Flash).unwrap();
    assert!(locks.acquire(LockType::ConfigSave).is_err());
    drop(flash);
    assert!(locks.acquire(LockType::ConfigSave).is_ok());
}
