#![allow(dead_code)]

use axum::Router;
use std::net::SocketAddr;

/// Serve `router` on an ephemeral port and return its base URL
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Base URL of a port nothing listens on
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn firmware(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn releases_json(tag: &str, prerelease: bool) -> serde_json::Value {
    serde_json::json!([{
        "tag_name": tag,
        "name": format!("Hyperk {}", tag),
        "prerelease": prerelease,
        "assets": [
            {
                "name": format!("OTA_{}_esp8266.bin", tag),
                "browser_download_url": format!("https://github.com/awawa-dev/Hyperk/releases/download/{}/OTA_{}_esp8266.bin", tag, tag),
                "size": 512000
            },
            {
                "name": format!("OTA_{}_esp32.bin", tag),
                "browser_download_url": format!("https://github.com/awawa-dev/Hyperk/releases/download/{}/OTA_{}_esp32.bin", tag, tag),
                "size": 1024000
            }
        ]
    }])
}
