//! Runs the update checker against a local fake of the GitHub releases endpoint.

use std::net::SocketAddr;

use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use dayflow::update::UpdateChecker;
use serde_json::json;

async fn latest_release(Path((owner, name)): Path<(String, String)>, headers: HeaderMap) -> Response {
    // GitHub rejects requests without a user agent.
    if !headers.contains_key("user-agent") {
        return (StatusCode::FORBIDDEN, "user agent required").into_response();
    }
    if (owner.as_str(), name.as_str()) != ("someone", "dayflow") {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    Json(json!({
        "tag_name": "v1.4.0",
        "body": "Faster analysis",
        "assets": [
            {"name": "checksums.txt", "browser_download_url": "https://example.com/checksums.txt", "size": 10},
            {"name": "Dayflow-Setup.exe", "browser_download_url": "https://example.com/setup.exe", "size": 2048},
            {"name": "Dayflow-1.4.0.zip", "browser_download_url": "https://example.com/dayflow.zip", "size": 1024}
        ]
    }))
    .into_response()
}

async fn start_fake_github() -> SocketAddr {
    let app = Router::new().route("/repos/:owner/:name/releases/latest", get(latest_release));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn checker(addr: SocketAddr, repository: &str) -> UpdateChecker {
    UpdateChecker::with_api_base(format!("http://{addr}/"), repository.into()).unwrap()
}

#[tokio::test]
async fn newer_release_selects_archive() {
    let addr = start_fake_github().await;

    let info = checker(addr, "someone/dayflow").check("1.3.9").await.unwrap();

    assert!(info.has_update());
    assert_eq!(info.latest_version, "1.4.0");
    assert_eq!(info.release_notes, "Faster analysis");
    assert_eq!(info.release_page, "https://github.com/someone/dayflow/releases");
    let asset = info.asset.unwrap();
    assert_eq!(asset.name, "Dayflow-1.4.0.zip");
    assert_eq!(asset.size, 1024);
}

#[tokio::test]
async fn release_without_assets_points_to_release_page() {
    let app = Router::new().route(
        "/repos/:owner/:name/releases/latest",
        get(|| async { Json(json!({"tag_name": "v2.0.0", "assets": []})) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let info = checker(addr, "someone/dayflow").check("1.0.0").await.unwrap();

    assert!(info.has_update());
    assert_eq!(info.asset, None);
    assert_eq!(info.release_page, "https://github.com/someone/dayflow/releases");
}

#[tokio::test]
async fn current_release_has_no_asset() {
    let addr = start_fake_github().await;

    let info = checker(addr, "someone/dayflow").check("1.4").await.unwrap();

    assert!(!info.has_update());
    assert_eq!(info.asset, None);
}

#[tokio::test]
async fn unknown_repository_is_an_error() {
    let addr = start_fake_github().await;

    assert!(checker(addr, "someone/else").check("1.0.0").await.is_err());
}
