//! Shared helpers for driving the relay router in-process
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::Router;
use http::{Request, Response, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

use ::common::prelude::*;
use burnbox_daemon::http_server::{self, Config};
use burnbox_daemon::ServiceState;

pub const SECRET: &str = "http-secret";
pub const BOUNDARY: &str = "burnbox-test-boundary";
pub const MAX_UPLOAD_BYTES: u64 = 1024;

pub struct TestServer {
    pub router: Router,
    pub relay: Relay,
    pub worker: BurnWorker,
    pub clock: ManualClock,
    pub dir: TempDir,
}

impl TestServer {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Upload `data` through `/upload` and return the raw response
    pub async fn upload(&self, credential: &str, data: &[u8], key: Option<&str>) -> Response<Body> {
        self.send(upload_request(credential, data, key)).await
    }

    /// Upload and split the `task_id|token` receipt
    pub async fn upload_ok(&self, credential: &str, data: &[u8], key: Option<&str>) -> (String, String) {
        let response = self.upload(credential, data, key).await;
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        let (id, token) = text.split_once('|').unwrap();
        (id.to_string(), token.to_string())
    }

    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.relay.tasks().blobs().root())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub async fn setup_server() -> TestServer {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let blobs = BlobStore::new(dir.path().join("blobs")).await.unwrap();
    let config = RelayConfig {
        upload_secret: Some(SECRET.to_string()),
        max_upload_bytes: MAX_UPLOAD_BYTES,
        ..RelayConfig::default()
    };
    let (relay, worker) = Relay::new(config, blobs, Arc::new(clock.clone()));
    let http_config = Config::new("127.0.0.1:0".parse().unwrap(), MAX_UPLOAD_BYTES);
    let router = http_server::router(&http_config, ServiceState::from(relay.clone()));
    TestServer {
        router,
        relay,
        worker,
        clock,
        dir,
    }
}

/// Hand-built multipart body with a `file` part and an optional `key` field
pub fn multipart_body(data: &[u8], key: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(key) = key {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"key\"\r\n\r\n{key}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"payload.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(credential: &str, data: &[u8], key: Option<&str>) -> Request<Body> {
    let body = multipart_body(data, key);
    Request::post("/upload")
        .header("x-upload-token", credential)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap()
}

pub fn download_request(task_id: Option<&str>, credential: &str) -> Request<Body> {
    let uri = match task_id {
        Some(id) => format!("/download-file/{id}"),
        None => "/download-file".to_string(),
    };
    Request::get(uri)
        .header("x-download-token", credential)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}
