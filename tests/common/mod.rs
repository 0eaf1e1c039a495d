//! 本地 axum 服务，模拟四个 flow 端点。
#![allow(dead_code)]

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use flowattach::config::FlowEndpoints;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const HELLO_BASE64: &str = "aGVsbG8gd29ybGQ=";

#[derive(Clone, Default)]
pub struct FlowState {
    pub stored: Arc<Mutex<Vec<(String, u64)>>>,
    pub requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl FlowState {
    fn record(&self, route: &str, body: &Value) {
        self.requests
            .lock()
            .unwrap()
            .push((route.to_string(), body.clone()));
    }

    pub fn requests_to(&self, route: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == route)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn store(&self, name: &str, size: u64) {
        self.stored.lock().unwrap().push((name.to_string(), size));
    }
}

pub struct FlowServer {
    pub addr: SocketAddr,
    pub state: FlowState,
}

impl FlowServer {
    pub async fn start() -> Self {
        let state = FlowState::default();
        let app = Router::new()
            .route("/upload", post(upload))
            .route("/upload-error", post(upload_error))
            .route("/list", post(list))
            .route("/list-error", post(list_error))
            .route("/list-broken", post(list_broken))
            .route("/delete", post(delete))
            .route("/download", post(download))
            .route("/download-flat", post(download_flat))
            .route("/download-odd", post(download_odd))
            .route("/slow", post(slow))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn endpoints(&self) -> FlowEndpoints {
        FlowEndpoints {
            upload: Url::parse(&self.url("/upload")).unwrap(),
            list: Url::parse(&self.url("/list")).unwrap(),
            delete: Url::parse(&self.url("/delete")).unwrap(),
            download: Some(Url::parse(&self.url("/download")).unwrap()),
            container_path: "attachments".to_string(),
            folder_path: Some("cases/42".to_string()),
            timeout: Duration::from_secs(5),
        }
    }
}

async fn upload(State(state): State<FlowState>, Json(body): Json<Value>) -> Json<Value> {
    state.record("upload", &body);
    let name = body["fileName"].as_str().unwrap_or_default().to_string();
    if name == "reject.pdf" {
        return Json(json!({ "success": false, "error": "virus detected" }));
    }
    let size = body["fileSize"].as_u64().unwrap_or_default();
    state.store(&name, size);
    Json(json!({
        "success": true,
        "fileName": name,
        "url": format!("https://store.example.com/{name}"),
        "flowRunId": "run-1",
    }))
}

async fn upload_error(Json(_): Json<Value>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": true, "fileName": "a.pdf" })),
    )
}

async fn list(State(state): State<FlowState>, Json(body): Json<Value>) -> Json<Value> {
    state.record("list", &body);
    let files: Vec<Value> = state
        .stored
        .lock()
        .unwrap()
        .iter()
        .map(|(name, size)| {
            json!({
                "name": name,
                "size": size,
                "url": format!("https://store.example.com/{name}"),
                "lastModified": "2026-01-01T00:00:00Z",
                "metadata": { "owner": "tests" },
            })
        })
        .collect();
    Json(json!({ "success": true, "files": files }))
}

async fn list_error(Json(_): Json<Value>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "files": [] })),
    )
}

async fn list_broken(Json(_): Json<Value>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": { "message": "container not found" } })),
    )
}

async fn delete(State(state): State<FlowState>, Json(body): Json<Value>) -> Json<Value> {
    state.record("delete", &body);
    let name = body["fileName"].as_str().unwrap_or_default().to_string();
    let mut stored = state.stored.lock().unwrap();
    let before = stored.len();
    stored.retain(|(n, _)| n != &name);
    if stored.len() == before {
        return Json(json!({ "success": false, "error": "file not found" }));
    }
    Json(json!({ "success": true, "fileName": name, "flowRunId": "run-2" }))
}

async fn download(State(state): State<FlowState>, Json(body): Json<Value>) -> Json<Value> {
    state.record("download", &body);
    Json(json!({
        "statusCode": 200,
        "body": {
            "fileContent": HELLO_BASE64,
            "contentType": "text/plain",
            "fileName": body["fileName"],
        }
    }))
}

async fn download_flat(Json(_): Json<Value>) -> Json<Value> {
    Json(json!({ "fileContent": HELLO_BASE64 }))
}

async fn download_odd(Json(_): Json<Value>) -> Json<Value> {
    Json(json!({ "status": 200, "body": { "content": "abc" } }))
}

async fn slow(Json(_): Json<Value>) -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(10)).await;
    Json(json!({ "success": true, "files": [] }))
}
