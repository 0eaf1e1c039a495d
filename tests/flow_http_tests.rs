mod common;

use common::FlowServer;
use flowattach::api::flow::{
    delete_file, download_file, list_files, upload_file, UploadRequest,
};
use flowattach::error::TransferError;
use std::time::Duration;
use url::Url;

fn request(name: &str, content: &[u8]) -> UploadRequest {
    UploadRequest {
        file_name: name.to_string(),
        content: content.to_vec(),
        content_type: "application/pdf".to_string(),
    }
}

#[tokio::test]
async fn upload_posts_base64_content_and_returns_receipt() {
    let server = FlowServer::start().await;
    let receipt = upload_file(&server.endpoints(), request("a.pdf", b"hello"))
        .await
        .unwrap();

    assert_eq!(receipt.file_name, "a.pdf");
    assert_eq!(receipt.remote_name.as_deref(), Some("a.pdf"));
    assert_eq!(
        receipt.url.as_deref(),
        Some("https://store.example.com/a.pdf")
    );
    assert_eq!(receipt.flow_run_id.as_deref(), Some("run-1"));

    let sent = &server.state.requests_to("upload")[0];
    assert_eq!(sent["fileContent"], "aGVsbG8=");
    assert_eq!(sent["containerPath"], "attachments");
    assert_eq!(sent["folderName"], "cases/42");
    assert_eq!(sent["fileSize"], 5);
    assert_eq!(sent["contentType"], "application/pdf");
}

#[tokio::test]
async fn upload_reported_failure_surfaces_flow_error() {
    let server = FlowServer::start().await;
    let err = upload_file(&server.endpoints(), request("reject.pdf", b"x"))
        .await
        .unwrap_err();
    assert_eq!(err, TransferError::RemoteCallFailed("virus detected".into()));
}

#[tokio::test]
async fn upload_with_server_error_fails_even_if_body_claims_success() {
    let server = FlowServer::start().await;
    let mut endpoints = server.endpoints();
    endpoints.upload = Url::parse(&server.url("/upload-error")).unwrap();

    let err = upload_file(&endpoints, request("a.pdf", b"x"))
        .await
        .unwrap_err();
    assert!(
        matches!(&err, TransferError::RemoteCallFailed(message) if message.contains("500")),
        "{err:?}"
    );
}

#[tokio::test]
async fn list_maps_entries_and_ignores_metadata() {
    let server = FlowServer::start().await;
    server.state.store("a.pdf", 10);
    server.state.store("b.png", 20);

    let files = list_files(&server.endpoints()).await.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[1].name, "b.png");
    assert_eq!(files[1].size, 20);
    assert_eq!(files[0].last_modified.as_deref(), Some("2026-01-01T00:00:00Z"));

    let sent = &server.state.requests_to("list")[0];
    assert_eq!(sent["containerPath"], "attachments");
    assert_eq!(sent["folderName"], "cases/42");
}

#[tokio::test]
async fn list_with_server_error_but_files_array_is_success() {
    let server = FlowServer::start().await;
    let mut endpoints = server.endpoints();
    endpoints.list = Url::parse(&server.url("/list-error")).unwrap();

    let files = list_files(&endpoints).await.unwrap();
    assert!(files.is_empty());
}

#[tokio::test]
async fn list_without_files_array_fails_with_reported_message() {
    let server = FlowServer::start().await;
    let mut endpoints = server.endpoints();
    endpoints.list = Url::parse(&server.url("/list-broken")).unwrap();

    let err = list_files(&endpoints).await.unwrap_err();
    assert_eq!(
        err,
        TransferError::RemoteCallFailed("container not found".into())
    );
}

#[tokio::test]
async fn delete_only_counts_explicit_success() {
    let server = FlowServer::start().await;
    server.state.store("a.pdf", 1);

    let result = delete_file(&server.endpoints(), "a.pdf").await.unwrap();
    assert_eq!(result.file_name, "a.pdf");
    assert_eq!(result.flow_run_id.as_deref(), Some("run-2"));

    let err = delete_file(&server.endpoints(), "a.pdf").await.unwrap_err();
    assert_eq!(err, TransferError::RemoteCallFailed("file not found".into()));
}

#[tokio::test]
async fn download_reads_payload_nested_under_body() {
    let server = FlowServer::start().await;
    let file = download_file(&server.endpoints(), "notes.txt").await.unwrap();
    assert_eq!(file.bytes, b"hello world");
    assert_eq!(file.content_type, "text/plain");
    assert_eq!(file.file_name, "notes.txt");

    let sent = &server.state.requests_to("download")[0];
    assert_eq!(sent["storageAccountName"], "attachments");
    assert_eq!(sent["filePath"], "cases/42/notes.txt");
    assert_eq!(sent["fileName"], "notes.txt");
}

#[tokio::test]
async fn download_reads_top_level_payload_with_fallbacks() {
    let server = FlowServer::start().await;
    let mut endpoints = server.endpoints();
    endpoints.download = Some(Url::parse(&server.url("/download-flat")).unwrap());

    let file = download_file(&endpoints, "report.pdf").await.unwrap();
    assert_eq!(file.bytes, b"hello world");
    assert_eq!(file.file_name, "report.pdf");
    assert_eq!(file.content_type, "application/pdf");
}

#[tokio::test]
async fn download_with_unknown_shape_reports_keys() {
    let server = FlowServer::start().await;
    let mut endpoints = server.endpoints();
    endpoints.download = Some(Url::parse(&server.url("/download-odd")).unwrap());

    match download_file(&endpoints, "x.pdf").await {
        Err(TransferError::UnexpectedResponseShape(message)) => {
            assert!(message.contains("top-level keys [body, status]"), "{message}");
            assert!(message.contains("body keys [content]"), "{message}");
        }
        other => panic!("expected shape error, got {other:?}"),
    }
}

#[tokio::test]
async fn download_without_endpoint_is_configuration_missing() {
    let server = FlowServer::start().await;
    let mut endpoints = server.endpoints();
    endpoints.download = None;
    assert!(matches!(
        download_file(&endpoints, "x.pdf").await,
        Err(TransferError::ConfigurationMissing(_))
    ));
}

#[tokio::test]
async fn slow_flow_is_reported_as_timeout() {
    let server = FlowServer::start().await;
    let mut endpoints = server.endpoints();
    endpoints.list = Url::parse(&server.url("/slow")).unwrap();
    endpoints.timeout = Duration::from_secs(1);

    let err = list_files(&endpoints).await.unwrap_err();
    assert_eq!(err, TransferError::RemoteCallTimedOut(1));
}

#[tokio::test]
async fn unreachable_flow_is_a_plain_failure() {
    let mut endpoints = FlowServer::start().await.endpoints();
    endpoints.list = Url::parse("http://127.0.0.1:9/list").unwrap();
    assert!(matches!(
        list_files(&endpoints).await,
        Err(TransferError::RemoteCallFailed(_))
    ));
}
