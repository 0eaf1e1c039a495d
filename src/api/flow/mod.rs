//! 远程 flow 触发端点的 HTTP 调用（上传、列举、删除、下载）。

mod client;
mod delete;
mod download;
mod list;
mod models;
mod upload;

pub use delete::delete_file;
pub use download::{download_file, save_downloaded_file};
pub use list::list_files;
pub use models::{
    DeleteResult, DownloadedFile, ExistingRemoteFile, UploadReceipt, UploadRequest, UploadResult,
};
pub use upload::upload_file;

use crate::config::FlowEndpoints;
use crate::error::{TransferError, TransferResult};
use async_trait::async_trait;

/// 远程存储后端的抽象，编排器只依赖该接口，便于用假实现编写单测。
#[async_trait]
pub trait FlowBackend: Send + Sync {
    async fn upload(
        &self,
        endpoints: &FlowEndpoints,
        request: UploadRequest,
    ) -> TransferResult<UploadReceipt>;

    async fn list(&self, endpoints: &FlowEndpoints) -> TransferResult<Vec<ExistingRemoteFile>>;

    async fn delete(&self, endpoints: &FlowEndpoints, file_name: &str)
        -> TransferResult<DeleteResult>;

    async fn download(
        &self,
        endpoints: &FlowEndpoints,
        file_name: &str,
    ) -> TransferResult<DownloadedFile>;
}

/// 基于 reqwest 的默认实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpFlowClient;

#[async_trait]
impl FlowBackend for HttpFlowClient {
    async fn upload(
        &self,
        endpoints: &FlowEndpoints,
        request: UploadRequest,
    ) -> TransferResult<UploadReceipt> {
        upload_file(endpoints, request).await
    }

    async fn list(&self, endpoints: &FlowEndpoints) -> TransferResult<Vec<ExistingRemoteFile>> {
        list_files(endpoints).await
    }

    async fn delete(
        &self,
        endpoints: &FlowEndpoints,
        file_name: &str,
    ) -> TransferResult<DeleteResult> {
        delete_file(endpoints, file_name).await
    }

    async fn download(
        &self,
        endpoints: &FlowEndpoints,
        file_name: &str,
    ) -> TransferResult<DownloadedFile> {
        download_file(endpoints, file_name).await
    }
}

/// 未配置下载端点时，查看文件回退为打开已知直链。
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> TransferResult<()>;
}

/// 交给系统浏览器打开。
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemBrowser;

impl UrlOpener for SystemBrowser {
    fn open(&self, url: &str) -> TransferResult<()> {
        webbrowser::open(url)
            .map_err(|e| TransferError::RemoteCallFailed(format!("failed to open browser: {e}")))
    }
}
