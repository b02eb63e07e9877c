//! Transport trait and implementations
//!
//! The byte-moving seam between the upload engine and durable storage.
//! Implementations report progress as `(bytes_sent, total_bytes)` pairs and
//! honor cooperative cancellation between chunks.

use crate::upload::{TransferItem, TransferSource};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Transfer cancelled")]
    Cancelled,
    #[error("Transfer failed: {0}")]
    Failed(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(e.to_string())
    }
}

/// Progress callback type: (bytes_sent, total_bytes)
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

/// Moves one item's bytes to durable storage.
///
/// `send` resolves the item's source (local path or remote download URL),
/// streams it to the destination, and invokes `on_progress` as bytes land.
/// Cancellation is checked between chunks; an already-dispatched chunk may
/// still complete.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        item: &TransferItem,
        on_progress: ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError>;
}

const WRITE_BATCH_SIZE: usize = 1_048_576; // 1MB batches for progress reporting

/// Transport that lands files in a local storage directory.
///
/// Local sources are copied; remote sources are downloaded with a streaming
/// GET. Files are stored under the item's identifier, which is unique per
/// batch.
pub struct LocalDiskTransport {
    dest_dir: PathBuf,
    client: reqwest::Client,
}

impl LocalDiskTransport {
    pub fn new(dest_dir: PathBuf) -> Self {
        Self {
            dest_dir,
            client: reqwest::Client::new(),
        }
    }

    fn dest_path(&self, item: &TransferItem) -> PathBuf {
        self.dest_dir.join(&item.identifier)
    }

    async fn send_local(
        &self,
        item: &TransferItem,
        source: &PathBuf,
        on_progress: ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let total_bytes = tokio::fs::metadata(source).await?.len();
        on_progress(0, total_bytes);

        let dest = self.dest_path(item);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut reader = tokio::fs::File::open(source).await?;
        let file = tokio::fs::File::create(&dest).await?;
        let mut writer = tokio::io::BufWriter::new(file);
        let mut buf = vec![0u8; WRITE_BATCH_SIZE];
        let mut bytes_written = 0u64;

        loop {
            if cancel.is_cancelled() {
                debug!("Cancelled while copying {:?}", source);
                return Err(TransportError::Cancelled);
            }
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            bytes_written += n as u64;
            on_progress(bytes_written, total_bytes);
        }
        writer.flush().await?;

        info!(
            "Stored '{}' ({} bytes) at {:?}",
            item.display_name, bytes_written, dest
        );
        Ok(())
    }

    async fn send_remote(
        &self,
        item: &TransferItem,
        download_url: &str,
        on_progress: ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let response = self.client.get(download_url).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::Failed(format!(
                "Download returned status {}",
                response.status()
            )));
        }
        let total_bytes = response
            .content_length()
            .or(item.size_bytes)
            .unwrap_or(0);
        on_progress(0, total_bytes);

        let dest = self.dest_path(item);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::create(&dest).await?;
        let mut writer = tokio::io::BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut bytes_written = 0u64;

        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                debug!("Cancelled while downloading '{}'", item.display_name);
                return Err(TransportError::Cancelled);
            }
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            bytes_written += chunk.len() as u64;
            on_progress(bytes_written, total_bytes);
        }
        writer.flush().await?;

        info!(
            "Downloaded '{}' ({} bytes) to {:?}",
            item.display_name, bytes_written, dest
        );
        Ok(())
    }
}

#[async_trait]
impl Transport for LocalDiskTransport {
    async fn send(
        &self,
        item: &TransferItem,
        on_progress: ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        match &item.source {
            TransferSource::Local { path } => {
                self.send_local(item, path, on_progress, cancel).await
            }
            TransferSource::Remote { download_url, .. } => {
                self.send_remote(item, download_url, on_progress, cancel)
                    .await
            }
        }
    }
}

/// Transport that uploads local files with a streaming HTTP PUT,
/// presigned-URL style: `{endpoint_base}/{identifier}`.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint_base: String,
}

impl HttpTransport {
    pub fn new(endpoint_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint_base: endpoint_base.into(),
        }
    }

    fn upload_url(&self, item: &TransferItem) -> String {
        format!(
            "{}/{}",
            self.endpoint_base.trim_end_matches('/'),
            item.identifier
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        item: &TransferItem,
        on_progress: ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let path = match &item.source {
            TransferSource::Local { path } => path.clone(),
            TransferSource::Remote { .. } => {
                return Err(TransportError::Failed(
                    "Remote sources must be staged to disk before an HTTP upload".to_string(),
                ));
            }
        };

        let total_bytes = tokio::fs::metadata(&path).await?.len();
        on_progress(0, total_bytes);

        let file = tokio::fs::File::open(&path).await?;
        let token = cancel.clone();
        let mut bytes_sent = 0u64;
        let counting_stream = ReaderStream::new(file).map(move |chunk| {
            if token.is_cancelled() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "transfer cancelled",
                ));
            }
            let chunk = chunk?;
            bytes_sent += chunk.len() as u64;
            on_progress(bytes_sent, total_bytes);
            Ok(chunk)
        });

        let url = self.upload_url(item);
        debug!("PUT {} ({} bytes)", url, total_bytes);
        let response = self
            .client
            .put(&url)
            .header("Content-Type", item.content_type.as_str())
            .header("Content-Length", total_bytes)
            .body(reqwest::Body::wrap_stream(counting_stream))
            .send()
            .await;

        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let response = response?;
        if !response.status().is_success() {
            return Err(TransportError::Http(format!(
                "Upload returned status {}",
                response.status()
            )));
        }

        info!("Uploaded '{}' to {}", item.display_name, url);
        Ok(())
    }
}
