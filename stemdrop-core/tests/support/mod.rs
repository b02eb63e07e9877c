#![allow(dead_code)]
//! Shared helpers for upload integration tests: scripted transport and
//! resolver doubles, plus fixture files with valid headers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use stemdrop_core::config::Config;
use stemdrop_core::link_import::{LinkImportError, LinkResolver, RemoteFile};
use stemdrop_core::transport::{ProgressCallback, Transport, TransportError};
use stemdrop_core::upload::{TransferEvent, TransferItem};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub fn tracing_init() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_line_number(true)
        .with_target(false)
        .with_file(true)
        .try_init();
}

/// Test config with fast retries so failure paths don't slow the suite.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.max_retry_attempts = 1;
    config.retry_base_delay_ms = 1;
    config
}

/// Scripted behavior for one item in the mock transport, keyed by display name.
pub enum MockBehavior {
    /// Report progress in halves, then succeed
    Succeed,
    /// Fail every attempt with this message
    Fail(String),
    /// Fail the first `n` attempts, then succeed
    FailTimes(u32, String),
    /// Park until the batch is cancelled, then report cancellation
    BlockUntilCancelled,
}

/// Transport double that follows a script per display name and records
/// which items it was asked to send.
pub struct MockTransport {
    behaviors: Mutex<HashMap<String, MockBehavior>>,
    sent: Mutex<Vec<String>>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_behavior(self, display_name: &str, behavior: MockBehavior) -> Self {
        self.behaviors
            .lock()
            .unwrap()
            .insert(display_name.to_string(), behavior);
        self
    }

    pub fn sent_items(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, display_name: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(display_name)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        item: &TransferItem,
        on_progress: ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(item.display_name.clone());
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(item.display_name.clone())
            .or_insert(0) += 1;

        let total = item.size_bytes.unwrap_or(100);

        enum Action {
            Succeed,
            Fail(String),
            Block,
        }
        // Resolve the scripted action before awaiting anything
        let action = {
            let mut behaviors = self.behaviors.lock().unwrap();
            match behaviors.get_mut(&item.display_name) {
                None | Some(MockBehavior::Succeed) => Action::Succeed,
                Some(MockBehavior::Fail(message)) => Action::Fail(message.clone()),
                Some(MockBehavior::FailTimes(remaining, message)) => {
                    if *remaining > 0 {
                        *remaining -= 1;
                        Action::Fail(message.clone())
                    } else {
                        Action::Succeed
                    }
                }
                Some(MockBehavior::BlockUntilCancelled) => Action::Block,
            }
        };

        match action {
            Action::Succeed => {
                on_progress(0, total);
                on_progress(total / 2, total);
                on_progress(total, total);
                Ok(())
            }
            Action::Fail(message) => Err(TransportError::Failed(message)),
            Action::Block => {
                on_progress(total / 4, total);
                cancel.cancelled().await;
                Err(TransportError::Cancelled)
            }
        }
    }
}

/// Resolver double returning a canned manifest and counting calls.
pub struct MockResolver {
    manifest: Result<Vec<RemoteFile>, String>,
    calls: Mutex<u32>,
}

impl MockResolver {
    pub fn with_manifest(files: Vec<RemoteFile>) -> Self {
        Self {
            manifest: Ok(files),
            calls: Mutex::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            manifest: Err(message.to_string()),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LinkResolver for MockResolver {
    async fn resolve(&self, _url: &str) -> Result<Vec<RemoteFile>, LinkImportError> {
        *self.calls.lock().unwrap() += 1;
        match &self.manifest {
            Ok(files) => Ok(files.clone()),
            Err(message) => Err(LinkImportError::Resolution(message.clone())),
        }
    }
}

pub fn remote_file(filename: &str, size: Option<u64>) -> RemoteFile {
    RemoteFile {
        filename: filename.to_string(),
        size_bytes: size,
        mime_type: None,
        download_url: format!(
            "https://wetransfer.com/api/v4/transfers/t1/download/{}",
            filename
        ),
    }
}

/// Write an MP3-looking fixture (ID3 header plus padding) and return its path.
pub async fn write_audio_fixture(dir: &Path, name: &str, size: usize) -> PathBuf {
    let mut data = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
    data.resize(size.max(data.len()), 0xAA);
    let path = dir.join(name);
    tokio::fs::write(&path, &data).await.unwrap();
    path
}

/// Drain a subscription until BatchFinished or BatchCancelled arrives.
pub async fn collect_until_terminal(
    rx: &mut mpsc::UnboundedReceiver<TransferEvent>,
) -> Vec<TransferEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for transfer events")
            .expect("event channel closed before terminal event");
        let terminal = matches!(
            event,
            TransferEvent::BatchFinished { .. } | TransferEvent::BatchCancelled { .. }
        );
        events.push(event);
        if terminal {
            return events;
        }
    }
}
