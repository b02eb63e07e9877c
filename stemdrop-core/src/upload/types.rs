use crate::content_type::ContentType;
use crate::link_import::LinkProvider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Lifecycle phase of a transfer batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferPhase {
    Idle,
    Selecting,
    /// Local files being sent to storage
    Uploading,
    /// Remote-link files being pulled in
    Processing,
    Succeeded,
    /// Batch-level fault before items completed (not per-item errors)
    Failed,
    Cancelled,
}

impl TransferPhase {
    /// Whether items are being transferred in this phase.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Uploading | Self::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Status of a single item within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    Pending,
    InProgress,
    Done,
    Errored,
}

/// Where an item's bytes come from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransferSource {
    Local { path: PathBuf },
    Remote { download_url: String, provider: LinkProvider },
}

/// One file within a transfer batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferItem {
    /// Unique within the batch
    pub identifier: String,
    pub display_name: String,
    /// Unknown for remote imports until the download starts
    pub size_bytes: Option<u64>,
    pub content_type: ContentType,
    pub progress_percent: u8,
    pub status: ItemStatus,
    pub source: TransferSource,
    /// For version-replacement uploads: the file this item supersedes
    pub replaces_file_id: Option<String>,
}

/// A file handle from the selection provider
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub size: u64,
    /// MIME type as claimed by the provider; verified against content
    pub mime_type: String,
    pub path: PathBuf,
    /// Set when this upload replaces an existing file version
    pub replaces_file_id: Option<String>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            path,
            replaces_file_id: None,
        }
    }

    pub fn replacing(mut self, file_id: impl Into<String>) -> Self {
        self.replaces_file_id = Some(file_id.into());
        self
    }
}

/// Events emitted to host surfaces.
///
/// This is the only cross-boundary signaling contract: surfaces subscribe
/// through the service handle and re-render from these, never by reaching
/// into the engine's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransferEvent {
    ProgressChanged {
        batch_id: String,
        identifier: String,
        percent: u8,
    },
    ItemCompleted {
        batch_id: String,
        identifier: String,
        status: ItemStatus,
        error: Option<String>,
        replaces_file_id: Option<String>,
    },
    BatchFinished {
        batch_id: String,
        phase: TransferPhase,
        errors: HashMap<String, String>,
    },
    BatchCancelled {
        batch_id: String,
    },
}

impl TransferEvent {
    pub fn batch_id(&self) -> &str {
        match self {
            Self::ProgressChanged { batch_id, .. }
            | Self::ItemCompleted { batch_id, .. }
            | Self::BatchFinished { batch_id, .. }
            | Self::BatchCancelled { batch_id } => batch_id,
        }
    }
}
