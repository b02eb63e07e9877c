use crate::config::UploadContext;
use crate::link_import::{LinkProvider, RemoteFile};
use crate::upload::types::{
    ItemStatus, SelectedFile, TransferItem, TransferPhase, TransferSource,
};
use crate::upload::validation::ValidationRules;
use crate::upload::UploadError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, trace};
use uuid::Uuid;

/// Percentage of `sent` out of `total` bytes, saturating at 100.
pub(crate) fn percent_from_bytes(sent: u64, total: u64) -> u8 {
    if total == 0 {
        100
    } else {
        (((sent as f64 / total as f64) * 100.0).min(100.0)) as u8
    }
}

/// Transient state of one upload/import session.
///
/// Created fresh when a surface opens its picker or modal, discarded on
/// completion, cancellation, or reset. Progress is monotone per item and
/// exactly one item is in flight at a time.
#[derive(Debug, Clone)]
pub struct TransferBatch {
    id: String,
    context: UploadContext,
    phase: TransferPhase,
    items: Vec<TransferItem>,
    current_index: Option<usize>,
    errors: HashMap<String, String>,
    created_at: DateTime<Utc>,
}

impl TransferBatch {
    pub fn new(context: UploadContext) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            context,
            phase: TransferPhase::Idle,
            items: Vec::new(),
            current_index: None,
            errors: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> UploadContext {
        self.context
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    pub fn items(&self) -> &[TransferItem] {
        &self.items
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn errors(&self) -> &HashMap<String, String> {
        &self.errors
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn item(&self, identifier: &str) -> Option<&TransferItem> {
        self.items.iter().find(|i| i.identifier == identifier)
    }

    /// Select local files for upload.
    ///
    /// All files are validated before any item is added: one bad file rejects
    /// the selection and leaves `items` untouched, so the user can correct
    /// and retry. The batch stays in Selecting either way.
    pub fn select_files(
        &mut self,
        files: &[SelectedFile],
        rules: &ValidationRules,
    ) -> Result<(), UploadError> {
        if self.phase != TransferPhase::Idle && self.phase != TransferPhase::Selecting {
            return Err(UploadError::Validation(format!(
                "Cannot select files in phase {:?}",
                self.phase
            )));
        }
        self.phase = TransferPhase::Selecting;

        let mut validated = Vec::with_capacity(files.len());
        for file in files {
            match rules.check(file) {
                Ok(content_type) => validated.push((file, content_type)),
                Err(message) => {
                    debug!("Rejected '{}': {}", file.name, message);
                    return Err(UploadError::Validation(message));
                }
            }
        }

        for (file, content_type) in validated {
            let extension = Path::new(&file.name)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("bin")
                .to_lowercase();
            self.items.push(TransferItem {
                identifier: format!("{}.{}", Uuid::new_v4(), extension),
                display_name: file.name.clone(),
                size_bytes: Some(file.size),
                content_type,
                progress_percent: 0,
                status: ItemStatus::Pending,
                source: TransferSource::Local {
                    path: file.path.clone(),
                },
                replaces_file_id: file.replaces_file_id.clone(),
            });
        }

        trace!("Selected {} local files for batch {}", self.items.len(), self.id);
        Ok(())
    }

    /// Select a resolved remote manifest for import.
    ///
    /// Same all-or-nothing semantics as `select_files`.
    pub fn select_remote(
        &mut self,
        provider: LinkProvider,
        manifest: &[RemoteFile],
        rules: &ValidationRules,
    ) -> Result<(), UploadError> {
        if self.phase != TransferPhase::Idle && self.phase != TransferPhase::Selecting {
            return Err(UploadError::Validation(format!(
                "Cannot select files in phase {:?}",
                self.phase
            )));
        }
        self.phase = TransferPhase::Selecting;

        let mut validated = Vec::with_capacity(manifest.len());
        for file in manifest {
            match rules.check_remote(file) {
                Ok(content_type) => validated.push((file, content_type)),
                Err(message) => {
                    debug!("Rejected remote '{}': {}", file.filename, message);
                    return Err(UploadError::Validation(message));
                }
            }
        }

        for (index, (file, content_type)) in validated.into_iter().enumerate() {
            self.items.push(TransferItem {
                identifier: format!("{}-{}", index, file.filename),
                display_name: file.filename.clone(),
                size_bytes: file.size_bytes,
                content_type,
                progress_percent: 0,
                status: ItemStatus::Pending,
                source: TransferSource::Remote {
                    download_url: file.download_url.clone(),
                    provider,
                },
                replaces_file_id: None,
            });
        }

        trace!(
            "Selected {} remote files from {} for batch {}",
            self.items.len(),
            provider,
            self.id
        );
        Ok(())
    }

    /// Move the batch into its active phase.
    ///
    /// Requires a non-empty selection; rejection leaves the phase unchanged.
    pub fn start_transfer(&mut self) -> Result<(), UploadError> {
        if self.phase != TransferPhase::Selecting {
            return Err(UploadError::Validation(format!(
                "Cannot start transfer in phase {:?}",
                self.phase
            )));
        }
        if self.items.is_empty() {
            return Err(UploadError::Validation("No files selected".to_string()));
        }
        let remote = self
            .items
            .iter()
            .any(|i| matches!(i.source, TransferSource::Remote { .. }));
        self.phase = if remote {
            TransferPhase::Processing
        } else {
            TransferPhase::Uploading
        };
        trace!("Batch {} entered {:?}", self.id, self.phase);
        Ok(())
    }

    /// Index of the next item awaiting transfer.
    pub fn next_pending(&self) -> Option<usize> {
        self.items.iter().position(|i| i.status == ItemStatus::Pending)
    }

    /// Mark an item in flight. Only one item may be in flight at a time.
    pub fn begin_item(&mut self, index: usize) -> Option<TransferItem> {
        if !self.phase.is_active() {
            return None;
        }
        if self.items.iter().any(|i| i.status == ItemStatus::InProgress) {
            return None;
        }
        let item = self.items.get_mut(index)?;
        if item.status != ItemStatus::Pending {
            return None;
        }
        item.status = ItemStatus::InProgress;
        self.current_index = Some(index);
        trace!("Batch {} item {} in progress", self.id, item.identifier);
        Some(item.clone())
    }

    /// Record progress for an item. Monotone and idempotent: percents are
    /// clamped to 100, lower or repeated values are ignored (defends against
    /// out-of-order delivery), and completed or errored items are left alone.
    /// At 100 the item transitions to Done.
    ///
    /// Returns whether the stored value changed.
    pub fn report_progress(&mut self, identifier: &str, percent: u8) -> bool {
        let Some(item) = self.items.iter_mut().find(|i| i.identifier == identifier) else {
            return false;
        };
        if item.status == ItemStatus::Done || item.status == ItemStatus::Errored {
            return false;
        }
        let percent = percent.min(100);
        if percent <= item.progress_percent {
            return false;
        }
        item.progress_percent = percent;
        if percent == 100 {
            item.status = ItemStatus::Done;
        }
        true
    }

    /// Mark an item successfully transferred.
    pub fn report_item_success(&mut self, identifier: &str) {
        if let Some(item) = self.items.iter_mut().find(|i| i.identifier == identifier) {
            if item.status == ItemStatus::Errored {
                return;
            }
            item.status = ItemStatus::Done;
            item.progress_percent = 100;
            trace!("Batch {} item {} done", self.id, identifier);
        }
    }

    /// Record a per-item failure. The batch continues with remaining items.
    pub fn report_item_error(&mut self, identifier: &str, message: impl Into<String>) {
        if let Some(item) = self.items.iter_mut().find(|i| i.identifier == identifier) {
            if item.status == ItemStatus::Done {
                return;
            }
            item.status = ItemStatus::Errored;
            let message = message.into();
            debug!("Batch {} item {} errored: {}", self.id, identifier, message);
            self.errors.insert(identifier.to_string(), message);
        }
    }

    /// Cancel the session. Valid while selecting or transferring; completed
    /// items keep their Done status.
    pub fn cancel(&mut self) {
        match self.phase {
            TransferPhase::Selecting | TransferPhase::Uploading | TransferPhase::Processing => {
                self.phase = TransferPhase::Cancelled;
                trace!("Batch {} cancelled", self.id);
            }
            _ => {}
        }
    }

    /// Complete the batch once every item has been attempted.
    ///
    /// Per-item errors do not demote the batch: it reports Succeeded and the
    /// errors map carries what failed.
    pub fn finalize(&mut self) {
        if self.phase.is_active() {
            self.phase = TransferPhase::Succeeded;
            self.current_index = None;
        }
    }

    /// Record a batch-level fault (distinct from per-item errors).
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("Batch {} failed: {}", self.id, message);
        self.errors.insert(self.id.clone(), message);
        self.phase = TransferPhase::Failed;
        self.current_index = None;
    }

    /// Clear back to Idle. Called on modal close or explicit Remove/Clear.
    pub fn reset(&mut self) {
        self.phase = TransferPhase::Idle;
        self.items.clear();
        self.current_index = None;
        self.errors.clear();
    }
}
