use crate::config::{Config, UploadSettings};
use crate::link_import::LinkResolver;
use crate::transport::{ProgressCallback, Transport, TransportError};
use crate::upload::handle::UploadServiceHandle;
use crate::upload::tracker::{percent_from_bytes, TransferBatch};
use crate::upload::types::{ItemStatus, TransferEvent, TransferItem};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Commands accepted by the upload worker
pub(crate) enum UploadCommand {
    Transfer { batch: TransferBatch },
}

/// Upload service that drives transfer batches through the transport.
///
/// Batches are processed one at a time off a queue, and items within a batch
/// strictly sequentially: one active item keeps the progress reporting
/// unambiguous for the surfaces rendering it.
pub struct UploadService {
    config: Config,
    commands_rx: mpsc::UnboundedReceiver<UploadCommand>,
    events_tx: mpsc::UnboundedSender<TransferEvent>,
    transport: Arc<dyn Transport>,
    cancel_tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl UploadService {
    /// Start the upload service worker.
    ///
    /// Spawns one worker task that transfers queued batches sequentially.
    /// Returns a handle that can be cloned and used throughout the app to
    /// select files, submit batches, cancel them, and subscribe to events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: Config,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn LinkResolver>,
    ) -> UploadServiceHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel_tokens: Arc<Mutex<HashMap<String, CancellationToken>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let service = UploadService {
            config: config.clone(),
            commands_rx,
            events_tx,
            transport,
            cancel_tokens: cancel_tokens.clone(),
        };
        tokio::spawn(service.run());

        UploadServiceHandle::new(commands_tx, events_rx, resolver, config, cancel_tokens)
    }

    async fn run(mut self) {
        info!("Upload worker started");
        loop {
            match self.commands_rx.recv().await {
                Some(UploadCommand::Transfer { batch }) => {
                    self.process_batch(batch).await;
                }
                None => {
                    info!("Upload worker receive channel closed");
                    break;
                }
            }
        }
    }

    async fn process_batch(&self, mut batch: TransferBatch) {
        let batch_id = batch.id().to_string();
        let token = self
            .cancel_tokens
            .lock()
            .unwrap()
            .get(&batch_id)
            .cloned()
            .unwrap_or_default();

        if let Err(e) = batch.start_transfer() {
            error!("Batch {} could not start: {}", batch_id, e);
            batch.mark_failed(e.to_string());
            let _ = self.events_tx.send(TransferEvent::BatchFinished {
                batch_id: batch_id.clone(),
                phase: batch.phase(),
                errors: batch.errors().clone(),
            });
            self.forget_token(&batch_id);
            return;
        }

        let total_items = batch.items().len();
        info!(
            "Starting {:?} for batch {} ({} files)",
            batch.phase(),
            batch_id,
            total_items
        );
        let settings = self.config.settings_for(batch.context());

        while let Some(index) = batch.next_pending() {
            // Cooperative cancellation: checked before each item starts
            if token.is_cancelled() {
                batch.cancel();
                info!("Batch {} cancelled before item {}", batch_id, index + 1);
                let _ = self.events_tx.send(TransferEvent::BatchCancelled {
                    batch_id: batch_id.clone(),
                });
                self.forget_token(&batch_id);
                return;
            }

            let Some(item) = batch.begin_item(index) else {
                break;
            };

            match self.transfer_item(&mut batch, &item, &settings, &token).await {
                Ok(()) => {
                    batch.report_item_success(&item.identifier);
                    let _ = self.events_tx.send(TransferEvent::ProgressChanged {
                        batch_id: batch_id.clone(),
                        identifier: item.identifier.clone(),
                        percent: 100,
                    });
                    let _ = self.events_tx.send(TransferEvent::ItemCompleted {
                        batch_id: batch_id.clone(),
                        identifier: item.identifier.clone(),
                        status: ItemStatus::Done,
                        error: None,
                        replaces_file_id: item.replaces_file_id.clone(),
                    });
                    info!(
                        "Transferred file {}/{}: {}",
                        index + 1,
                        total_items,
                        item.display_name
                    );
                }
                Err(TransportError::Cancelled) => {
                    batch.cancel();
                    info!("Batch {} cancelled during '{}'", batch_id, item.display_name);
                    let _ = self.events_tx.send(TransferEvent::BatchCancelled {
                        batch_id: batch_id.clone(),
                    });
                    self.forget_token(&batch_id);
                    return;
                }
                Err(e) => {
                    // Partial-failure semantics: record and keep going
                    let message = e.to_string();
                    warn!(
                        "File '{}' failed, continuing batch: {}",
                        item.display_name, message
                    );
                    batch.report_item_error(&item.identifier, message.clone());
                    let _ = self.events_tx.send(TransferEvent::ItemCompleted {
                        batch_id: batch_id.clone(),
                        identifier: item.identifier.clone(),
                        status: ItemStatus::Errored,
                        error: Some(message),
                        replaces_file_id: item.replaces_file_id.clone(),
                    });
                }
            }
        }

        batch.finalize();
        info!(
            "Batch {} finished: {:?}, {} errors",
            batch_id,
            batch.phase(),
            batch.errors().len()
        );
        let _ = self.events_tx.send(TransferEvent::BatchFinished {
            batch_id: batch_id.clone(),
            phase: batch.phase(),
            errors: batch.errors().clone(),
        });
        self.forget_token(&batch_id);
    }

    /// Transfer one item with retries. Cancellation is never retried.
    async fn transfer_item(
        &self,
        batch: &mut TransferBatch,
        item: &TransferItem,
        settings: &UploadSettings,
        token: &CancellationToken,
    ) -> Result<(), TransportError> {
        let max_attempts = settings.max_retry_attempts;
        let base_delay = Duration::from_millis(settings.retry_base_delay_ms);
        let mut attempt = 1;
        loop {
            match self.transfer_attempt(batch, item, token).await {
                Ok(()) => return Ok(()),
                Err(TransportError::Cancelled) => return Err(TransportError::Cancelled),
                Err(e) if attempt < max_attempts => {
                    warn!(
                        "Transfer of '{}' failed (attempt {}/{}): {}",
                        item.display_name, attempt, max_attempts, e
                    );
                    tokio::time::sleep(base_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        "Transfer of '{}' failed after {} attempts",
                        item.display_name, max_attempts
                    );
                    return Err(e);
                }
            }
        }
    }

    /// One transport attempt, forwarding progress into the batch as it arrives.
    async fn transfer_attempt(
        &self,
        batch: &mut TransferBatch,
        item: &TransferItem,
        token: &CancellationToken,
    ) -> Result<(), TransportError> {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<(u64, u64)>();
        let on_progress: ProgressCallback = Box::new(move |sent, total| {
            let _ = progress_tx.send((sent, total));
        });

        let send_fut = self.transport.send(item, on_progress, token);
        tokio::pin!(send_fut);
        loop {
            tokio::select! {
                result = &mut send_fut => {
                    while let Ok((sent, total)) = progress_rx.try_recv() {
                        self.forward_progress(batch, item, sent, total);
                    }
                    return result;
                }
                Some((sent, total)) = progress_rx.recv() => {
                    self.forward_progress(batch, item, sent, total);
                }
            }
        }
    }

    fn forward_progress(&self, batch: &mut TransferBatch, item: &TransferItem, sent: u64, total: u64) {
        // Hold 100 until the transport confirms success; the batch marks the
        // item Done at 100.
        let percent = percent_from_bytes(sent, total).min(99);
        if batch.report_progress(&item.identifier, percent) {
            let _ = self.events_tx.send(TransferEvent::ProgressChanged {
                batch_id: batch.id().to_string(),
                identifier: item.identifier.clone(),
                percent,
            });
        }
    }

    fn forget_token(&self, batch_id: &str) {
        self.cancel_tokens.lock().unwrap().remove(batch_id);
    }
}
