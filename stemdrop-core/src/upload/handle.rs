use crate::config::{Config, UploadContext};
use crate::link_import::{classify_source_url, validate_manifest, LinkResolver};
use crate::upload::service::UploadCommand;
use crate::upload::tracker::TransferBatch;
use crate::upload::types::{SelectedFile, TransferEvent, TransferPhase};
use crate::upload::validation::ValidationRules;
use crate::upload::UploadError;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

type SubscriptionId = u64;

/// Filter criteria for event subscriptions
#[derive(Debug, Clone)]
enum SubscriptionFilter {
    Batch { batch_id: String },
    Item { identifier: String },
    All,
}

impl SubscriptionFilter {
    fn matches(&self, event: &TransferEvent) -> bool {
        match self {
            SubscriptionFilter::Batch { batch_id } => event.batch_id() == batch_id,
            SubscriptionFilter::Item { identifier } => match event {
                TransferEvent::ProgressChanged { identifier: id, .. } => id == identifier,
                TransferEvent::ItemCompleted { identifier: id, .. } => id == identifier,
                TransferEvent::BatchFinished { .. } | TransferEvent::BatchCancelled { .. } => false,
            },
            SubscriptionFilter::All => true,
        }
    }
}

struct Subscription {
    filter: SubscriptionFilter,
    tx: mpsc::UnboundedSender<TransferEvent>,
}

/// Handle for subscribing to transfer events
///
/// Fans events out to filtered subscribers. Subscriptions are removed
/// automatically when the receiver is dropped.
#[derive(Clone)]
pub struct TransferEventsHandle {
    subscriptions: Arc<Mutex<HashMap<SubscriptionId, Subscription>>>,
    next_id: Arc<AtomicU64>,
}

impl TransferEventsHandle {
    /// Create a new events handle and spawn the dispatch task.
    pub(crate) fn new(mut events_rx: mpsc::UnboundedReceiver<TransferEvent>) -> Self {
        let subscriptions: Arc<Mutex<HashMap<SubscriptionId, Subscription>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let subscriptions_clone = subscriptions.clone();
        tokio::spawn(async move {
            loop {
                match events_rx.recv().await {
                    Some(event) => {
                        let mut subs = subscriptions_clone.lock().unwrap();
                        let mut to_remove = Vec::new();
                        for (id, subscription) in subs.iter() {
                            if subscription.filter.matches(&event)
                                && subscription.tx.send(event.clone()).is_err()
                            {
                                to_remove.push(*id);
                            }
                        }
                        for id in to_remove {
                            subs.remove(&id);
                        }
                    }
                    None => {
                        info!("Event channel closed, exiting");
                        break;
                    }
                }
            }
        });
        Self {
            subscriptions,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn subscribe(&self, filter: SubscriptionFilter) -> mpsc::UnboundedReceiver<TransferEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions
            .lock()
            .unwrap()
            .insert(id, Subscription { filter, tx });
        rx
    }
}

/// Handle for building, submitting, and observing transfer batches.
///
/// Cloneable; every surface gets the same service. Surfaces never share
/// state through the handle beyond the event stream: a surface passes its
/// batch in at submission and pulls outcomes from its subscription.
#[derive(Clone)]
pub struct UploadServiceHandle {
    commands_tx: mpsc::UnboundedSender<UploadCommand>,
    events: TransferEventsHandle,
    resolver: Arc<dyn LinkResolver>,
    config: Config,
    cancel_tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl UploadServiceHandle {
    pub(crate) fn new(
        commands_tx: mpsc::UnboundedSender<UploadCommand>,
        events_rx: mpsc::UnboundedReceiver<TransferEvent>,
        resolver: Arc<dyn LinkResolver>,
        config: Config,
        cancel_tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
    ) -> Self {
        Self {
            commands_tx,
            events: TransferEventsHandle::new(events_rx),
            resolver,
            config,
            cancel_tokens,
        }
    }

    /// Build a batch from locally selected files.
    ///
    /// Validation is all-or-nothing; on rejection the returned error names
    /// the offending file and no batch is created.
    pub fn select_local_files(
        &self,
        context: UploadContext,
        files: &[SelectedFile],
    ) -> Result<TransferBatch, UploadError> {
        let rules = ValidationRules::for_context(&self.config.settings_for(context));
        let mut batch = TransferBatch::new(context);
        batch.select_files(files, &rules)?;
        Ok(batch)
    }

    /// Resolve a shareable link and build an import batch from its manifest.
    ///
    /// The source domain is checked against the allow-list before any
    /// network call is made.
    pub async fn select_link(
        &self,
        context: UploadContext,
        url: &str,
    ) -> Result<TransferBatch, UploadError> {
        let provider = classify_source_url(url)?;
        let manifest = self.resolver.resolve(url).await?;

        let settings = self.config.settings_for(context);
        validate_manifest(
            &manifest,
            &self.config.link_import,
            settings.max_file_size_bytes(),
        )?;

        let rules = ValidationRules::for_context(&settings);
        let mut batch = TransferBatch::new(context);
        batch.select_remote(provider, &manifest, &rules)?;
        Ok(batch)
    }

    /// Queue a selected batch for transfer. Returns the batch id for
    /// cancellation and subscriptions.
    pub fn submit(&self, batch: TransferBatch) -> Result<String, UploadError> {
        if batch.phase() != TransferPhase::Selecting {
            return Err(UploadError::Validation(format!(
                "Cannot submit a batch in phase {:?}",
                batch.phase()
            )));
        }
        if batch.items().is_empty() {
            return Err(UploadError::Validation("No files selected".to_string()));
        }

        let batch_id = batch.id().to_string();
        self.cancel_tokens
            .lock()
            .unwrap()
            .insert(batch_id.clone(), CancellationToken::new());

        if self
            .commands_tx
            .send(UploadCommand::Transfer { batch })
            .is_err()
        {
            self.cancel_tokens.lock().unwrap().remove(&batch_id);
            return Err(UploadError::ServiceUnavailable(
                "Upload worker is not running".to_string(),
            ));
        }
        Ok(batch_id)
    }

    /// Request cooperative cancellation of a queued or in-flight batch.
    ///
    /// Returns false if the batch is unknown or already finished.
    pub fn cancel(&self, batch_id: &str) -> bool {
        match self.cancel_tokens.lock().unwrap().get(batch_id) {
            Some(token) => {
                info!("Cancellation requested for batch {}", batch_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Subscribe to events for a specific batch.
    /// Subscription is automatically removed when the receiver is dropped.
    pub fn subscribe_batch(&self, batch_id: &str) -> mpsc::UnboundedReceiver<TransferEvent> {
        self.events.subscribe(SubscriptionFilter::Batch {
            batch_id: batch_id.to_string(),
        })
    }

    /// Subscribe to events for a single item within a batch.
    pub fn subscribe_item(&self, identifier: &str) -> mpsc::UnboundedReceiver<TransferEvent> {
        self.events.subscribe(SubscriptionFilter::Item {
            identifier: identifier.to_string(),
        })
    }

    /// Subscribe to every transfer event (for a global uploader widget).
    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<TransferEvent> {
        self.events.subscribe(SubscriptionFilter::All)
    }
}
