//! Upload/import engine: batch selection, validation, sequential transfer,
//! and event fan-out to the host surfaces.

mod handle;
mod service;
mod tracker;
mod types;
mod validation;

pub use handle::{TransferEventsHandle, UploadServiceHandle};
pub use service::UploadService;
pub use tracker::TransferBatch;
pub use types::{
    ItemStatus, SelectedFile, TransferEvent, TransferItem, TransferPhase, TransferSource,
};
pub use validation::{header_matches, ValidationRules};

use crate::link_import::LinkImportError;
use crate::transport::TransportError;
use thiserror::Error;

/// Upload failure taxonomy.
///
/// Validation and unsupported-source errors block a transfer from starting;
/// per-item transfer errors are recorded on the batch and do not abort
/// sibling items; cancellation is user-initiated, not a fault. Nothing here
/// is fatal to the host process.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Unsupported source domain: {0}")]
    UnsupportedSource(String),
    #[error("Failed to resolve link: {0}")]
    Resolution(String),
    #[error("Transfer failed: {0}")]
    Transfer(String),
    #[error("Transfer cancelled")]
    Cancelled,
    #[error("Upload service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<LinkImportError> for UploadError {
    fn from(e: LinkImportError) -> Self {
        match e {
            LinkImportError::UnsupportedSource(host) => UploadError::UnsupportedSource(host),
            LinkImportError::Resolution(message) => UploadError::Resolution(message),
        }
    }
}

impl From<TransportError> for UploadError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Cancelled => UploadError::Cancelled,
            other => UploadError::Transfer(other.to_string()),
        }
    }
}
