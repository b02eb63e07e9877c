//! Remote-link import: resolve a shareable URL into a manifest of
//! downloadable files.
//!
//! Only allow-listed source domains are accepted, and the allow-list check
//! happens before any network call.

mod resolver;

pub use resolver::{
    dropbox_direct_url, onedrive_content_url, parse_google_drive_url, parse_wetransfer_url,
    DriveTarget, HttpLinkResolver, LinkResolver,
};

use crate::config::LinkImportConfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkImportError {
    #[error("Unsupported source domain: {0}")]
    UnsupportedSource(String),
    #[error("Failed to resolve link: {0}")]
    Resolution(String),
}

impl From<reqwest::Error> for LinkImportError {
    fn from(e: reqwest::Error) -> Self {
        LinkImportError::Resolution(e.to_string())
    }
}

/// Supported link import source
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LinkProvider {
    WeTransfer,
    GoogleDrive,
    Dropbox,
    OneDrive,
}

impl LinkProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeTransfer => "WeTransfer",
            Self::GoogleDrive => "Google Drive",
            Self::Dropbox => "Dropbox",
            Self::OneDrive => "OneDrive",
        }
    }
}

impl std::fmt::Display for LinkProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One downloadable file discovered behind a shareable link.
///
/// Size is unknown for providers whose share pages do not expose it
/// until the download starts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemoteFile {
    pub filename: String,
    pub size_bytes: Option<u64>,
    pub mime_type: Option<String>,
    pub download_url: String,
}

/// Classify a shareable URL by its host against the supported-domain
/// allow-list. Runs no network I/O.
pub fn classify_source_url(url: &str) -> Result<LinkProvider, LinkImportError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|_| LinkImportError::UnsupportedSource(url.to_string()))?;
    let host = parsed.host_str().unwrap_or("").to_lowercase();

    let matches_domain =
        |domain: &str| host == domain || host.ends_with(&format!(".{}", domain));

    if matches_domain("wetransfer.com") || matches_domain("we.tl") {
        Ok(LinkProvider::WeTransfer)
    } else if matches_domain("drive.google.com") {
        Ok(LinkProvider::GoogleDrive)
    } else if matches_domain("dropbox.com") || matches_domain("db.tt") {
        Ok(LinkProvider::Dropbox)
    } else if matches_domain("1drv.ms") || matches_domain("onedrive.live.com") {
        Ok(LinkProvider::OneDrive)
    } else {
        Err(LinkImportError::UnsupportedSource(host))
    }
}

/// Validate a resolved manifest against import limits before any download.
pub fn validate_manifest(
    files: &[RemoteFile],
    config: &LinkImportConfig,
    max_file_size_bytes: u64,
) -> Result<(), LinkImportError> {
    if files.is_empty() {
        return Err(LinkImportError::Resolution(
            "No downloadable files found behind link".to_string(),
        ));
    }
    if files.len() > config.max_files_per_link {
        return Err(LinkImportError::Resolution(format!(
            "Too many files in link. Maximum allowed: {}",
            config.max_files_per_link
        )));
    }

    let mut total: u64 = 0;
    for file in files {
        if let Some(size) = file.size_bytes {
            if size > max_file_size_bytes {
                return Err(LinkImportError::Resolution(format!(
                    "File '{}' is too large. Maximum size: {}MB",
                    file.filename,
                    max_file_size_bytes / 1024 / 1024
                )));
            }
            total += size;
        }
    }

    let max_total = config.max_total_import_mb * 1024 * 1024;
    if total > max_total {
        return Err(LinkImportError::Resolution(format!(
            "Total size of files is too large. Maximum total: {}MB",
            config.max_total_import_mb
        )));
    }

    Ok(())
}
