use super::{classify_source_url, LinkImportError, LinkProvider, RemoteFile};
use crate::config::LinkImportConfig;
use crate::retry::retry_with_backoff;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resolves a shareable URL into a manifest of downloadable files.
///
/// Implementations own the provider-specific protocol; callers only see
/// the manifest or a resolution error.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<Vec<RemoteFile>, LinkImportError>;
}

/// Parsed Google Drive share target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveTarget {
    File(String),
    Folder(String),
}

/// Extract the transfer id (and optional security hash) from a WeTransfer URL.
///
/// Handles:
/// - `https://we.tl/t-XXXXXXXXXX`
/// - `https://wetransfer.com/downloads/XXXXXXXXXX`
/// - `https://wetransfer.com/downloads/XXXXXXXXXX/YYYYYYYY`
pub fn parse_wetransfer_url(url: &str) -> Option<(String, Option<String>)> {
    let short = Regex::new(r"we\.tl/t-([A-Za-z0-9]+)").unwrap();
    if let Some(caps) = short.captures(url) {
        return Some((caps[1].to_string(), None));
    }

    let full = Regex::new(r"wetransfer\.com/downloads/([A-Za-z0-9]+)(?:/([a-f0-9]+))?").unwrap();
    full.captures(url)
        .map(|caps| (caps[1].to_string(), caps.get(2).map(|m| m.as_str().to_string())))
}

/// Classify a Google Drive URL as a file or folder share and extract its id.
pub fn parse_google_drive_url(url: &str) -> Option<DriveTarget> {
    let patterns: [(&str, fn(String) -> DriveTarget); 4] = [
        (r"drive\.google\.com/file/d/([A-Za-z0-9_-]+)", DriveTarget::File),
        (r"drive\.google\.com/open\?id=([A-Za-z0-9_-]+)", DriveTarget::File),
        (
            r"drive\.google\.com/drive/folders/([A-Za-z0-9_-]+)",
            DriveTarget::Folder,
        ),
        (
            r"drive\.google\.com/drive/u/\d+/folders/([A-Za-z0-9_-]+)",
            DriveTarget::Folder,
        ),
    ];
    for (pattern, build) in patterns {
        let re = Regex::new(pattern).unwrap();
        if let Some(caps) = re.captures(url) {
            return Some(build(caps[1].to_string()));
        }
    }
    None
}

/// Rewrite a Dropbox share URL into its direct-download form (`dl=1`).
pub fn dropbox_direct_url(url: &str) -> Result<String, LinkImportError> {
    let mut parsed = reqwest::Url::parse(url)
        .map_err(|_| LinkImportError::Resolution(format!("Invalid Dropbox URL: {}", url)))?;
    let retained: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != "dl")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = parsed.query_pairs_mut();
        pairs.clear();
        for (k, v) in retained {
            pairs.append_pair(&k, &v);
        }
        pairs.append_pair("dl", "1");
    }
    Ok(parsed.to_string())
}

/// Derive the OneDrive shares-API content URL for a share link.
///
/// Uses the documented `u!` share-id encoding: base64url of the full URL,
/// unpadded.
pub fn onedrive_content_url(url: &str) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(url.as_bytes());
    format!("https://api.onedrive.com/v1.0/shares/u!{}/root/content", encoded)
}

/// Last path segment of a URL, used as a filename fallback.
fn filename_from_url(url: &str, fallback: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
                .map(|s| s.to_string())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Link resolver backed by the providers' public HTTP endpoints.
pub struct HttpLinkResolver {
    client: reqwest::Client,
    config: LinkImportConfig,
}

impl HttpLinkResolver {
    pub fn new(config: LinkImportConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    async fn analyze(
        &self,
        provider: LinkProvider,
        url: &str,
    ) -> Result<Vec<RemoteFile>, LinkImportError> {
        match provider {
            LinkProvider::WeTransfer => self.analyze_wetransfer(url).await,
            LinkProvider::GoogleDrive => self.analyze_google_drive(url).await,
            LinkProvider::Dropbox => self.analyze_dropbox(url),
            LinkProvider::OneDrive => Ok(self.analyze_onedrive(url)),
        }
    }

    async fn analyze_wetransfer(&self, url: &str) -> Result<Vec<RemoteFile>, LinkImportError> {
        let (transfer_id, security_hash) = parse_wetransfer_url(url).ok_or_else(|| {
            LinkImportError::Resolution(format!("Could not parse WeTransfer URL: {}", url))
        })?;

        let api_url = format!("https://wetransfer.com/api/v4/transfers/{}", transfer_id);
        debug!("Fetching WeTransfer file list from {}", api_url);

        let mut request = self
            .client
            .get(&api_url)
            .timeout(self.timeout())
            .header("Accept", "application/json")
            .header("User-Agent", &self.config.user_agent);
        if let Some(hash) = &security_hash {
            request = request.query(&[("security_hash", hash.as_str())]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(LinkImportError::Resolution(format!(
                "WeTransfer API returned status {}",
                response.status()
            )));
        }
        let data: serde_json::Value = response.json().await?;

        let entries = data
            .get("files")
            .or_else(|| data.get("items"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                LinkImportError::Resolution("WeTransfer response listed no files".to_string())
            })?;

        let files: Vec<RemoteFile> = entries
            .iter()
            .filter_map(|entry| {
                let file_id = entry.get("id").and_then(|v| v.as_str())?;
                let filename = entry
                    .get("name")
                    .or_else(|| entry.get("filename"))
                    .and_then(|v| v.as_str())
                    .unwrap_or(file_id);
                Some(RemoteFile {
                    filename: filename.to_string(),
                    size_bytes: entry.get("size").and_then(|v| v.as_u64()),
                    mime_type: None,
                    download_url: format!(
                        "https://wetransfer.com/api/v4/transfers/{}/download/{}",
                        transfer_id, file_id
                    ),
                })
            })
            .collect();

        info!("WeTransfer analysis found {} files", files.len());
        Ok(files)
    }

    async fn analyze_google_drive(&self, url: &str) -> Result<Vec<RemoteFile>, LinkImportError> {
        let target = parse_google_drive_url(url).ok_or_else(|| {
            LinkImportError::Resolution(format!("Could not parse Google Drive URL: {}", url))
        })?;

        match target {
            DriveTarget::File(file_id) => {
                let api_key = match &self.config.google_drive_api_key {
                    Some(key) => key,
                    None => {
                        // No API key: fall back to the public download endpoint
                        // with unknown metadata.
                        debug!("No Google Drive API key, using direct download URL");
                        return Ok(vec![RemoteFile {
                            filename: format!("drive-file-{}", file_id),
                            size_bytes: None,
                            mime_type: None,
                            download_url: format!(
                                "https://drive.google.com/uc?export=download&id={}",
                                file_id
                            ),
                        }]);
                    }
                };

                let meta_url = format!(
                    "{}/files/{}?fields=id,name,size,mimeType&key={}",
                    self.config.google_drive_base_url, file_id, api_key
                );
                let response = self.client.get(&meta_url).timeout(self.timeout()).send().await?;
                if !response.status().is_success() {
                    return Err(LinkImportError::Resolution(format!(
                        "Google Drive API returned status {}",
                        response.status()
                    )));
                }
                let meta: serde_json::Value = response.json().await?;
                Ok(vec![self.drive_entry_to_remote_file(&meta, api_key)])
            }
            DriveTarget::Folder(folder_id) => {
                let api_key = self.config.google_drive_api_key.as_ref().ok_or_else(|| {
                    LinkImportError::Resolution(
                        "Google Drive folder imports require an API key".to_string(),
                    )
                })?;

                let list_url = format!(
                    "{}/files?q='{}'+in+parents&pageSize={}&fields=files(id,name,size,mimeType)&key={}",
                    self.config.google_drive_base_url,
                    folder_id,
                    self.config.max_files_per_folder,
                    api_key
                );
                let response = self.client.get(&list_url).timeout(self.timeout()).send().await?;
                if !response.status().is_success() {
                    return Err(LinkImportError::Resolution(format!(
                        "Google Drive API returned status {}",
                        response.status()
                    )));
                }
                let data: serde_json::Value = response.json().await?;
                let entries = data
                    .get("files")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| {
                        LinkImportError::Resolution("Google Drive folder listed no files".to_string())
                    })?;

                let files: Vec<RemoteFile> = entries
                    .iter()
                    .filter(|entry| {
                        entry.get("mimeType").and_then(|v| v.as_str())
                            != Some("application/vnd.google-apps.folder")
                    })
                    .take(self.config.max_files_per_folder)
                    .map(|entry| self.drive_entry_to_remote_file(entry, api_key))
                    .collect();

                info!("Google Drive folder analysis found {} files", files.len());
                Ok(files)
            }
        }
    }

    fn drive_entry_to_remote_file(&self, entry: &serde_json::Value, api_key: &str) -> RemoteFile {
        let file_id = entry.get("id").and_then(|v| v.as_str()).unwrap_or_default();
        let filename = entry
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("drive-file-{}", file_id));
        // Drive reports size as a string field
        let size_bytes = entry
            .get("size")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok());
        RemoteFile {
            filename,
            size_bytes,
            mime_type: entry
                .get("mimeType")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            download_url: format!(
                "{}/files/{}?alt=media&key={}",
                self.config.google_drive_base_url, file_id, api_key
            ),
        }
    }

    fn analyze_dropbox(&self, url: &str) -> Result<Vec<RemoteFile>, LinkImportError> {
        let download_url = dropbox_direct_url(url)?;
        let filename = filename_from_url(url, "dropbox-file");
        info!("Dropbox analysis resolved direct download for '{}'", filename);
        Ok(vec![RemoteFile {
            filename,
            size_bytes: None,
            mime_type: None,
            download_url,
        }])
    }

    fn analyze_onedrive(&self, url: &str) -> Vec<RemoteFile> {
        let filename = filename_from_url(url, "onedrive-file");
        info!("OneDrive analysis resolved share content URL for '{}'", filename);
        vec![RemoteFile {
            filename,
            size_bytes: None,
            mime_type: None,
            download_url: onedrive_content_url(url),
        }]
    }
}

#[async_trait]
impl LinkResolver for HttpLinkResolver {
    async fn resolve(&self, url: &str) -> Result<Vec<RemoteFile>, LinkImportError> {
        // Allow-list check happens before any network call
        let provider = classify_source_url(url)?;
        info!("Resolving {} link", provider);

        let result = retry_with_backoff(3, Duration::from_secs(1), "link resolution", || {
            self.analyze(provider, url)
        })
        .await;

        if let Err(e) = &result {
            warn!("Link resolution failed for {} link: {}", provider, e);
        }
        result
    }
}
