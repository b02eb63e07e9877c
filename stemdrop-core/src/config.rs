use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Upload surface a batch originates from.
///
/// Context-specific settings override global settings, which override defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadContext {
    Global,
    Projects,
    Pitches,
    ClientPortals,
}

impl UploadContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Projects => "projects",
            Self::Pitches => "pitches",
            Self::ClientPortals => "client_portals",
        }
    }
}

impl std::fmt::Display for UploadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const DEFAULT_MAX_FILE_SIZE_MB: u64 = 500;
const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

/// Per-context overrides in the YAML config. Unset keys fall through to global.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSettingsYaml {
    pub max_file_size_mb: Option<u64>,
    pub max_retry_attempts: Option<u32>,
}

/// YAML config file structure (non-secret settings)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigYaml {
    #[serde(default)]
    pub max_file_size_mb: Option<u64>,
    #[serde(default)]
    pub max_retry_attempts: Option<u32>,
    #[serde(default)]
    pub retry_base_delay_ms: Option<u64>,
    #[serde(default)]
    pub projects: ContextSettingsYaml,
    #[serde(default)]
    pub pitches: ContextSettingsYaml,
    #[serde(default)]
    pub client_portals: ContextSettingsYaml,
    #[serde(default)]
    pub link_import: LinkImportYaml,
}

/// Link import section of the YAML config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkImportYaml {
    pub google_drive_api_key: Option<String>,
    pub google_drive_base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_files_per_link: Option<usize>,
    pub max_files_per_folder: Option<usize>,
    pub max_total_import_mb: Option<u64>,
}

/// Resolved link import configuration
#[derive(Debug, Clone)]
pub struct LinkImportConfig {
    pub google_drive_api_key: Option<String>,
    pub google_drive_base_url: String,
    pub timeout_seconds: u64,
    pub max_files_per_link: usize,
    pub max_files_per_folder: usize,
    pub max_total_import_mb: u64,
    pub user_agent: String,
}

impl Default for LinkImportConfig {
    fn default() -> Self {
        Self {
            google_drive_api_key: None,
            google_drive_base_url: "https://www.googleapis.com/drive/v3".to_string(),
            timeout_seconds: 60,
            max_files_per_link: 20,
            max_files_per_folder: 100,
            max_total_import_mb: 1024,
            user_agent: "stemdrop-link-importer/1.0".to_string(),
        }
    }
}

/// Settings resolved for one upload context, ready to hand to validation
/// and the upload service.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub context: UploadContext,
    pub max_file_size_mb: u64,
    pub max_retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl UploadSettings {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub max_file_size_mb: u64,
    pub max_retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub projects: ContextSettingsYaml,
    pub pitches: ContextSettingsYaml,
    pub client_portals: ContextSettingsYaml,
    pub link_import: LinkImportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            projects: ContextSettingsYaml::default(),
            pitches: ContextSettingsYaml::default(),
            client_portals: ContextSettingsYaml::default(),
            link_import: LinkImportConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let dev_mode = std::env::var("STEMDROP_DEV_MODE").is_ok() || dotenvy::dotenv().is_ok();
        if dev_mode {
            info!("Dev mode activated - loading from .env");
            Self::from_env()
        } else {
            info!("Production mode - loading from config.yaml");
            Self::from_config_file()
        }
    }

    fn from_env() -> Self {
        let mut config = Config::default();
        if let Some(mb) = env_u64("STEMDROP_MAX_FILE_SIZE_MB") {
            config.max_file_size_mb = clamp_file_size_mb(mb);
        }
        if let Some(attempts) = env_u64("STEMDROP_MAX_RETRY_ATTEMPTS") {
            config.max_retry_attempts = clamp_retry_attempts(attempts as u32);
        }
        config.link_import.google_drive_api_key = std::env::var("STEMDROP_GOOGLE_DRIVE_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        config
    }

    fn from_config_file() -> Self {
        let home_dir = match dirs::home_dir() {
            Some(dir) => dir,
            None => {
                warn!("No home directory, using default upload settings");
                return Config::default();
            }
        };
        Self::load_from_dir(&home_dir.join(".stemdrop"))
    }

    fn load_from_dir(config_dir: &Path) -> Self {
        let config_path = config_dir.join("config.yaml");
        let content = match std::fs::read_to_string(&config_path) {
            Ok(content) => content,
            Err(_) => {
                info!(
                    "No config.yaml at {}, using default upload settings",
                    config_path.display()
                );
                return Config::default();
            }
        };
        match serde_yaml::from_str::<ConfigYaml>(&content) {
            Ok(yaml) => Self::from_yaml(yaml),
            Err(e) => {
                warn!(
                    "Failed to parse {}: {}, using default upload settings",
                    config_path.display(),
                    e
                );
                Config::default()
            }
        }
    }

    fn from_yaml(yaml: ConfigYaml) -> Self {
        let defaults = LinkImportConfig::default();
        Self {
            max_file_size_mb: clamp_file_size_mb(
                yaml.max_file_size_mb.unwrap_or(DEFAULT_MAX_FILE_SIZE_MB),
            ),
            max_retry_attempts: clamp_retry_attempts(
                yaml.max_retry_attempts.unwrap_or(DEFAULT_MAX_RETRY_ATTEMPTS),
            ),
            retry_base_delay_ms: yaml
                .retry_base_delay_ms
                .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            projects: yaml.projects,
            pitches: yaml.pitches,
            client_portals: yaml.client_portals,
            link_import: LinkImportConfig {
                google_drive_api_key: yaml.link_import.google_drive_api_key,
                google_drive_base_url: yaml
                    .link_import
                    .google_drive_base_url
                    .unwrap_or(defaults.google_drive_base_url),
                timeout_seconds: yaml
                    .link_import
                    .timeout_seconds
                    .unwrap_or(defaults.timeout_seconds),
                max_files_per_link: yaml
                    .link_import
                    .max_files_per_link
                    .unwrap_or(defaults.max_files_per_link),
                max_files_per_folder: yaml
                    .link_import
                    .max_files_per_folder
                    .unwrap_or(defaults.max_files_per_folder),
                max_total_import_mb: yaml
                    .link_import
                    .max_total_import_mb
                    .unwrap_or(defaults.max_total_import_mb),
                user_agent: defaults.user_agent,
            },
        }
    }

    /// Persist the current settings as YAML. The admin settings surface
    /// calls this after an update.
    pub fn save_to_dir(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let yaml = ConfigYaml {
            max_file_size_mb: Some(self.max_file_size_mb),
            max_retry_attempts: Some(self.max_retry_attempts),
            retry_base_delay_ms: Some(self.retry_base_delay_ms),
            projects: self.projects.clone(),
            pitches: self.pitches.clone(),
            client_portals: self.client_portals.clone(),
            link_import: LinkImportYaml {
                google_drive_api_key: self.link_import.google_drive_api_key.clone(),
                google_drive_base_url: Some(self.link_import.google_drive_base_url.clone()),
                timeout_seconds: Some(self.link_import.timeout_seconds),
                max_files_per_link: Some(self.link_import.max_files_per_link),
                max_files_per_folder: Some(self.link_import.max_files_per_folder),
                max_total_import_mb: Some(self.link_import.max_total_import_mb),
            },
        };
        std::fs::create_dir_all(config_dir)?;
        let content =
            serde_yaml::to_string(&yaml).map_err(|e| ConfigError::Serialization(e.to_string()))?;
        std::fs::write(config_dir.join("config.yaml"), content)?;
        Ok(())
    }

    /// Resolve settings for an upload context: context override, then global,
    /// then built-in default.
    pub fn settings_for(&self, context: UploadContext) -> UploadSettings {
        let overrides = match context {
            UploadContext::Global => None,
            UploadContext::Projects => Some(&self.projects),
            UploadContext::Pitches => Some(&self.pitches),
            UploadContext::ClientPortals => Some(&self.client_portals),
        };
        let max_file_size_mb = overrides
            .and_then(|o| o.max_file_size_mb)
            .map(clamp_file_size_mb)
            .unwrap_or(self.max_file_size_mb);
        let max_retry_attempts = overrides
            .and_then(|o| o.max_retry_attempts)
            .map(clamp_retry_attempts)
            .unwrap_or(self.max_retry_attempts);
        UploadSettings {
            context,
            max_file_size_mb,
            max_retry_attempts,
            retry_base_delay_ms: self.retry_base_delay_ms,
        }
    }
}

// Bounds match the admin-validated ranges for these settings.
fn clamp_file_size_mb(mb: u64) -> u64 {
    if !(1..=2048).contains(&mb) {
        warn!("max_file_size_mb {} out of bounds, clamping", mb);
    }
    mb.clamp(1, 2048)
}

fn clamp_retry_attempts(attempts: u32) -> u32 {
    if !(1..=5).contains(&attempts) {
        warn!("max_retry_attempts {} out of bounds, clamping", attempts);
    }
    attempts.clamp(1, 5)
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_overrides() {
        let config = Config::default();
        let settings = config.settings_for(UploadContext::Projects);
        assert_eq!(settings.max_file_size_mb, 500);
        assert_eq!(settings.max_retry_attempts, 3);
    }

    #[test]
    fn context_override_wins_over_global() {
        let mut config = Config::default();
        config.max_file_size_mb = 200;
        config.pitches.max_file_size_mb = Some(100);

        assert_eq!(
            config.settings_for(UploadContext::Pitches).max_file_size_mb,
            100
        );
        assert_eq!(
            config.settings_for(UploadContext::Projects).max_file_size_mb,
            200
        );
        assert_eq!(
            config.settings_for(UploadContext::Global).max_file_size_mb,
            200
        );
    }

    #[test]
    fn out_of_bounds_values_are_clamped() {
        let yaml = ConfigYaml {
            max_file_size_mb: Some(10_000),
            max_retry_attempts: Some(99),
            ..Default::default()
        };
        let config = Config::from_yaml(yaml);
        assert_eq!(config.max_file_size_mb, 2048);
        assert_eq!(config.max_retry_attempts, 5);
    }

    #[test]
    fn parse_yaml_with_context_sections() {
        let yaml: ConfigYaml = serde_yaml::from_str(
            r#"
max_file_size_mb: 250
pitches:
  max_file_size_mb: 150
link_import:
  max_files_per_link: 10
"#,
        )
        .unwrap();
        let config = Config::from_yaml(yaml);
        assert_eq!(config.max_file_size_mb, 250);
        assert_eq!(config.pitches.max_file_size_mb, Some(150));
        assert_eq!(config.link_import.max_files_per_link, 10);
        assert_eq!(config.link_import.max_files_per_folder, 100);
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.max_file_size_mb = 300;
        config.client_portals.max_file_size_mb = Some(50);
        config.link_import.max_files_per_link = 5;

        config.save_to_dir(temp.path()).unwrap();
        let reloaded = Config::load_from_dir(temp.path());

        assert_eq!(reloaded.max_file_size_mb, 300);
        assert_eq!(
            reloaded
                .settings_for(UploadContext::ClientPortals)
                .max_file_size_mb,
            50
        );
        assert_eq!(reloaded.link_import.max_files_per_link, 5);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = Config::load_from_dir(temp.path());
        assert_eq!(config.max_file_size_mb, 500);
    }

    #[test]
    fn max_file_size_bytes_conversion() {
        let settings = Config::default().settings_for(UploadContext::Global);
        assert_eq!(settings.max_file_size_bytes(), 500 * 1024 * 1024);
    }
}
