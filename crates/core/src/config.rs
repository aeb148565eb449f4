use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub invoicing: InvoicingConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for project files and organization logos
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicingConfig {
    /// Prefix used when an organization has none configured
    #[serde(default = "default_prefix")]
    pub default_prefix: String,
    #[serde(default = "default_due_days")]
    pub default_due_days: u32,
    /// Sequential candidates tried before numbering gives up
    #[serde(default = "default_probe_window")]
    pub probe_window: u32,
    /// Fresh probes attempted after losing a race on the unique number
    #[serde(default = "default_collision_retries")]
    pub collision_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_max_logo_bytes")]
    pub max_logo_bytes: u64,
    #[serde(default = "default_file_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_logo_extensions")]
    pub logo_extensions: Vec<String>,
}

fn default_prefix() -> String { "INV".to_string() }
fn default_due_days() -> u32 { 14 }
fn default_probe_window() -> u32 { 1000 }
fn default_collision_retries() -> u32 { 3 }
fn default_max_file_bytes() -> u64 { 20 * 1024 * 1024 }
fn default_max_logo_bytes() -> u64 { 4 * 1024 * 1024 }

fn default_file_extensions() -> Vec<String> {
    ["pdf", "png", "jpg", "jpeg", "docx", "xlsx", "zip"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_logo_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for InvoicingConfig {
    fn default() -> Self {
        Self {
            default_prefix: default_prefix(),
            default_due_days: default_due_days(),
            probe_window: default_probe_window(),
            collision_retries: default_collision_retries(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_logo_bytes: default_max_logo_bytes(),
            allowed_extensions: default_file_extensions(),
            logo_extensions: default_logo_extensions(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: "./data/agency.db".to_string(),
            },
            storage: StorageConfig {
                path: "./data/storage".to_string(),
            },
            invoicing: InvoicingConfig::default(),
            uploads: UploadConfig::default(),
        }
    }
}

/// Checked in order when `AGENCY_CONFIG` is unset
const SEARCH_PATHS: &[&str] = &["agency.toml", "config/agency.toml", "/etc/agency/agency.toml"];

impl Config {
    /// `.env`, then `AGENCY_CONFIG`, then the first file on the search path,
    /// else defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        if let Some(path) = std::env::var_os("AGENCY_CONFIG") {
            return Self::load_from_path(Path::new(&path));
        }

        match SEARCH_PATHS.iter().map(Path::new).find(|p| p.exists()) {
            Some(path) => Self::load_from_path(path),
            None => {
                tracing::warn!(searched = ?SEARCH_PATHS, "No agency config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            database = %config.database.path,
            storage = %config.storage.path,
            "Loaded configuration"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [database]
            path = "/tmp/agency.db"

            [storage]
            path = "/tmp/agency-files"

            [invoicing]
            default_prefix = "BILL"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, "/tmp/agency.db");
        assert_eq!(config.invoicing.default_prefix, "BILL");
        assert_eq!(config.invoicing.default_due_days, 14);
        assert_eq!(config.invoicing.probe_window, 1000);
        assert_eq!(config.uploads.max_file_bytes, 20 * 1024 * 1024);
        assert!(config.uploads.allowed_extensions.contains(&"pdf".to_string()));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agency.toml");
        std::fs::write(
            &path,
            "[database]\npath = \"a.db\"\n[storage]\npath = \"files\"\n[invoicing]\ncollision_retries = 5\n",
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.storage.path, "files");
        assert_eq!(config.invoicing.collision_retries, 5);
    }

    #[test]
    fn test_unreadable_path_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = Config::load_from_path(&missing).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));
    }
}
