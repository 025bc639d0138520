use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub error_log: ErrorLogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Accepted MIME prefixes, e.g. `image/`.
    #[serde(default = "default_accept")]
    pub accept: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub include_hidden: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            accept: default_accept(),
            exclude: Vec::new(),
            include_hidden: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub root: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogConfig {
    #[serde(default = "default_error_log_max")]
    pub max_bytes: u64,
}

impl Default for ErrorLogConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_error_log_max(),
        }
    }
}

fn default_accept() -> Vec<String> {
    vec!["image/".to_string()]
}

fn default_error_log_max() -> u64 {
    storage::error_log::DEFAULT_MAX_BYTES
}

impl AppConfig {
    /// Config rooted at `root` with every other setting at its default.
    pub fn with_storage_root(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                root: root.into().to_string_lossy().into_owned(),
            },
            scan: ScanConfig::default(),
            export: ExportConfig::default(),
            error_log: ErrorLogConfig::default(),
        }
    }

    pub fn storage_root(&self) -> PathBuf {
        PathBuf::from(&self.storage.root)
    }

    /// Export destination; the storage root unless configured.
    pub fn export_root(&self) -> PathBuf {
        self.export
            .root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.storage_root())
    }

    pub fn session_path(&self) -> PathBuf {
        self.storage_root().join("session.json")
    }

    pub fn summary_log_path(&self) -> PathBuf {
        self.storage_root().join("CategorizedImagesLog.txt")
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.storage_root().join("ErrorLog.txt")
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder().set_default("storage.root", ".curator")?;
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("CURATOR")
            .separator("__")
            .try_parsing(true),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_file_with_defaults_filled_in() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("curator.toml");
        fs::write(
            &file,
            r#"
            [storage]
            root = "/var/lib/curator"

            [scan]
            exclude = ["**/thumbs/**"]
            "#,
        )
        .unwrap();

        let cfg = load(Some(file.to_str().unwrap())).unwrap();
        assert_eq!(cfg.storage.root, "/var/lib/curator");
        assert_eq!(cfg.scan.accept, vec!["image/".to_string()]);
        assert_eq!(cfg.scan.exclude, vec!["**/thumbs/**".to_string()]);
        assert_eq!(cfg.error_log.max_bytes, 1024 * 1024);
        assert_eq!(cfg.export_root(), PathBuf::from("/var/lib/curator"));
    }

    #[test]
    fn derived_paths_live_under_storage_root() {
        let cfg = AppConfig::with_storage_root("/data");
        assert_eq!(cfg.session_path(), PathBuf::from("/data/session.json"));
        assert_eq!(
            cfg.summary_log_path(),
            PathBuf::from("/data/CategorizedImagesLog.txt")
        );
        assert_eq!(cfg.error_log_path(), PathBuf::from("/data/ErrorLog.txt"));
    }
}
