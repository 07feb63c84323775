/// CLI configuration
use anyhow::Context;
use cratedig_importer::ImportConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CliConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default)]
    pub import: ImportConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            import: ImportConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load configuration from file and environment
    ///
    /// `path` must exist when given; otherwise `cratedig.toml` in the working
    /// directory is used if present. `CRATEDIG_*` variables override both,
    /// with `__` separating nested keys (`CRATEDIG_IMPORT__RESUME=false`).
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from("cratedig.toml");
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("CRATEDIG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let loaded = settings.build().context("Failed to read configuration")?;
        loaded
            .try_deserialize()
            .context("Invalid configuration")
    }
}

fn default_database_url() -> String {
    "sqlite://./cratedig.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cratedig_importer::FileManagementStrategy;

    #[test]
    fn loads_nested_import_settings_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cratedig.toml");
        std::fs::write(
            &path,
            r#"
database_url = "sqlite:///tmp/catalog.db"

[import]
singletons = true
resume = false
"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.database_url, "sqlite:///tmp/catalog.db");
        assert!(config.import.singletons);
        assert!(!config.import.resume);
        // Untouched values keep their defaults
        assert_eq!(config.import.file_strategy, FileManagementStrategy::Copy);
        assert_eq!(config.import.queue_capacity, ImportConfig::default().queue_capacity);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CliConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
