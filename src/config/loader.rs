use crate::config::schema::{CrawlConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::output::{ConsoleStore, MemoryStore, RecordStore, SqliteStore};
use config::{Environment, File, FileFormat};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use validator::Validate;

/// Environment overrides look like `ONION_CRAWLER__MAX_CONCURRENCY=4`.
pub const ENV_PREFIX: &str = "ONION_CRAWLER";

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<CrawlConfig> {
        let path = path.as_ref();
        let mut visited = HashSet::new();
        let config = Self::load_with_inheritance(path, &mut visited)?;
        Self::finish(config)
    }

    /// Built-in defaults plus environment overrides, for runs without a file.
    pub fn load_default() -> Result<CrawlConfig> {
        Self::finish(CrawlConfig::default())
    }

    pub fn load_optional(path: Option<&Path>) -> Result<CrawlConfig> {
        match path {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        }
    }

    fn finish(config: CrawlConfig) -> Result<CrawlConfig> {
        let config = Self::apply_env(config)?;
        config.validate()?;
        Ok(config)
    }

    fn load_with_inheritance(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<CrawlConfig> {
        let path = fs::canonicalize(path).map_err(|e| {
            Error::Config(format!("{}: {}", path.display(), e))
        })?;

        if visited.contains(&path) {
            return Err(Error::Config(format!(
                "Circular inheritance detected involving {}",
                path.display()
            )));
        }
        visited.insert(path.clone());

        let config = Self::load_file(&path)?;

        if let Some(parent_path_str) = &config.extends {
            let parent_path = path.parent()
                .ok_or_else(|| Error::Config(format!(
                    "Cannot determine parent directory for {}",
                    path.display()
                )))?
                .join(parent_path_str);

            let parent_config = Self::load_with_inheritance(&parent_path, visited)?;
            Self::merge_configs(parent_config, config)
        } else {
            Ok(config)
        }
    }

    fn load_file(path: &Path) -> Result<CrawlConfig> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            Some("toml") => Ok(toml::from_str(&content)?),
            _ => Err(Error::Config(format!(
                "Unsupported file extension: {}",
                path.display()
            ))),
        }
    }

    /// Child fields that differ from the built-in defaults replace the
    /// parent's values.
    fn merge_configs(parent: CrawlConfig, child: CrawlConfig) -> Result<CrawlConfig> {
        let defaults = serde_json::to_value(CrawlConfig::default())?;
        let mut merged = serde_json::to_value(parent)?;
        let child = serde_json::to_value(child)?;

        if let (Value::Object(merged), Value::Object(child)) = (&mut merged, child) {
            for (key, value) in child {
                if defaults.get(&key) != Some(&value) {
                    merged.insert(key, value);
                }
            }
            merged.insert("extends".to_string(), Value::Null);
        }

        Ok(serde_json::from_value(merged)?)
    }

    fn apply_env(config: CrawlConfig) -> Result<CrawlConfig> {
        let json = serde_json::to_string(&config)?;
        let layered = config::Config::builder()
            .add_source(File::from_str(&json, FileFormat::Json))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(layered.try_deserialize()?)
    }

    /// Opens the configured record store. A SQLite store that cannot be
    /// opened degrades to an in-memory one instead of failing the run.
    pub async fn create_store(
        config: &CrawlConfig,
        multi: Option<Arc<indicatif::MultiProgress>>,
    ) -> Box<dyn RecordStore> {
        match &config.store {
            StoreConfig::Console => Box::new(ConsoleStore::new(multi)),
            StoreConfig::Memory => Box::new(MemoryStore::new()),
            StoreConfig::Sqlite { path, table } => {
                let path = config.output_root().join(path);
                match SqliteStore::new(path.clone(), table.clone()).await {
                    Ok(store) => Box::new(store),
                    Err(e) => {
                        log::warn!(
                            "Record store {} unavailable ({}). Continuing with in-memory records.",
                            path.display(),
                            e
                        );
                        Box::new(MemoryStore::new())
                    }
                }
            }
        }
    }
}
