use crate::address::AddressRules;
use crate::resources::ThrottleLimits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use validator::{Validate, ValidationError};

pub const DEFAULT_SEED: &str = "http://jaz45aabn5vkemy4jkg4mi4syheisqn2wn2n4fsuitpccdackjwxplad.onion/";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_bounds"))]
pub struct CrawlConfig {
    /// Optional path to a parent configuration file to inherit from
    pub extends: Option<String>,

    #[validate(length(min = 1))]
    pub proxy: String,

    #[validate(range(min = 1))]
    pub proxy_check_timeout_secs: u64,

    #[validate(length(min = 1))]
    pub seeds: Vec<String>,

    pub headers: BTreeMap<String, String>,

    #[validate(range(min = 1))]
    pub max_concurrency: usize,

    #[validate(range(min = 1))]
    pub min_concurrency: usize,

    pub base_delay_ms: u64,

    #[validate(range(min = 0.0, max = 100.0))]
    pub memory_ceiling: f64,

    #[validate(range(min = 0.0, max = 100.0))]
    pub cpu_ceiling: f64,

    pub cpu_sample_ms: u64,

    #[validate(range(min = 1))]
    pub fetch_timeout_secs: u64,

    pub skip_extensions: Vec<String>,

    #[validate(range(min = 32))]
    pub max_url_length: usize,

    #[validate(range(min = 1))]
    pub filter_capacity: usize,

    pub filter_error_rate: f64,

    #[validate(range(min = 1))]
    pub default_duration_minutes: u64,

    #[validate(range(min = 1))]
    pub min_duration_minutes: u64,

    pub max_duration_minutes: u64,

    pub output_root: String,

    pub save_raw_pages: bool,

    pub store_content: bool,

    pub store: StoreConfig,

    pub exhausted_policy: ExhaustedPolicy,

    pub seed_retry_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Console,
    Memory,
    Sqlite {
        /// Relative paths are resolved against `output_root`.
        #[serde(default = "default_db_path")]
        path: String,
        #[serde(default = "default_table_name")]
        table: String,
    },
}

/// What the scheduler does once the frontier is empty and every seed is
/// already known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustedPolicy {
    #[default]
    Stop,
    Wait,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        let headers = [
            (
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            ),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Connection", "keep-alive"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let skip_extensions = [
            ".mp4", ".mp3", ".avi", ".mkv", ".mov", ".jpg", ".png", ".gif", ".zip", ".rar", ".pdf",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        Self {
            extends: None,
            proxy: "socks5h://127.0.0.1:9050".to_string(),
            proxy_check_timeout_secs: 2,
            seeds: vec![DEFAULT_SEED.to_string()],
            headers,
            max_concurrency: 8,
            min_concurrency: 2,
            base_delay_ms: 3_000,
            memory_ceiling: 70.0,
            cpu_ceiling: 80.0,
            cpu_sample_ms: 1_000,
            fetch_timeout_secs: 30,
            skip_extensions,
            max_url_length: 2_048,
            filter_capacity: 100_000,
            filter_error_rate: 0.001,
            default_duration_minutes: 30,
            min_duration_minutes: 10,
            max_duration_minutes: 180,
            output_root: "data".to_string(),
            save_raw_pages: true,
            store_content: true,
            store: StoreConfig::default(),
            exhausted_policy: ExhaustedPolicy::Stop,
            seed_retry_interval_ms: 5_000,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Sqlite {
            path: default_db_path(),
            table: default_table_name(),
        }
    }
}

impl CrawlConfig {
    pub fn address_rules(&self) -> AddressRules {
        AddressRules::new(self.max_url_length, &self.skip_extensions)
    }

    pub fn throttle_limits(&self) -> ThrottleLimits {
        ThrottleLimits {
            max_concurrency: self.max_concurrency,
            min_concurrency: self.min_concurrency,
            base_delay: Duration::from_millis(self.base_delay_ms),
            memory_ceiling: self.memory_ceiling,
            cpu_ceiling: self.cpu_ceiling,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn output_root(&self) -> PathBuf {
        PathBuf::from(&self.output_root)
    }

    /// Checks a requested run length against the configured range.
    pub fn check_duration(&self, minutes: u64) -> Result<Duration, String> {
        if minutes < self.min_duration_minutes || minutes > self.max_duration_minutes {
            return Err(format!(
                "Time limit must be between {} and {} minutes (got {})",
                self.min_duration_minutes, self.max_duration_minutes, minutes
            ));
        }
        Ok(Duration::from_secs(minutes * 60))
    }
}

fn validate_bounds(config: &CrawlConfig) -> Result<(), ValidationError> {
    let rules = AddressRules::new(config.max_url_length, &[]);
    if !config.seeds.iter().all(|seed| rules.is_valid(seed)) {
        return Err(ValidationError::new("invalid_seed_address"));
    }
    if config.min_concurrency > config.max_concurrency {
        return Err(ValidationError::new("min_concurrency_above_max"));
    }
    if config.min_duration_minutes > config.max_duration_minutes {
        return Err(ValidationError::new("min_duration_above_max"));
    }
    if !(config.filter_error_rate > 0.0 && config.filter_error_rate < 1.0) {
        return Err(ValidationError::new("filter_error_rate_out_of_range"));
    }
    if config.memory_ceiling <= 0.0 || config.cpu_ceiling <= 0.0 {
        return Err(ValidationError::new("ceiling_must_be_positive"));
    }
    Ok(())
}

fn default_db_path() -> String {
    "crawl.db".to_string()
}

fn default_table_name() -> String {
    "crawler_page".to_string()
}
