use std::path::Path;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SumoSearchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    #[default]
    Stdio,
    Http,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub mode: ServerMode,
    pub http_addr: Option<String>,
    pub http_port: Option<u16>,
}

/// Sumo Logic 连接参数。access_id / access_key 通常来自环境变量。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SumoConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub access_id: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
}

impl Default for SumoConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            access_id: String::new(),
            access_key: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
            page_limit: default_page_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// IANA 时区名，既传给后端，也用于格式化默认时间范围。
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default = "default_lookback_hours")]
    pub default_lookback_hours: i64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            time_zone: default_time_zone(),
            default_lookback_hours: default_lookback_hours(),
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl SearchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn tz(&self) -> Result<Tz> {
        self.time_zone.parse::<Tz>().map_err(|e| {
            SumoSearchError::ConfigError(format!("unknown time zone {:?}: {e}", self.time_zone))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaskRule {
    pub name: String,
    pub pattern: String,
    /// 支持 `$1` 形式的捕获组引用，`{placeholder}` 会被替换为全局占位符。
    pub replacement: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskingConfig {
    #[serde(default)]
    pub rules: Vec<MaskRule>,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            placeholder: default_placeholder(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sumo: SumoConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub masking: MaskingConfig,
}

impl Config {
    /// 按扩展名解析 YAML 或 JSON 配置文件，然后叠加环境变量。
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SumoSearchError::ConfigError(format!("read {} failed: {e}", path.display()))
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let mut cfg: Config = if is_json {
            serde_json::from_str(&text)
                .map_err(|e| SumoSearchError::ConfigError(format!("invalid json config: {e}")))?
        } else {
            serde_yaml::from_str(&text)
                .map_err(|e| SumoSearchError::ConfigError(format!("invalid yaml config: {e}")))?
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// 无配置文件时：默认值 + 环境变量。
    pub fn from_env() -> Result<Self> {
        let mut cfg = Config::default();
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SUMO_ACCESS_ID").filter(|v| !v.is_empty()) {
            self.sumo.access_id = v;
        }
        if let Some(v) = lookup("SUMO_ACCESS_KEY").filter(|v| !v.is_empty()) {
            self.sumo.access_key = v;
        }
        if let Some(v) = lookup("SUMO_ENDPOINT").filter(|v| !v.is_empty()) {
            self.sumo.endpoint = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sumo.endpoint.trim().is_empty() {
            return Err(SumoSearchError::ConfigError("sumo.endpoint is empty".into()));
        }
        if self.search.poll_interval_ms == 0 {
            return Err(SumoSearchError::ConfigError(
                "search.poll_interval_ms must be > 0".into(),
            ));
        }
        if self.search.max_wait_ms == 0 {
            return Err(SumoSearchError::ConfigError(
                "search.max_wait_ms must be > 0".into(),
            ));
        }
        if !(1..=MAX_LOOKBACK_HOURS).contains(&self.search.default_lookback_hours) {
            return Err(SumoSearchError::ConfigError(format!(
                "search.default_lookback_hours must be within 1..={MAX_LOOKBACK_HOURS}"
            )));
        }
        self.search.tz()?;
        for rule in &self.masking.rules {
            regex::Regex::new(&rule.pattern).map_err(|e| SumoSearchError::RegexError {
                pattern: rule.pattern.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

fn default_endpoint() -> String {
    "https://api.sumologic.com".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_page_limit() -> usize {
    10_000
}

fn default_time_zone() -> String {
    "Asia/Hong_Kong".to_string()
}

/// 约十年。
pub const MAX_LOOKBACK_HOURS: i64 = 10 * 366 * 24;

fn default_lookback_hours() -> i64 {
    24
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_max_wait_ms() -> u64 {
    5 * 60 * 1_000
}

fn default_placeholder() -> String {
    "***MASKED***".to_string()
}
