//! Configuration loading for image-search-mcp
//!
//! Configuration is loaded from:
//! 1. Environment variables (`IMAGE_SEARCH_BACKEND`, `IMAGE_SEARCH_PROXY`,
//!    `YANDEX_BASE_URL`, `IMAGE_SEARCH_TIMEOUT`)
//! 2. Environment variable IMAGE_SEARCH_CONFIG_PATH
//! 3. ~/.binks/image-search.toml
//! 4. Default values

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which reverse image search service answers queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Yandex image metasearch
    #[default]
    Yandex,
    /// SauceNAO, scraped from its HTML result page
    #[serde(alias = "sauce_nao")]
    Saucenao,
    /// A search page driven through headless Chromium
    Browser,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yandex => "yandex",
            Self::Saucenao => "saucenao",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yandex" => Ok(Self::Yandex),
            "saucenao" | "sauce_nao" => Ok(Self::Saucenao),
            "browser" => Ok(Self::Browser),
            other => Err(anyhow!("unknown image search backend: {other}")),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub yandex: YandexConfig,
    #[serde(default)]
    pub saucenao: SauceNaoConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Pipeline-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Backend used for every search
    #[serde(default)]
    pub backend: BackendKind,
    /// Upper bound on a single backend call
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Where inline images are written (OS temp dir when unset)
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

/// HTTP settings shared by the HTTP backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Proxy URL, e.g. `http://127.0.0.1:7890` or `socks5://...`
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Extra request headers, sent on top of the built-in browser-like set
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Yandex configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YandexConfig {
    /// Search endpoint; point at another region (yandex.ru, ...) to fail over
    #[serde(default = "default_yandex_url")]
    pub base_url: String,
}

/// SauceNAO configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SauceNaoConfig {
    #[serde(default = "default_saucenao_endpoint")]
    pub endpoint: String,
    /// Index to search, 999 = all
    #[serde(default = "default_database")]
    pub database: u32,
}

/// Headless browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_browser_search_url")]
    pub search_url: String,
    /// Chrome/Chromium binary (auto-detected when unset)
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub headless: bool,
    /// How long to wait for the result container after submitting
    #[serde(default = "default_wait")]
    pub wait_seconds: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub selectors: BrowserSelectors,
}

/// CSS selectors for the automated search page
///
/// `title`, `columns`, `source_link` and `thumbnail` are evaluated inside the
/// result container, so every field comes from the same result. Columns are
/// read as rendered text and split into `Label: value` lines; the label, not
/// the column's position, decides which field a value lands in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSelectors {
    pub url_input: String,
    pub file_input: String,
    pub submit: String,
    pub result_container: String,
    pub title: String,
    pub columns: String,
    pub source_link: String,
    pub thumbnail: String,
}

// Default value functions
fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_wait() -> u64 {
    15
}

fn default_poll_interval() -> u64 {
    250
}

fn default_database() -> u32 {
    999
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}

fn default_yandex_url() -> String {
    "https://yandex.com/images/search".to_string()
}

fn default_saucenao_endpoint() -> String {
    "https://saucenao.com/search.php".to_string()
}

fn default_browser_search_url() -> String {
    "https://saucenao.com/".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            timeout_seconds: default_timeout(),
            staging_dir: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
        }
    }
}

impl Default for YandexConfig {
    fn default() -> Self {
        Self {
            base_url: default_yandex_url(),
        }
    }
}

impl Default for SauceNaoConfig {
    fn default() -> Self {
        Self {
            endpoint: default_saucenao_endpoint(),
            database: default_database(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            search_url: default_browser_search_url(),
            executable: None,
            headless: true,
            wait_seconds: default_wait(),
            poll_interval_ms: default_poll_interval(),
            selectors: BrowserSelectors::default(),
        }
    }
}

impl Default for BrowserSelectors {
    fn default() -> Self {
        Self {
            url_input: "input[name='url']".to_string(),
            file_input: "input[type='file']".to_string(),
            submit: "input[type='submit']".to_string(),
            result_container: ".result:not(.hidden) .resulttable".to_string(),
            title: ".resulttablecontent .resulttitle".to_string(),
            columns: ".resulttablecontent .resultcontentcolumn".to_string(),
            source_link: ".resultcontentcolumn a[href]".to_string(),
            thumbnail: ".resultimage img".to_string(),
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl BrowserConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::find_config_path();

        let mut config = if let Some(path) = config_path {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                let content = std::fs::read_to_string(&path)?;
                Self::from_toml_str(&content)?
            } else {
                tracing::info!("Config file not found, using defaults");
                Self::default()
            }
        } else {
            tracing::info!("No config path specified, using defaults");
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Environment values take priority over the file
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(backend) = var("IMAGE_SEARCH_BACKEND") {
            self.search.backend = backend.parse()?;
        }
        if let Some(proxy) = var("IMAGE_SEARCH_PROXY") {
            self.network.proxy = Some(proxy).filter(|p| !p.is_empty());
        }
        if let Some(url) = var("YANDEX_BASE_URL") {
            self.yandex.base_url = url;
        }
        if let Some(timeout) = var("IMAGE_SEARCH_TIMEOUT") {
            self.search.timeout_seconds = timeout
                .parse()
                .map_err(|e| anyhow!("invalid IMAGE_SEARCH_TIMEOUT '{timeout}': {e}"))?;
        }
        Ok(())
    }

    /// Find the configuration file path
    fn find_config_path() -> Option<PathBuf> {
        // 1. Check environment variable
        if let Ok(path) = std::env::var("IMAGE_SEARCH_CONFIG_PATH") {
            return Some(PathBuf::from(path));
        }

        // 2. Check ~/.binks/image-search.toml
        if let Ok(home) = std::env::var("HOME") {
            let path = PathBuf::from(home).join(".binks").join("image-search.toml");
            return Some(path);
        }

        None
    }
}
