use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Shell assets cached eagerly at install time.
pub const SHELL_MANIFEST: [&str; 4] = [
    "/",
    "/static/css/style.css",
    "/static/js/app.js",
    "/static/manifest.json",
];

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub poll_interval: Duration,
    /// Unbounded when `None`.
    pub max_poll_duration: Option<Duration>,
    /// How long an error stays on screen before the panel resets.
    pub error_reset_delay: Duration,
    /// Gap between starting a retrieval and resetting the controls.
    pub retrieval_reset_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_poll_duration: None,
            error_reset_delay: Duration::from_secs(3),
            retrieval_reset_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub cache_name: String,
    pub manifest: Vec<String>,
    /// Path prefixes that always go to the network and are never stored.
    pub bypass_prefixes: Vec<String>,
    /// Responses with larger bodies are streamed through and not stored.
    pub max_entry_bytes: usize,
    /// Distinct keys stored at runtime per generation.
    pub max_entries: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3600,
            cache_name: "youtube-downloader-v1".to_owned(),
            manifest: SHELL_MANIFEST.iter().map(|p| p.to_string()).collect(),
            bypass_prefixes: vec!["/api/".to_owned()],
            max_entry_bytes: 8 * 1024 * 1024,
            max_entries: 512,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: Url,
    pub controller: ControllerConfig,
    pub proxy: ProxyConfig,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key)
        .map_err(|_| ())
        .and_then(|string| string.trim().parse::<T>().map_err(|_| ()))
        .ok()
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let backend_url =
            env::var("VIDFETCH_BACKEND").unwrap_or_else(|_| "http://127.0.0.1:5000".to_owned());
        let backend = Url::parse(&backend_url).map_err(|source| ConfigError::InvalidBackend {
            url: backend_url.clone(),
            source,
        })?;

        let mut controller = ControllerConfig::default();
        if let Some(ms) = env_parse::<u64>("VIDFETCH_POLL_INTERVAL_MS").filter(|ms| *ms > 0) {
            controller.poll_interval = Duration::from_millis(ms);
        }
        controller.max_poll_duration =
            env_parse::<u64>("VIDFETCH_MAX_POLL_SECS").map(Duration::from_secs);

        let mut proxy = ProxyConfig::default();
        if let Some(port) = env_parse::<u16>("PORT") {
            proxy.port = port;
        }
        if let Some(bytes) = env_parse::<usize>("VIDFETCH_CACHE_MAX_ENTRY_BYTES") {
            proxy.max_entry_bytes = bytes;
        }
        if let Some(entries) = env_parse::<usize>("VIDFETCH_CACHE_MAX_ENTRIES") {
            proxy.max_entries = entries;
        }
        if let Ok(name) = env::var("VIDFETCH_CACHE_NAME") {
            if !name.trim().is_empty() {
                proxy.cache_name = name.trim().to_owned();
            }
        }

        Ok(Config {
            backend,
            controller,
            proxy,
        })
    }
}
