//! Client configuration.
//!
//! Everything has a sensible default; override specific settings through
//! the builder methods.
//!
//! # Examples
//!
//! ```
//! use atelier_rs::config::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::new("https://api.atelier.example/v1")
//!     .with_timeout(Duration::from_secs(10))
//!     .with_storage_dir("/tmp/atelier-test");
//! assert_eq!(config.timeout, Duration::from_secs(10));
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Default base URL for the hosted Atelier service.
pub const DEFAULT_BASE_URL: &str = "https://api.atelier.art/v1";

/// Default debounce window for search input.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the API client, local storage, and search debouncing.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the remote service, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout for the HTTP client.
    pub timeout: Duration,
    /// Directory for durable local records (session, favorite/saved sets).
    /// Default: `.atelier`.
    pub storage_dir: PathBuf,
    /// Debounce window for search input. Default: 300 ms.
    pub debounce_window: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            storage_dir: PathBuf::from(".atelier"),
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
        }
    }
}

impl ClientConfig {
    /// Config for a specific service base URL with default settings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }
}
