//! Service configuration loaded from `~/.config/streamtap/config.toml`.
//!
//! Every field has a default, so an absent file (or an absent section)
//! yields a working configuration. CLI flags are applied on top by the
//! binary.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub fast: FastConfig,
    pub render: RenderConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a resolved manifest URL.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FastConfig {
    /// Page fetch timeout.
    pub timeout_secs: u64,
}

impl Default for FastConfig {
    fn default() -> Self {
        Self { timeout_secs: 15 }
    }
}

impl FastConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Rendered extraction tuning. The timing values are heuristics, not
/// protocol constants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Disable the rendered tier entirely.
    pub enabled: bool,
    /// Browser executable. Discovered on `PATH` when unset.
    pub browser: Option<PathBuf>,
    /// Time allowed for the browser to start and print its DevTools endpoint.
    pub launch_timeout_secs: u64,
    /// Time allowed for each DevTools setup command.
    pub command_timeout_secs: u64,
    /// Upper bound for navigation (load event + network idle).
    pub navigation_timeout_secs: u64,
    /// Extra observation time after navigation completes.
    pub settle_ms: u64,
    /// Quiet period that counts as network idle.
    pub idle_ms: u64,
    /// In-flight requests tolerated while still counting as idle.
    pub idle_max_inflight: usize,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            browser: None,
            launch_timeout_secs: 20,
            command_timeout_secs: 10,
            navigation_timeout_secs: 45,
            settle_ms: 3000,
            idle_ms: 500,
            idle_max_inflight: 2,
            viewport_width: 1920,
            viewport_height: 1080,
        }
    }
}

impl RenderConfig {
    #[must_use]
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    #[must_use]
    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Time allowed for the upstream manifest response to arrive.
    pub timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self { timeout_secs: 20 }
    }
}

impl ProxyConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location when
    /// `path` is `None`.
    ///
    /// A missing default file is not an error. An explicitly requested
    /// file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_path(), false),
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        Self::from_toml(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Return the path to the default config file.
fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("streamtap")
        .join("config.toml")
}
