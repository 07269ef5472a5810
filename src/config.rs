//! Server configuration.
//!
//! Loaded from an optional YAML file and the `LISTEN` environment override.
//! Components never read the environment themselves; they receive the
//! sections below as plain values.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable naming the YAML configuration file.
pub const CONFIG_ENV: &str = "WARDEN_CONFIG";

/// Environment variable overriding `server.host` and `server.port`.
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub connection: ConnectionConfig,
    pub pool: PoolConfig,
    pub logging: LoggingConfig,
}

/// Listening socket settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Pending-accept queue length handed to `listen(2)`.
    pub backlog: u32,
    /// Enables SO_REUSEADDR so a restarted server can rebind immediately.
    pub development_mode: bool,
    /// Product identifier sent in the `server` response header.
    pub name: String,
}

/// Per-connection limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub idle_timeout_secs: f64,
    pub max_requests: usize,
}

/// Worker pool sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections that may run concurrently.
    pub workers: usize,
    /// Connections that may be running or queued at once.
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            backlog: 250,
            development_mode: true,
            name: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 10.0,
            max_requests: 8,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 32,
            capacity: 96,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
        }
    }
}

impl ServerConfig {
    /// `host:port` as a single string.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ConnectionConfig {
    /// `idle_timeout_secs` as a `Duration`; fails on values it cannot hold.
    pub fn idle_timeout(&self) -> Result<Duration> {
        let secs = self.idle_timeout_secs;
        if secs <= 0.0 {
            anyhow::bail!("connection.idle_timeout_secs must be positive, got {secs}");
        }
        Duration::try_from_secs_f64(secs)
            .with_context(|| format!("connection.idle_timeout_secs out of range: {secs}"))
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// Reads the file named by `WARDEN_CONFIG` when set, otherwise starts
    /// from defaults, then applies the `LISTEN` override.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).ok();
        let listen = std::env::var(LISTEN_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new), listen.as_deref())
    }

    /// Same as [`Config::load`] with the environment values passed in.
    pub fn load_from(path: Option<&Path>, listen: Option<&str>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(listen) = listen {
            cfg.apply_listen(listen)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(raw)?;
        Ok(cfg)
    }

    fn apply_listen(&mut self, listen: &str) -> Result<()> {
        let (host, port) = listen
            .rsplit_once(':')
            .with_context(|| format!("{LISTEN_ENV} must be host:port, got {listen:?}"))?;
        self.server.port = port
            .parse()
            .with_context(|| format!("invalid port in {LISTEN_ENV}: {port:?}"))?;
        self.server.host = host.to_string();
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool.workers == 0 {
            anyhow::bail!("pool.workers must be at least 1");
        }
        if self.pool.capacity < self.pool.workers {
            anyhow::bail!(
                "pool.capacity ({}) must be >= pool.workers ({})",
                self.pool.capacity,
                self.pool.workers
            );
        }
        if self.connection.max_requests == 0 {
            anyhow::bail!("connection.max_requests must be at least 1");
        }
        self.connection.idle_timeout()?;
        Ok(())
    }
}
