use serde::{Deserialize, Serialize};
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Env var naming an optional JSON config file.
pub const CONFIG_ENV_VAR: &str = "WAIT_FOR_PORT_CONFIG";

/// Tunable policy for the wait loop and the prober.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WaitConfig {
    /// Delay between two consecutive probes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound for a single connect attempt. The overall deadline still applies.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_connect_timeout_ms() -> u64 {
    60_000
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl WaitConfig {
    /// Load from the file named by `WAIT_FOR_PORT_CONFIG`, or use the defaults when unset.
    pub async fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.is_empty() => Self::load(&path).await,
            _ => Ok(Self::default()),
        }
    }

    pub async fn load(file_path: impl AsRef<Path>) -> Result<Self> {
        let file_path = file_path.as_ref();
        if !file_path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", file_path.display()));
        }

        let content = fs::read_to_string(file_path)
            .await
            .with_context(|| format!("reading config file {}", file_path.display()))?;
        let config: WaitConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config file {}", file_path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("poll_interval_ms must be greater than zero"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(anyhow::anyhow!("connect_timeout_ms must be greater than zero"));
        }
        self.tracing_level().map(|_| ())
    }

    /// The configured level; `warning` is accepted as an alias of `warn`.
    pub fn tracing_level(&self) -> Result<tracing::Level> {
        let name = self.log_level.trim();
        let name = if name.eq_ignore_ascii_case("warning") { "warn" } else { name };
        name.parse::<tracing::Level>().map_err(|_| {
            anyhow::anyhow!(
                "invalid log level {:?}, expected trace, debug, info, warn or error",
                self.log_level
            )
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
