use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Deserializer, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::RetryPolicy;

/// Config file read from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "printbridge.toml";

/// Prefix for environment overrides, e.g. `BRIDGE_PORT=3200`.
pub const ENV_PREFIX: &str = "BRIDGE_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub bind_address: IpAddr,
    /// Origins allowed to call the bridge from a browser. `*` allows any.
    #[serde(deserialize_with = "origin_list")]
    pub allowed_origins: Vec<String>,
    pub connection_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub probe_timeout_ms: u64,
    pub job_retention_secs: u64,
    pub sweep_interval_secs: u64,
    /// Print to an in-process simulator instead of real sockets.
    pub simulation: bool,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3100,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            allowed_origins: vec!["*".to_string()],
            connection_timeout_ms: 5000,
            max_retries: 3,
            retry_delay_ms: 1000,
            probe_timeout_ms: 2000,
            job_retention_secs: 3600,
            sweep_interval_secs: 60,
            simulation: false,
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Load configuration, lowest to highest precedence: built-in defaults,
    /// TOML file, `BRIDGE_*` environment variables, then `overrides`
    /// (typically CLI flags serialized with `None` fields skipped).
    pub fn new<T: Serialize>(config_path: Option<&Path>, overrides: Option<&T>) -> Result<Self> {
        let path = match config_path {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => PathBuf::from(DEFAULT_CONFIG_PATH),
        };

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: AppConfig = figment
            .extract()
            .with_context(|| format!("Failed to load configuration ({})", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            bail!("max_retries must be at least 1");
        }
        if self.connection_timeout_ms == 0 {
            bail!("connection_timeout_ms must be greater than zero");
        }
        if self.probe_timeout_ms == 0 {
            bail!("probe_timeout_ms must be greater than zero");
        }
        if self.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be greater than zero");
        }
        if self.allowed_origins.is_empty() {
            bail!("allowed_origins must list at least one origin (use \"*\" for any)");
        }
        let worst_case = self.retry_policy().worst_case_duration();
        if self.job_retention() < worst_case {
            bail!(
                "job_retention_secs must cover the worst-case delivery time ({}ms)",
                worst_case.as_millis()
            );
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            timeout: Duration::from_millis(self.connection_timeout_ms),
            base_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Accept either a list or a single comma separated string.
fn origin_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let raw = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => s.split(',').map(str::to_string).collect(),
        OneOrMany::Many(v) => v,
    };
    Ok(raw
        .into_iter()
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
