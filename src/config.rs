//! Server configuration from `ROOMLEDGER_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::notify::DEFAULT_CHANNEL_CAPACITY;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid value")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub max_connections: usize,
    /// Prometheus exporter port; disabled when unset.
    pub metrics_port: Option<u16>,
    /// How long shutdown waits for open connections.
    pub drain: Duration,
    /// Per-channel capacity for LISTEN fan-out and per-connection event queues.
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5434,
            max_connections: 256,
            metrics_port: None,
            drain: Duration::from_secs(10),
            event_buffer: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; missing variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let drain_secs = parse(&lookup, "ROOMLEDGER_DRAIN_SECS")?;
        Ok(Self {
            bind: lookup("ROOMLEDGER_BIND").unwrap_or(defaults.bind),
            port: parse(&lookup, "ROOMLEDGER_PORT")?.unwrap_or(defaults.port),
            max_connections: parse(&lookup, "ROOMLEDGER_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            metrics_port: parse(&lookup, "ROOMLEDGER_METRICS_PORT")?,
            drain: drain_secs.map_or(defaults.drain, Duration::from_secs),
            event_buffer: parse(&lookup, "ROOMLEDGER_EVENT_BUFFER")?
                .unwrap_or(defaults.event_buffer),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
