use crate::error::HapError;
use serde::Deserialize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Content of the `--log-conf` YAML file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogConf {
    pub filter: Option<String>,
    pub format: LogFormat,
}

impl LogConf {
    pub fn load(path: &Path) -> Result<Self, HapError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HapError::Config(format!("{}: {}", path.display(), e)))?;
        serde_yaml::from_str(&text).map_err(|e| HapError::Config(format!("{}: {}", path.display(), e)))
    }
}

/// `--log` wins over the filter of `--log-conf`, which wins over `RUST_LOG`.
pub fn resolve(log: Option<&str>, conf: Option<&Path>) -> Result<(String, LogFormat), HapError> {
    let conf = match conf {
        Some(path) => LogConf::load(path)?,
        None => LogConf::default(),
    };
    let filter = log
        .map(str::to_string)
        .or(conf.filter)
        .or_else(|| std::env::var(EnvFilter::DEFAULT_ENV).ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());
    Ok((filter, conf.format))
}

/// Installs the global subscriber. A second call keeps the first one.
pub fn init(log: Option<&str>, conf: Option<&Path>) -> Result<(), HapError> {
    let (filter, format) = resolve(log, conf)?;
    let env_filter = EnvFilter::try_new(&filter)
        .map_err(|e| HapError::Config(format!("log filter {:?}: {}", filter, e)))?;
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false);
    let installed = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if installed.is_err() {
        tracing::debug!("[logging] subscriber already installed");
    }
    Ok(())
}
