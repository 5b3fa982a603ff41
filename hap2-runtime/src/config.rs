//! Command line, config file and environment, merged into one [`HapConfig`].
//!
//! Precedence: command line flag, then environment, then the YAML file
//! named by `--config`, then built-in defaults. The broker password is the
//! exception: `HAP2_BROKER_PASSWORD` wins over `--password`.

use crate::error::HapError;
use crate::hapi::DEFAULT_RESPONSE_TIMEOUT;
use crate::poller::DEFAULT_STATUS_LOG_INTERVAL;
use crate::transporter::TransporterArgs;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PASSWORD_ENV: &str = "HAP2_BROKER_PASSWORD";
pub const DEFAULT_TRANSPORTER: &str = "mqtt";
pub const DEFAULT_ERROR_SLEEP_TIME: Duration = Duration::from_secs(10);

#[derive(Parser, Debug, Clone, Default)]
#[command(version, about = "HAP2 plugin")]
pub struct Cli {
    /// YAML configuration file; keys mirror the long flag names
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(short = 'p', long)]
    pub disable_poller: bool,

    /// hosts host_groups host_group_membership triggers events
    #[arg(long, num_args = 1..)]
    pub polling_targets: Option<Vec<String>>,

    /// Seconds between two poller status lines
    #[arg(long)]
    pub status_log_interval: Option<u64>,

    /// Registered transporter name (mqtt, memory)
    #[arg(long)]
    pub transporter: Option<String>,

    /// Seconds to wait for each server response
    #[arg(long)]
    pub response_timeout: Option<u64>,

    /// Seconds to wait before rebuilding a failed pipeline
    #[arg(long)]
    pub error_sleep_time: Option<u64>,

    #[arg(long)]
    pub broker: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub queue: Option<String>,

    #[arg(long)]
    pub client_id: Option<String>,

    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    #[arg(long)]
    pub ssl_ca_cert: Option<PathBuf>,

    #[arg(long)]
    pub ssl_client_cert: Option<PathBuf>,

    #[arg(long)]
    pub ssl_client_key: Option<PathBuf>,

    /// Largest message the transporter may send, in bytes
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// tracing filter, e.g. `info` or `hap2_runtime=debug`
    #[arg(long)]
    pub log: Option<String>,

    /// YAML logging configuration: `{filter, format: compact|json}`
    #[arg(long)]
    pub log_conf: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FileConfig {
    pub disable_poller: Option<bool>,
    pub polling_targets: Option<Vec<String>>,
    pub status_log_interval: Option<u64>,
    pub transporter: Option<String>,
    pub response_timeout: Option<u64>,
    pub error_sleep_time: Option<u64>,
    pub broker: Option<String>,
    pub port: Option<u16>,
    pub queue: Option<String>,
    pub client_id: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssl_ca_cert: Option<PathBuf>,
    pub ssl_client_cert: Option<PathBuf>,
    pub ssl_client_key: Option<PathBuf>,
    pub max_message_size: Option<usize>,
    pub log: Option<String>,
    pub log_conf: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, HapError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HapError::Config(format!("{}: {}", path.display(), e)))?;
        serde_yaml::from_str(&text).map_err(|e| HapError::Config(format!("{}: {}", path.display(), e)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HapConfig {
    pub disable_poller: bool,
    pub polling_targets: Option<Vec<String>>,
    pub status_log_interval: Duration,
    pub transporter: String,
    pub response_timeout: Duration,
    pub error_sleep_time: Duration,
    pub transporter_args: TransporterArgs,
    pub log: Option<String>,
    pub log_conf: Option<PathBuf>,
}

impl Default for HapConfig {
    fn default() -> Self {
        Self {
            disable_poller: false,
            polling_targets: None,
            status_log_interval: DEFAULT_STATUS_LOG_INTERVAL,
            transporter: DEFAULT_TRANSPORTER.to_string(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            error_sleep_time: DEFAULT_ERROR_SLEEP_TIME,
            transporter_args: TransporterArgs::default(),
            log: None,
            log_conf: None,
        }
    }
}

impl HapConfig {
    /// Resolves `cli` against the environment and the config file.
    pub fn resolve(cli: Cli) -> Result<Self, HapError> {
        Self::resolve_with(cli, std::env::var(PASSWORD_ENV).ok())
    }

    pub fn resolve_with(cli: Cli, env_password: Option<String>) -> Result<Self, HapError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        let defaults = HapConfig::default();
        let args = defaults.transporter_args.clone();

        let transporter_args = TransporterArgs {
            broker: cli.broker.or(file.broker).unwrap_or(args.broker),
            port: cli.port.or(file.port).unwrap_or(args.port),
            queue: cli.queue.or(file.queue).unwrap_or(args.queue),
            client_id: cli.client_id.or(file.client_id),
            user: cli.user.or(file.user),
            password: env_password.or(cli.password).or(file.password),
            ssl_ca_cert: cli.ssl_ca_cert.or(file.ssl_ca_cert),
            ssl_client_cert: cli.ssl_client_cert.or(file.ssl_client_cert),
            ssl_client_key: cli.ssl_client_key.or(file.ssl_client_key),
            max_message_size: cli
                .max_message_size
                .or(file.max_message_size)
                .unwrap_or(args.max_message_size),
        };
        if transporter_args.max_message_size == 0 {
            return Err(HapError::Config("max-message-size must be positive".to_string()));
        }

        let secs = |cli: Option<u64>, file: Option<u64>, default: Duration| {
            cli.or(file).map(Duration::from_secs).unwrap_or(default)
        };

        Ok(Self {
            disable_poller: cli.disable_poller || file.disable_poller.unwrap_or(false),
            polling_targets: cli.polling_targets.or(file.polling_targets),
            status_log_interval: secs(cli.status_log_interval, file.status_log_interval, defaults.status_log_interval),
            transporter: cli.transporter.or(file.transporter).unwrap_or(defaults.transporter),
            response_timeout: secs(cli.response_timeout, file.response_timeout, defaults.response_timeout),
            error_sleep_time: secs(cli.error_sleep_time, file.error_sleep_time, defaults.error_sleep_time),
            transporter_args,
            log: cli.log.or(file.log),
            log_conf: cli.log_conf.or(file.log_conf),
        })
    }
}
