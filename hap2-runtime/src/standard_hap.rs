//! Composition root and supervisor of a HAP2 plugin.
//!
//! [`StandardHap`] builds the main plugin, spawns dispatcher / receiver /
//! poller as supervised tasks, performs the handshake and runs the main
//! dispatch loop. A child task ending, or any recoverable error, tears the
//! whole pipeline down and rebuilds it after `error_sleep_time`.

use crate::config::{Cli, HapConfig};
use crate::error::{handle_error, HapError};
use crate::plugin::{BaseMainPlugin, MainPluginHandler, TaskFuture};
use crate::poller::{BasePoller, Collector, PollerCommand};
use crate::protocol::Component;
use crate::logging;
use crate::transporter::{Transporter, TransporterManager};
use clap::Parser;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

/// What a concrete plugin provides to [`StandardHap`].
pub trait HapPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn create_main_handler(&self) -> Box<dyn MainPluginHandler>;

    /// `None` for plugins that only answer fetches.
    fn create_collector(&self) -> Option<Box<dyn Collector>> {
        None
    }
}

type ChildExit = (&'static str, Result<(), HapError>);

pub struct StandardHap<P: HapPlugin> {
    plugin: P,
    config: HapConfig,
    transporters: TransporterManager,
}

impl<P: HapPlugin> StandardHap<P> {
    pub fn new(plugin: P, config: HapConfig) -> Self {
        Self { plugin, config, transporters: TransporterManager::with_defaults() }
    }

    pub fn with_transporters(mut self, transporters: TransporterManager) -> Self {
        self.transporters = transporters;
        self
    }

    pub fn config(&self) -> &HapConfig {
        &self.config
    }

    /// Resolves the configured transporter and runs until SIGTERM / SIGINT.
    pub async fn run(&self) -> i32 {
        let transporter = match self.transporters.create(&self.config.transporter) {
            Ok(transporter) => transporter,
            Err(e) => {
                error!("[hap] {} (registered: {:?})", e, self.transporters.names());
                return EXIT_FAILURE;
            }
        };
        self.run_with(transporter, shutdown_signal()).await
    }

    /// Supervises the pipeline on `transporter` until `shutdown` resolves,
    /// the main loop is told to terminate, or a critical signal occurs.
    pub async fn run_with<F>(&self, transporter: Arc<dyn Transporter>, shutdown: F) -> i32
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let outcome = tokio::select! {
                result = self.run_pipeline(transporter.clone()) => result,
                _ = &mut shutdown => {
                    info!("[hap] shutdown requested");
                    Ok(())
                }
            };
            if let Err(e) = transporter.close().await {
                warn!("[hap] closing transporter: {}", e);
            }

            let err = match outcome {
                Ok(()) => {
                    info!("[hap] {} stopped", self.plugin.name());
                    return EXIT_OK;
                }
                Err(e) => e,
            };
            handle_error("hap", &err);
            if err.is_critical() {
                return EXIT_FAILURE;
            }

            info!("[hap] restarting in {:?}", self.config.error_sleep_time);
            tokio::select! {
                _ = tokio::time::sleep(self.config.error_sleep_time) => {}
                _ = &mut shutdown => {
                    info!("[hap] shutdown requested");
                    return EXIT_OK;
                }
            }
        }
    }

    async fn run_pipeline(&self, transporter: Arc<dyn Transporter>) -> Result<(), HapError> {
        let mut main = BaseMainPlugin::new(self.plugin.name(), self.plugin.create_main_handler());
        main.setup(transporter, &self.config.transporter_args).await?;
        main.hapi()?.set_response_timeout(self.config.response_timeout);

        let mut children: JoinSet<ChildExit> = JoinSet::new();
        spawn_child(&mut children, "dispatcher", main.start_dispatcher()?);
        spawn_child(&mut children, "receiver", main.start_receiver()?);

        let poller_tx = match self.create_poller(&main)? {
            Some((poller, tx)) => {
                spawn_child(&mut children, "poller", Box::pin(poller.run()));
                Some(tx)
            }
            None => None,
        };

        let serve = async {
            main.exchange_profile().await?;
            let info = main.get_monitoring_server_info().await?;
            if let Some(tx) = poller_tx {
                tx.send(PollerCommand::UpdateMonitoringServerInfo(info))
                    .map_err(|_| HapError::ChannelClosed("poller commands"))?;
                main.set_monitoring_server_info_callback(Box::new(move |info| {
                    if tx.send(PollerCommand::UpdateMonitoringServerInfo(info)).is_err() {
                        warn!("[hap] poller is gone, server info not forwarded");
                    }
                }));
            }
            main.run().await
        };

        tokio::select! {
            result = serve => result,
            Some(exit) = children.join_next() => Err(child_exit(exit)),
        }
    }

    fn create_poller(
        &self,
        main: &BaseMainPlugin,
    ) -> Result<Option<(BasePoller, mpsc::UnboundedSender<PollerCommand>)>, HapError> {
        if self.config.disable_poller {
            info!("[hap] poller disabled");
            return Ok(None);
        }
        let Some(collector) = self.plugin.create_collector() else {
            return Ok(None);
        };
        let mut hapi = main.create_hapi(Component::Poller)?;
        hapi.set_response_timeout(self.config.response_timeout);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut poller = BasePoller::new(collector, hapi, rx, self.config.polling_targets.as_deref());
        poller.set_status_log_interval(self.config.status_log_interval);
        Ok(Some((poller, tx)))
    }
}

fn spawn_child(children: &mut JoinSet<ChildExit>, name: &'static str, task: TaskFuture) {
    children.spawn(async move { (name, task.await) });
}

/// Any child ending is a reason to rebuild the pipeline.
fn child_exit(exit: Result<ChildExit, JoinError>) -> HapError {
    match exit {
        Ok((name, Ok(()))) => HapError::recoverable(format!("{} exited", name)),
        Ok((_, Err(e))) if e.is_critical() => e,
        Ok((name, Err(e))) => HapError::recoverable(format!("{} failed: {}", name, e)),
        Err(e) => HapError::recoverable(format!("child task aborted: {}", e)),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = term.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                warn!("[hap] cannot install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Process entry point: `.env`, command line, logging, then [`StandardHap::run`].
///
/// Returns the process exit code.
pub async fn launch<P: HapPlugin>(plugin: P) -> i32 {
    dotenvy::dotenv().ok();
    let config = match HapConfig::resolve(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[hap] {}", e);
            return EXIT_FAILURE;
        }
    };
    if let Err(e) = logging::init(config.log.as_deref(), config.log_conf.as_deref()) {
        eprintln!("[hap] {}", e);
        return EXIT_FAILURE;
    }
    info!("[hap] starting {} with transporter {}", plugin.name(), config.transporter);
    StandardHap::new(plugin, config).run().await
}
