//! Periodic poll / push loop.
//!
//! One cycle: `ensure_connection`, `poll_setup`, then every enabled target in
//! the order hosts, host groups, membership, triggers, events. The outcome
//! decides the next sleep:
//! - success: `pollingIntervalSec`
//! - failure: `on_aborted_poll`, then `retryIntervalSec`
//! - reconfigure (fresh server info pushed mid-cycle): restart at once
//!
//! The sleep waits on the command queue, so a pushed command cuts it short.

use crate::error::{handle_error, HapError};
use crate::hapi::HapiProcessor;
use crate::models::{ArmInfo, Event, Host, HostGroup, HostGroupMembership, MonitoringServerInfo, PolledTriggers};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_STATUS_LOG_INTERVAL: Duration = Duration::from_secs(600);

/// Source-specific collection hooks. Every hook is optional; a `None`
/// result means "nothing to upload for this target".
#[async_trait]
pub trait Collector: Send {
    /// Idempotent; a failure should be a recoverable signal.
    async fn ensure_connection(&mut self, _ms_info: &MonitoringServerInfo) -> Result<(), HapError> {
        Ok(())
    }

    async fn poll_setup(&mut self) -> Result<(), HapError> {
        Ok(())
    }

    async fn poll_hosts(&mut self) -> Result<Option<Vec<Host>>, HapError> {
        Ok(None)
    }

    async fn poll_host_groups(&mut self) -> Result<Option<Vec<HostGroup>>, HapError> {
        Ok(None)
    }

    async fn poll_host_group_membership(&mut self) -> Result<Option<Vec<HostGroupMembership>>, HapError> {
        Ok(None)
    }

    async fn poll_triggers(&mut self) -> Result<Option<PolledTriggers>, HapError> {
        Ok(None)
    }

    /// `last_info` is the event cursor the server already holds.
    async fn poll_events(&mut self, _last_info: Option<&str>) -> Result<Option<Vec<Event>>, HapError> {
        Ok(None)
    }

    /// Called once after a failed cycle; typically drops cached connections.
    async fn on_aborted_poll(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTarget {
    Hosts,
    HostGroups,
    HostGroupMembership,
    Triggers,
    Events,
}

impl PollTarget {
    pub const ALL: [PollTarget; 5] = [
        PollTarget::Hosts,
        PollTarget::HostGroups,
        PollTarget::HostGroupMembership,
        PollTarget::Triggers,
        PollTarget::Events,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PollTarget::Hosts => "hosts",
            PollTarget::HostGroups => "host_groups",
            PollTarget::HostGroupMembership => "host_group_membership",
            PollTarget::Triggers => "triggers",
            PollTarget::Events => "events",
        }
    }

    pub fn from_name(name: &str) -> Option<PollTarget> {
        PollTarget::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Enabled targets in poll order; unknown names are logged and skipped.
    pub fn select(names: Option<&[String]>) -> Vec<PollTarget> {
        let Some(names) = names else {
            return PollTarget::ALL.to_vec();
        };
        for name in names {
            if PollTarget::from_name(name).is_none() {
                warn!("[poller] unknown polling target {}, ignored", name);
            }
        }
        PollTarget::ALL
            .iter()
            .copied()
            .filter(|t| names.iter().any(|n| n == t.name()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum PollerCommand {
    UpdateMonitoringServerInfo(Arc<MonitoringServerInfo>),
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Success,
    Failure(String),
    Reconfigure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleResult {
    Sleep(Duration),
    Restart,
}

pub struct BasePoller {
    collector: Box<dyn Collector>,
    hapi: HapiProcessor,
    commands: mpsc::UnboundedReceiver<PollerCommand>,
    targets: Vec<PollTarget>,
    arm_info: ArmInfo,
    ms_info: Option<Arc<MonitoringServerInfo>>,
    status_log_interval: Duration,
    last_status_log: Option<Instant>,
    terminated: bool,
}

impl BasePoller {
    pub fn new(
        collector: Box<dyn Collector>,
        hapi: HapiProcessor,
        commands: mpsc::UnboundedReceiver<PollerCommand>,
        targets: Option<&[String]>,
    ) -> Self {
        let ms_info = hapi.ms_info();
        Self {
            collector,
            hapi,
            commands,
            targets: PollTarget::select(targets),
            arm_info: ArmInfo::default(),
            ms_info,
            status_log_interval: DEFAULT_STATUS_LOG_INTERVAL,
            last_status_log: None,
            terminated: false,
        }
    }

    pub fn set_status_log_interval(&mut self, interval: Duration) {
        self.status_log_interval = interval;
    }

    pub fn targets(&self) -> &[PollTarget] {
        &self.targets
    }

    pub fn arm_info(&self) -> &ArmInfo {
        &self.arm_info
    }

    /// Returns `false` when the poller must stop.
    fn apply(&mut self, command: PollerCommand) -> bool {
        match command {
            PollerCommand::UpdateMonitoringServerInfo(info) => {
                info!(
                    "[poller] monitoring server info: polling {}s, retry {}s",
                    info.polling_interval_sec, info.retry_interval_sec
                );
                self.hapi.set_ms_info(info.clone());
                self.ms_info = Some(info);
                true
            }
            PollerCommand::Terminate => {
                self.terminated = true;
                false
            }
        }
    }

    /// Applies every queued command; `false` when the poller must stop.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if !self.apply(command) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return !self.terminated,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// True when a command arrived since the cycle started.
    fn reconfigure_pending(&mut self) -> bool {
        match self.commands.try_recv() {
            Ok(command) => {
                self.apply(command);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.terminated = true;
                true
            }
        }
    }

    /// Runs until `Terminate` or until the command queue closes.
    pub async fn run(mut self) -> Result<(), HapError> {
        info!("[poller] started, targets {:?}", self.targets);
        while self.ms_info.is_none() {
            match self.commands.recv().await {
                Some(command) => {
                    if !self.apply(command) {
                        return Ok(());
                    }
                }
                None => return Ok(()),
            }
        }

        loop {
            if !self.drain_commands() {
                break;
            }
            match self.run_cycle().await? {
                CycleResult::Restart => debug!("[poller] restarting cycle"),
                CycleResult::Sleep(duration) => {
                    if !self.sleep(duration).await {
                        break;
                    }
                }
            }
        }
        info!("[poller] stopped");
        Ok(())
    }

    async fn sleep(&mut self, duration: Duration) -> bool {
        match tokio::time::timeout(duration, self.commands.recv()).await {
            Err(_) => true,
            Ok(Some(command)) => self.apply(command),
            Ok(None) => false,
        }
    }

    /// One poll plus its bookkeeping.
    pub async fn run_cycle(&mut self) -> Result<CycleResult, HapError> {
        let ms_info = self
            .ms_info
            .clone()
            .ok_or_else(|| HapError::recoverable("no monitoring server info yet"))?;

        let outcome = self.poll(&ms_info).await?;
        let sleep = match outcome {
            PollOutcome::Reconfigure => return Ok(CycleResult::Restart),
            PollOutcome::Success => {
                self.arm_info.success();
                Duration::from_secs(ms_info.polling_interval_sec)
            }
            PollOutcome::Failure(reason) => {
                self.collector.on_aborted_poll().await;
                self.arm_info.fail(reason);
                Duration::from_secs(ms_info.retry_interval_sec)
            }
        };

        if let Err(e) = self.hapi.put_arm_info(&self.arm_info).await {
            warn!("[poller] putArmInfo failed: {}", e);
        }
        self.log_status();
        Ok(CycleResult::Sleep(sleep))
    }

    /// Critical signals escape; anything else becomes a failed outcome.
    pub async fn poll(&mut self, ms_info: &MonitoringServerInfo) -> Result<PollOutcome, HapError> {
        match self.poll_targets(ms_info).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_critical() => {
                handle_error("poller", &e);
                Err(e)
            }
            Err(e) => {
                handle_error("poller", &e);
                Ok(PollOutcome::Failure(e.to_string()))
            }
        }
    }

    async fn poll_targets(&mut self, ms_info: &MonitoringServerInfo) -> Result<PollOutcome, HapError> {
        self.collector.ensure_connection(ms_info).await?;
        self.collector.poll_setup().await?;
        for target in self.targets.clone() {
            if self.reconfigure_pending() {
                return Ok(PollOutcome::Reconfigure);
            }
            self.poll_target(target).await?;
        }
        if self.reconfigure_pending() {
            return Ok(PollOutcome::Reconfigure);
        }
        Ok(PollOutcome::Success)
    }

    async fn poll_target(&mut self, target: PollTarget) -> Result<(), HapError> {
        match target {
            PollTarget::Hosts => {
                if let Some(hosts) = self.collector.poll_hosts().await? {
                    self.hapi.put_hosts(hosts).await?;
                }
            }
            PollTarget::HostGroups => {
                if let Some(groups) = self.collector.poll_host_groups().await? {
                    self.hapi.put_host_groups(groups).await?;
                }
            }
            PollTarget::HostGroupMembership => {
                if let Some(membership) = self.collector.poll_host_group_membership().await? {
                    self.hapi.put_host_group_membership(membership).await?;
                }
            }
            PollTarget::Triggers => {
                if let Some(polled) = self.collector.poll_triggers().await? {
                    self.hapi
                        .put_triggers(&polled.triggers, polled.update_type, polled.last_info.as_deref(), None)
                        .await?;
                }
            }
            PollTarget::Events => {
                let last_info = self.hapi.get_cached_event_last_info().await?;
                if let Some(events) = self.collector.poll_events(last_info.as_deref()).await? {
                    self.hapi.put_events(&events, None, None).await?;
                }
            }
        }
        Ok(())
    }

    fn log_status(&mut self) {
        let due = self
            .last_status_log
            .map(|at| at.elapsed() >= self.status_log_interval)
            .unwrap_or(true);
        if !due {
            return;
        }
        info!(
            "[poller] arm status {:?}: {} ok / {} failed, last failure: {}",
            self.arm_info.last_status,
            self.arm_info.num_success,
            self.arm_info.num_failure,
            self.arm_info.failure_reason
        );
        self.last_status_log = Some(Instant::now());
    }
}
