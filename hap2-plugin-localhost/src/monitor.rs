//! State of the monitored machine, shared by the poller and the fetch handler.
//!
//! Each refresh takes one [`Sample`], appends it to the item history and
//! re-evaluates the threshold triggers. A trigger changing status produces an
//! event; events get their ids when first handed out, numbered upward from
//! the server's event cursor, and are handed out again until the cursor
//! reaches them.

use crate::probe::{Probe, Sample};
use hap2_runtime::hapi_time;
use hap2_runtime::models::{Direction, Event, HistorySample, Host, HostGroup, HostGroupMembership, Item, Trigger};
use hap2_runtime::HapError;
use std::collections::VecDeque;

pub const GROUP_ID: &str = "1";
pub const GROUP_NAME: &str = "Local machines";
pub const HISTORY_DEPTH: usize = 720;
pub const EVENT_LOG_DEPTH: usize = 1000;

const STATUS_UNKNOWN: &str = "UNKNOWN";
const STATUS_OK: &str = "OK";
const STATUS_NG: &str = "NG";

struct Metric {
    item_id: &'static str,
    trigger_id: &'static str,
    brief: &'static str,
    threshold: f32,
    read: fn(&Sample) -> f32,
}

const METRICS: [Metric; 2] = [
    Metric {
        item_id: "cpu.usage",
        trigger_id: "cpu.high",
        brief: "CPU usage",
        threshold: 0.9,
        read: cpu_ratio,
    },
    Metric {
        item_id: "memory.usage",
        trigger_id: "memory.high",
        brief: "Memory usage",
        threshold: 0.9,
        read: ram_ratio,
    },
];

struct MetricState {
    history: VecDeque<HistorySample>,
    status: &'static str,
    last_change_time: String,
}

pub struct Monitor {
    probe: Box<dyn Probe>,
    host: Host,
    metrics: Vec<MetricState>,
    events: VecDeque<Event>,
    pending: Vec<Event>,
    unconfirmed: Vec<Event>,
    next_event_id: u64,
}

impl Monitor {
    pub fn new(probe: Box<dyn Probe>) -> Self {
        let name = probe.host_name();
        let started = hapi_time::now();
        let metrics = METRICS
            .iter()
            .map(|_| MetricState {
                history: VecDeque::new(),
                status: STATUS_UNKNOWN,
                last_change_time: started.clone(),
            })
            .collect();
        Self {
            probe,
            host: Host { host_id: name.clone(), host_name: name },
            metrics,
            events: VecDeque::new(),
            pending: Vec::new(),
            unconfirmed: Vec::new(),
            next_event_id: 1,
        }
    }

    pub fn host(&self) -> Host {
        self.host.clone()
    }

    pub fn host_group(&self) -> HostGroup {
        HostGroup { group_id: GROUP_ID.to_string(), group_name: GROUP_NAME.to_string() }
    }

    pub fn membership(&self) -> HostGroupMembership {
        HostGroupMembership { host_id: self.host.host_id.clone(), group_ids: vec![GROUP_ID.to_string()] }
    }

    pub fn has_samples(&self) -> bool {
        self.metrics.iter().any(|state| !state.history.is_empty())
    }

    /// Drops the events the server already holds and numbers new ones after its cursor.
    fn resume_after(&mut self, last_info: Option<&str>) {
        let Some(last) = last_info.and_then(|s| s.parse::<u64>().ok()) else {
            return;
        };
        self.unconfirmed.retain(|event| event_number(event) > last);
        self.next_event_id = self.next_event_id.max(last.saturating_add(1));
    }

    pub fn refresh(&mut self) {
        let sample = self.probe.sample();
        let time = hapi_time::now();

        for (metric, state) in METRICS.iter().zip(self.metrics.iter_mut()) {
            let value = (metric.read)(&sample);
            state.history.push_back(HistorySample { value: percent(value), time: time.clone() });
            if state.history.len() > HISTORY_DEPTH {
                state.history.pop_front();
            }

            let status = if value >= metric.threshold { STATUS_NG } else { STATUS_OK };
            if status == state.status {
                continue;
            }
            let previous = std::mem::replace(&mut state.status, status);
            state.last_change_time = time.clone();
            if previous == STATUS_UNKNOWN && status == STATUS_OK {
                continue;
            }

            self.pending.push(Event {
                event_id: String::new(),
                time: time.clone(),
                event_type: if status == STATUS_NG { "BAD" } else { "GOOD" }.to_string(),
                trigger_id: metric.trigger_id.to_string(),
                status: status.to_string(),
                severity: "WARNING".to_string(),
                host_id: self.host.host_id.clone(),
                host_name: self.host.host_name.clone(),
                brief: format!("{} {}%", metric.brief, percent(value)),
                extended_info: String::new(),
            });
        }
    }

    /// Events the server has not confirmed yet: those handed out earlier
    /// with an id above `last_info`, then the ones produced since the last
    /// call, numbered after the cursor and copied to the event log.
    pub fn take_pending_events(&mut self, last_info: Option<&str>) -> Vec<Event> {
        self.resume_after(last_info);
        for mut event in std::mem::take(&mut self.pending) {
            event.event_id = self.next_event_id.to_string();
            self.next_event_id = self.next_event_id.saturating_add(1);
            self.events.push_back(event.clone());
            self.unconfirmed.push(event);
        }
        while self.events.len() > EVENT_LOG_DEPTH {
            self.events.pop_front();
        }
        if self.unconfirmed.len() > EVENT_LOG_DEPTH {
            let excess = self.unconfirmed.len() - EVENT_LOG_DEPTH;
            self.unconfirmed.drain(..excess);
        }
        self.unconfirmed.clone()
    }

    pub fn triggers(&self) -> Vec<Trigger> {
        METRICS
            .iter()
            .zip(&self.metrics)
            .map(|(metric, state)| Trigger {
                trigger_id: metric.trigger_id.to_string(),
                status: state.status.to_string(),
                severity: "WARNING".to_string(),
                last_change_time: state.last_change_time.clone(),
                host_id: self.host.host_id.clone(),
                host_name: self.host.host_name.clone(),
                brief: format!("{} above {}%", metric.brief, percent(metric.threshold)),
                extended_info: String::new(),
            })
            .collect()
    }

    pub fn items(&self) -> Vec<Item> {
        METRICS
            .iter()
            .zip(&self.metrics)
            .map(|(metric, state)| {
                let last = state.history.back();
                Item {
                    item_id: metric.item_id.to_string(),
                    host_id: self.host.host_id.clone(),
                    brief: metric.brief.to_string(),
                    last_value_time: last.map(|s| s.time.clone()).unwrap_or_default(),
                    last_value: last.map(|s| s.value.clone()).unwrap_or_default(),
                    item_group_name: "system".to_string(),
                    unit: "%".to_string(),
                }
            })
            .collect()
    }

    /// Samples of `item_id` within `[begin_time, end_time]`; `None` for an unknown item.
    pub fn history(
        &self,
        item_id: &str,
        begin_time: &str,
        end_time: &str,
    ) -> Result<Option<Vec<HistorySample>>, HapError> {
        let Some(index) = METRICS.iter().position(|m| m.item_id == item_id) else {
            return Ok(None);
        };
        let begin = hapi_time::decode(begin_time)?;
        let end = hapi_time::decode(end_time)?;
        let mut samples = Vec::new();
        for sample in &self.metrics[index].history {
            let time = hapi_time::decode(&sample.time)?;
            if begin <= time && time <= end {
                samples.push(sample.clone());
            }
        }
        Ok(Some(samples))
    }

    /// Up to `count` logged events after (ASC) or before (DESC) `last_info`,
    /// and whether more remain.
    pub fn events(&self, last_info: &str, count: u64, direction: Direction) -> (Vec<Event>, bool) {
        let base = last_info.parse::<u64>().ok();
        let id = event_number;
        let count = count as usize;

        let mut selected: Vec<Event> = match direction {
            Direction::Asc => self
                .events
                .iter()
                .filter(|e| base.map_or(true, |b| id(e) > b))
                .cloned()
                .collect(),
            Direction::Desc => self
                .events
                .iter()
                .rev()
                .filter(|e| base.map_or(true, |b| id(e) < b))
                .cloned()
                .collect(),
        };
        let may_more = selected.len() > count;
        selected.truncate(count);
        (selected, may_more)
    }
}

fn event_number(event: &Event) -> u64 {
    event.event_id.parse().unwrap_or(0)
}

fn cpu_ratio(sample: &Sample) -> f32 {
    sample.cpu
}

fn ram_ratio(sample: &Sample) -> f32 {
    sample.ram
}

fn percent(ratio: f32) -> String {
    format!("{:.1}", ratio * 100.0)
}
