use gethostname::gethostname;
use sysinfo::System;

/// One reading of the local machine. Ratios are in 0..1.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub cpu: f32,
    pub ram: f32,
}

pub trait Probe: Send {
    fn host_name(&self) -> String;

    fn sample(&mut self) -> Sample;
}

pub struct SystemProbe {
    sys: System,
    host_name: String,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            host_name: gethostname().to_string_lossy().to_string(),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for SystemProbe {
    fn host_name(&self) -> String {
        self.host_name.clone()
    }

    fn sample(&mut self) -> Sample {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let cpu = self.sys.global_cpu_info().cpu_usage() / 100.0;
        let total = self.sys.total_memory() as f32;
        let used = self.sys.used_memory() as f32;
        let ram = if total > 0.0 { used / total } else { 0.0 };
        Sample { cpu, ram }
    }
}
