use std::time::Duration;
use sysinfo::{Pid, System};
use thiserror::Error;

/// Window the health check measures process CPU over.
pub const CPU_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("error getting process info: {0}")]
    Pid(&'static str),
    #[error("error retrieving CPU usage: process {0} is not visible")]
    MissingProcess(Pid),
    #[error("error retrieving virtual memory usage: total memory reported as zero")]
    NoMemory,
}

/// Reads CPU and memory figures for one process through sysinfo.
///
/// CPU readings are relative to the previous refresh, so a sampler kept
/// alive between calls reports usage over the interval between them.
pub struct ProcessSampler {
    system: System,
    pid: Pid,
}

impl ProcessSampler {
    pub fn current() -> Result<Self, SampleError> {
        let pid = sysinfo::get_current_pid().map_err(SampleError::Pid)?;
        Self::for_pid(pid)
    }

    pub fn for_pid(pid: Pid) -> Result<Self, SampleError> {
        let mut system = System::new();
        if !system.refresh_process(pid) {
            return Err(SampleError::MissingProcess(pid));
        }
        Ok(Self { system, pid })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Percent of one core used since the last refresh. Can exceed 100 on
    /// multi-core hosts.
    pub fn cpu_since_last(&mut self) -> Result<f32, SampleError> {
        if !self.system.refresh_process(self.pid) {
            return Err(SampleError::MissingProcess(self.pid));
        }
        self.system
            .process(self.pid)
            .map(|p| p.cpu_usage())
            .ok_or(SampleError::MissingProcess(self.pid))
    }

    pub async fn cpu_over(&mut self, window: Duration) -> Result<f32, SampleError> {
        self.cpu_since_last()?;
        tokio::time::sleep(window).await;
        self.cpu_since_last()
    }

    /// System-wide used memory as a percentage of total.
    pub fn memory_percent(&mut self) -> Result<f32, SampleError> {
        self.system.refresh_memory();
        used_percent(self.system.used_memory(), self.system.total_memory())
    }
}

fn used_percent(used: u64, total: u64) -> Result<f32, SampleError> {
    if total == 0 {
        return Err(SampleError::NoMemory);
    }
    Ok((used as f64 / total as f64 * 100.0) as f32)
}
