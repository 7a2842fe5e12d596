use crate::sampler::ProcessSampler;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

pub const TICK_PERIOD: Duration = Duration::from_secs(2);

/// Logs this process's CPU usage once per period, forever.
pub async fn run_cpu_ticker(period: Duration) {
    let mut sampler = match ProcessSampler::current() {
        Ok(sampler) => sampler,
        Err(e) => {
            error!("CPU ticker disabled: {}", e);
            return;
        }
    };

    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticks.tick().await;

    loop {
        ticks.tick().await;
        match sampler.cpu_since_last() {
            Ok(percent) => info!("Process CPU Usage: {:.2}%", percent),
            Err(e) => warn!("Error retrieving process CPU usage: {}", e),
        }
    }
}
