use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Hands out client stream identifiers shared by every connection of a run:
/// odd, unique, increasing by 2 from 1.
#[derive(Debug)]
pub struct StreamIdAllocator {
    next: AtomicU32,
}

impl StreamIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    pub fn allocate(&self) -> u32 {
        self.next.fetch_add(2, Ordering::Relaxed)
    }
}

impl Default for StreamIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Write latencies in microseconds, 1µs to 60s at 3 significant figures.
pub fn new_latency_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, 60_000_000, 3).expect("constant histogram bounds are valid")
}

/// Process-wide frame counters, updated concurrently by every driver and read
/// once after they have all finished.
pub struct FloodStats {
    sent_headers: AtomicU64,
    sent_continuation: AtomicU64,
    recv_frames: AtomicU64,
    recv_goaway: AtomicU64,
    write_latency_us: Mutex<Histogram<u64>>,
}

impl FloodStats {
    pub fn new() -> Self {
        Self {
            sent_headers: AtomicU64::new(0),
            sent_continuation: AtomicU64::new(0),
            recv_frames: AtomicU64::new(0),
            recv_goaway: AtomicU64::new(0),
            write_latency_us: Mutex::new(new_latency_histogram()),
        }
    }

    pub fn record_headers(&self) {
        self.sent_headers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_continuation(&self) {
        self.sent_continuation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self, goaway: bool) {
        self.recv_frames.fetch_add(1, Ordering::Relaxed);
        if goaway {
            self.recv_goaway.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Folds one driver's write latencies into the fleet-wide histogram.
    pub fn merge_latency(&self, local: &Histogram<u64>) {
        if let Err(e) = self.write_latency_us.lock().add(local) {
            tracing::warn!("dropping write latency samples: {:?}", e);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let hist = self.write_latency_us.lock();
        let latency = (!hist.is_empty()).then(|| LatencySummary {
            p50_us: hist.value_at_quantile(0.5),
            p99_us: hist.value_at_quantile(0.99),
            max_us: hist.max(),
        });

        StatsSnapshot {
            sent_headers: self.sent_headers.load(Ordering::Relaxed),
            sent_continuation: self.sent_continuation.load(Ordering::Relaxed),
            recv_frames: self.recv_frames.load(Ordering::Relaxed),
            recv_goaway: self.recv_goaway.load(Ordering::Relaxed),
            latency,
        }
    }
}

impl Default for FloodStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub p50_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub sent_headers: u64,
    pub sent_continuation: u64,
    pub recv_frames: u64,
    pub recv_goaway: u64,
    pub latency: Option<LatencySummary>,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Frames sent: HEADERS = {}, CONTINUATION = {}",
            self.sent_headers, self.sent_continuation
        )?;
        write!(
            f,
            "Frames received: {} (GOAWAY = {})",
            self.recv_frames, self.recv_goaway
        )?;
        if let Some(latency) = self.latency {
            write!(
                f,
                "\nCONTINUATION write latency: p50 = {}µs, p99 = {}µs, max = {}µs",
                latency.p50_us, latency.p99_us, latency.max_us
            )?;
        }
        Ok(())
    }
}
