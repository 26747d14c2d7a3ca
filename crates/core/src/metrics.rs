use crate::SimulationObserver;
use cacheprobe_diag::Grid;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Counts every access the diagnostic makes, by kind.
#[derive(Debug)]
pub struct AccessMetrics {
    stores: AtomicU64,
    loads: AtomicU64,
    transmitted: AtomicU64,
    signals: AtomicU64,
    started: Mutex<Option<Instant>>,
    elapsed: Mutex<Duration>,
}

impl Default for AccessMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessMetrics {
    pub fn new() -> Self {
        Self {
            stores: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            transmitted: AtomicU64::new(0),
            signals: AtomicU64::new(0),
            started: Mutex::new(None),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn reset(&self) {
        self.stores.store(0, Ordering::SeqCst);
        self.loads.store(0, Ordering::SeqCst);
        self.transmitted.store(0, Ordering::SeqCst);
        self.signals.store(0, Ordering::SeqCst);
    }

    pub fn get_stores(&self) -> u64 {
        self.stores.load(Ordering::SeqCst)
    }

    pub fn get_loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn get_transmitted(&self) -> u64 {
        self.transmitted.load(Ordering::SeqCst)
    }

    pub fn get_signals(&self) -> u64 {
        self.signals.load(Ordering::SeqCst)
    }

    /// Wall time of the last completed run.
    pub fn get_elapsed(&self) -> Duration {
        self.elapsed.lock().map(|d| *d).unwrap_or_default()
    }
}

impl SimulationObserver for AccessMetrics {
    fn on_run_start(&self, _grid: Grid) {
        self.reset();
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
    }

    fn on_run_stop(&self, _verdict: cacheprobe_diag::Verdict) {
        let started = self.started.lock().ok().and_then(|mut s| s.take());
        if let (Some(started), Ok(mut elapsed)) = (started, self.elapsed.lock()) {
            *elapsed = started.elapsed();
        }
    }

    fn on_store(&self, _addr: u64, _value: u64) {
        self.stores.fetch_add(1, Ordering::SeqCst);
    }

    fn on_load(&self, _addr: u64, _value: u64) {
        self.loads.fetch_add(1, Ordering::SeqCst);
    }

    fn on_transmit(&self, _byte: u8) {
        self.transmitted.fetch_add(1, Ordering::SeqCst);
    }

    fn on_signal(&self, _code: u64) {
        self.signals.fetch_add(1, Ordering::SeqCst);
    }
}
