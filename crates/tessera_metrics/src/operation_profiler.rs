//! Wall-clock timing of named lifecycle operations

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationTiming {
    pub calls: u64,
    pub total: Duration,
    pub max: Duration,
}

impl OperationTiming {
    pub fn mean(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.total / self.calls as u32
        }
    }
}

pub struct OperationProfiler {
    timings: Mutex<BTreeMap<&'static str, OperationTiming>>,
}

impl OperationProfiler {
    pub fn new() -> Self {
        Self {
            timings: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn time_operation<F, R>(&self, name: &'static str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.record(name, start.elapsed());
        result
    }

    pub fn record(&self, name: &'static str, elapsed: Duration) {
        let mut timings = self.timings.lock();
        let timing = timings.entry(name).or_default();
        timing.calls += 1;
        timing.total += elapsed;
        timing.max = timing.max.max(elapsed);
    }

    pub fn get_timing(&self, name: &str) -> OperationTiming {
        self.timings.lock().get(name).copied().unwrap_or_default()
    }

    pub fn reset(&self) {
        self.timings.lock().clear();
    }

    pub fn snapshot(&self) -> Vec<(&'static str, OperationTiming)> {
        self.timings.lock().iter().map(|(k, v)| (*k, *v)).collect()
    }
}

impl Default for OperationProfiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_total_and_max() {
        let profiler = OperationProfiler::new();
        profiler.record("load", Duration::from_millis(10));
        profiler.record("load", Duration::from_millis(30));
        let value = profiler.time_operation("unload", || 7);
        assert_eq!(value, 7);

        let load = profiler.get_timing("load");
        assert_eq!(load.calls, 2);
        assert_eq!(load.max, Duration::from_millis(30));
        assert_eq!(load.mean(), Duration::from_millis(20));
        assert_eq!(profiler.get_timing("unload").calls, 1);
    }
}
