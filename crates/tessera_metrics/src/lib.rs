//! Tessera Metrics - lifecycle counters and operation timing
//!
//! Provides zero-cost abstractions for metrics collection that completely
//! vanish in production builds via feature flags.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use tessera_metrics::{Counter, OperationProfiler};
//!
//! let counters = Counter::new();
//! let profiler = OperationProfiler::new();
//! let id = profiler.time_operation("generate", || coordinator.generate(..));
//! counters.increment("generate.ok", 1);
//! ```
//!
//! Without the `metrics` feature, every call is a no-op and `time_operation`
//! just runs its closure.

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod operation_profiler;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use operation_profiler::{OperationProfiler, OperationTiming};

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&self, _name: &'static str, _value: u64) {}
    pub fn set(&self, _name: &'static str, _value: u64) {}
    pub fn get(&self, _name: &str) -> u64 { 0 }
    pub fn reset_all(&self) {}
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> { Vec::new() }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationTiming {
    pub calls: u64,
    pub total: std::time::Duration,
    pub max: std::time::Duration,
}

#[cfg(not(feature = "metrics"))]
impl OperationTiming {
    pub fn mean(&self) -> std::time::Duration { std::time::Duration::ZERO }
}

#[cfg(not(feature = "metrics"))]
#[derive(Default)]
pub struct OperationProfiler;

#[cfg(not(feature = "metrics"))]
impl OperationProfiler {
    pub fn new() -> Self { Self }
    pub fn time_operation<F, R>(&self, _name: &'static str, f: F) -> R where F: FnOnce() -> R { f() }
    pub fn record(&self, _name: &'static str, _elapsed: std::time::Duration) {}
    pub fn get_timing(&self, _name: &str) -> OperationTiming { OperationTiming::default() }
    pub fn reset(&self) {}
    pub fn snapshot(&self) -> Vec<(&'static str, OperationTiming)> { Vec::new() }
}

/// Whether this build collects metrics.
pub const ENABLED: bool = cfg!(feature = "metrics");

#[cfg(test)]
mod tests {
    #[test]
    fn test_compiles_either_way() {
        let counter = super::Counter::new();
        let profiler = super::OperationProfiler::new();
        counter.increment("x", 1);
        assert_eq!(profiler.time_operation("noop", || 3), 3);
        if !super::ENABLED {
            assert_eq!(counter.get("x"), 0);
        }
    }
}
