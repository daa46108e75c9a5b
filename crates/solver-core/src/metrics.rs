//! Prometheus metrics for the pipeline.
//!
//! The registry is constructed once at startup and never mutated
//! afterwards; in-flight requests share it read-only. Counters only track
//! operational volume, they never feed hashed state.

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};

/// Counters and histograms for one solver process.
#[derive(Debug, Clone)]
pub struct SolverMetrics {
    /// Runs that reached the executor.
    pub runs_total: IntCounter,
    /// Policy refusals recorded.
    pub refusals_total: IntCounter,
    /// Runs whose job execution failed.
    pub run_failures_total: IntCounter,
    /// Receipts appended.
    pub receipts_total: IntCounter,
    /// Wall-clock duration of complete runs, in seconds.
    pub run_duration_seconds: Histogram,
}

impl SolverMetrics {
    /// Creates the metric family and registers it with `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`prometheus::Error`] if a collector with the same name is
    /// already registered.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let runs_total = IntCounter::with_opts(Opts::new(
            "solver_runs_total",
            "Intents that passed the policy gate and reached the executor",
        ))?;
        let refusals_total = IntCounter::with_opts(Opts::new(
            "solver_refusals_total",
            "Policy refusals recorded to the refusal log",
        ))?;
        let run_failures_total = IntCounter::with_opts(Opts::new(
            "solver_run_failures_total",
            "Runs whose job execution reported failure",
        ))?;
        let receipts_total = IntCounter::with_opts(Opts::new(
            "solver_receipts_total",
            "Receipts appended to the receipt log",
        ))?;
        let run_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "solver_run_duration_seconds",
            "Wall-clock duration of complete runs",
        ))?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(refusals_total.clone()))?;
        registry.register(Box::new(run_failures_total.clone()))?;
        registry.register(Box::new(receipts_total.clone()))?;
        registry.register(Box::new(run_duration_seconds.clone()))?;

        Ok(Self {
            runs_total,
            refusals_total,
            run_failures_total,
            receipts_total,
            run_duration_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_all_collectors() {
        let registry = Registry::new();
        let metrics = SolverMetrics::register(&registry).unwrap();
        metrics.runs_total.inc();
        metrics.refusals_total.inc();
        metrics.run_duration_seconds.observe(0.25);

        let families = registry.gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"solver_runs_total"));
        assert!(names.contains(&"solver_refusals_total"));
        assert!(names.contains(&"solver_run_failures_total"));
        assert!(names.contains(&"solver_receipts_total"));
        assert!(names.contains(&"solver_run_duration_seconds"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        SolverMetrics::register(&registry).unwrap();
        assert!(SolverMetrics::register(&registry).is_err());
    }
}
