//! System resource monitoring module.
//!
//! This module provides:
//! - Memory usage monitoring
//! - Uptime and parallelism gauges
//! - Background monitoring task

use std::time::{Duration, Instant};

/// Record memory usage metrics
pub fn record_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Some(resident_mb) = read_resident_memory_mb() {
            metrics::gauge!("process_memory_mb").set(resident_mb);
        }
    }
}

/// Resident set size from `/proc/self/statm`, assuming 4KB pages
#[cfg(target_os = "linux")]
pub fn read_resident_memory_mb() -> Option<f64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some((pages * 4) as f64 / 1024.0)
}

/// Record system resource metrics
pub fn record_system_resources() {
    let thread_count = std::thread::available_parallelism()
        .map(|p| p.get() as f64)
        .unwrap_or(1.0);
    metrics::gauge!("available_threads").set(thread_count);
}

/// Start a background task to periodically record system metrics
pub fn start_system_metrics_recorder(started_at: Instant) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30)); // Every 30 seconds

        loop {
            interval.tick().await;
            record_memory_usage();
            record_system_resources();
            crate::observability::metrics::record_uptime(started_at.elapsed().as_secs_f64());
        }
    })
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn test_read_resident_memory() {
        let mb = read_resident_memory_mb().unwrap();
        assert!(mb > 0.0);
    }
}
