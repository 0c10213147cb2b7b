use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub phases: BTreeMap<String, PhaseMetrics>,
    pub total_duration_ms: f64,
    pub frames_encoded: u64,
    pub frame_packets: u64,
    pub stats_packets: u64,
    pub compressed_bytes: u64,
    pub compared_frames: u64,
}

#[derive(Debug, Default, Serialize, Clone, PartialEq)]
pub struct PhaseMetrics {
    pub calls: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

/// Shared timing and counter sink. Clones record into the same snapshot.
#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_phase(&self, phase: &'static str) -> PhaseTimer {
        PhaseTimer {
            phase,
            started_at: Instant::now(),
            collector: self.inner.clone(),
        }
    }

    pub fn record_total_duration(&self, duration: Duration) {
        self.update(|snapshot| snapshot.total_duration_ms = duration.as_secs_f64() * 1_000.0);
    }

    pub fn record_frame_encoded(&self) {
        self.update(|snapshot| snapshot.frames_encoded += 1);
    }

    pub fn record_frame_packet(&self, bytes: usize) {
        self.update(|snapshot| {
            snapshot.frame_packets += 1;
            snapshot.compressed_bytes += bytes as u64;
        });
    }

    pub fn record_stats_packet(&self) {
        self.update(|snapshot| snapshot.stats_packets += 1);
    }

    pub fn record_compared_frame(&self) {
        self.update(|snapshot| snapshot.compared_frames += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        self.update(|snapshot| *snapshot = MetricsSnapshot::default());
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut guard) = self.inner.lock() {
            apply(&mut *guard);
        }
    }
}

/// Records the elapsed time of one phase when dropped.
pub struct PhaseTimer {
    phase: &'static str,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        let duration_ms = self.started_at.elapsed().as_secs_f64() * 1_000.0;
        if let Ok(mut guard) = self.collector.lock() {
            let metrics = guard.phases.entry(self.phase.to_string()).or_default();
            metrics.calls += 1;
            metrics.total_duration_ms += duration_ms;
            if duration_ms > metrics.max_duration_ms {
                metrics.max_duration_ms = duration_ms;
            }
        }
        debug!(phase = self.phase, duration_ms, "Phase duration recorded");
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        total_duration_ms = snapshot.total_duration_ms,
        frames_encoded = snapshot.frames_encoded,
        frame_packets = snapshot.frame_packets,
        stats_packets = snapshot.stats_packets,
        compressed_bytes = snapshot.compressed_bytes,
        compared_frames = snapshot.compared_frames,
        "Harness metrics summary"
    );
    for (phase, metrics) in &snapshot.phases {
        info!(
            phase = phase.as_str(),
            calls = metrics.calls,
            total_ms = metrics.total_duration_ms,
            max_ms = metrics.max_duration_ms,
            "Phase metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_and_counters_share_one_snapshot() {
        let metrics = MetricsCollector::new();
        let clone = metrics.clone();
        {
            let _timer = clone.start_phase("encode");
        }
        drop(metrics.start_phase("encode"));
        metrics.record_frame_packet(10);
        clone.record_frame_packet(5);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.phases["encode"].calls, 2);
        assert_eq!(snapshot.frame_packets, 2);
        assert_eq!(snapshot.compressed_bytes, 15);

        metrics.reset();
        assert_eq!(clone.snapshot(), MetricsSnapshot::default());
    }
}
