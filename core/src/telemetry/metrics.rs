use serde::Serialize;
use std::sync::Mutex;

pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

/// Counter values at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub blocks: usize,
    pub samples_in: usize,
    pub samples_out: usize,
    pub eos_flushes: usize,
    pub redesigns: usize,
    pub config_conflicts: usize,
    pub errors: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_block(&self, samples_in: usize, samples_out: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.blocks += 1;
            metrics.samples_in += samples_in;
            metrics.samples_out += samples_out;
        }
    }

    pub fn record_flush(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.eos_flushes += 1;
        }
    }

    pub fn record_redesign(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.redesigns += 1;
        }
    }

    pub fn record_conflict(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.config_conflicts += 1;
        }
    }

    pub fn record_error(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.errors += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner
            .lock()
            .map(|metrics| *metrics)
            .unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsRecorder::new();
        metrics.record_block(10, 10);
        metrics.record_block(4, 6);
        metrics.record_flush();
        metrics.record_conflict();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.blocks, 2);
        assert_eq!(snapshot.samples_in, 14);
        assert_eq!(snapshot.samples_out, 16);
        assert_eq!(snapshot.eos_flushes, 1);
        assert_eq!(snapshot.config_conflicts, 1);
        assert_eq!(snapshot.errors, 0);
    }
}
