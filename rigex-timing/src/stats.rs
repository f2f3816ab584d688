use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct TickStats {
    pub average_tick_ns: f64,
    pub jitter_ns: f64,
    pub min_tick_ns: f64,
    pub max_tick_ns: f64,
    pub effective_hz: f64,
}

/// Rolling window of control-loop periods.
#[derive(Debug, Clone)]
pub struct TickRecorder {
    pub tick_times: Vec<Duration>,
    pub max_samples: usize,
}

impl TickRecorder {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            tick_times: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    pub fn record_tick(&mut self, d: Duration) {
        if self.max_samples == 0 {
            return;
        }
        if self.tick_times.len() >= self.max_samples {
            self.tick_times.remove(0);
        }
        self.tick_times.push(d);
    }

    pub fn stats(&self) -> TickStats {
        let times: Vec<f64> = self
            .tick_times
            .iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        if times.is_empty() {
            return TickStats::default();
        }
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        TickStats {
            average_tick_ns: avg,
            jitter_ns: var.sqrt(),
            min_tick_ns: min,
            max_tick_ns: max,
            effective_hz: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

impl Default for TickRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_over_window() {
        let mut rec = TickRecorder::with_capacity(2);
        rec.record_tick(Duration::from_millis(100));
        rec.record_tick(Duration::from_millis(10));
        rec.record_tick(Duration::from_millis(10));
        let stats = rec.stats();
        assert_eq!(rec.tick_times.len(), 2);
        assert_eq!(stats.average_tick_ns, 10_000_000.0);
        assert_eq!(stats.jitter_ns, 0.0);
        assert!((stats.effective_hz - 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_window_is_zeroed() {
        assert_eq!(TickRecorder::new().stats().effective_hz, 0.0);
    }
}
