use crate::clock::Clock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;

/// Background thread that calls `f` with the current clock time every
/// `period` until stopped or dropped.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn<C, F>(name: &str, clock: C, period: Duration, mut f: F) -> std::io::Result<Self>
    where
        C: Clock,
        F: FnMut(u64) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    f(clock.now());
                    clock.sleep(period);
                }
            })?;
        debug!(ticker = name, period_us = period.as_micros() as u64, "ticker started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::HighPrecisionTimer;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn ticker_runs_until_stopped() {
        let count = Arc::new(AtomicU32::new(0));
        let seen = count.clone();
        let mut ticker = Ticker::spawn(
            "test-ticker",
            HighPrecisionTimer::new(),
            Duration::from_millis(1),
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        ticker.stop();
        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }
}
