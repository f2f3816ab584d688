//! Lateralized stimulus scheduling.
//!
//! All state sits behind one mutex shared by the control loop and any timer
//! thread that calls [`StimulusScheduler::service`]. Every operation,
//! including a dark-period switch, runs under a single lock acquisition, so
//! no timer can observe a half-applied change.

use crate::config::StimulusConfig;
use crate::hardware::StimulusRenderer;
use crate::log::{LogCategory, TrialLog};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rigex_core::{Side, StimulusState};
use rigex_timing::{Schedule, nanos};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StimulusTimer {
    Off(Side),
    InterTrial,
    DarkPeriodEnd,
}

/// Counters reset at the start of every dark period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PeriodCounters {
    pub patch_entries: u32,
    pub stimuli_shown: u32,
}

struct Inner {
    state: StimulusState,
    timers: Schedule<StimulusTimer>,
    renderer: Box<dyn StimulusRenderer>,
    log: Arc<dyn TrialLog>,
    rng: StdRng,
    probability: f64,
    duration: Duration,
    dark_period_times: Vec<Duration>,
    inter_trial: Duration,
    dark: bool,
    iti_active: bool,
    counters: PeriodCounters,
}

impl Inner {
    fn emit(&self, now_ns: u64, category: LogCategory, message: &str) {
        self.log.emit(now_ns, category, message);
    }

    fn on(&mut self, side: Side, now_ns: u64) -> bool {
        if self.dark {
            return false;
        }
        self.state.set(side, true);
        self.state.activated_at_ns = Some(now_ns);
        self.renderer.set_side_stimulus(side, true);
        let deadline = now_ns.saturating_add(nanos(self.duration));
        self.timers.arm(StimulusTimer::Off(side), deadline);
        self.counters.stimuli_shown += 1;
        let message = format!("{}_stimulus_on", side.as_str());
        self.emit(now_ns, LogCategory::Action, &message);
        true
    }

    fn off(&mut self, side: Side, now_ns: u64) {
        self.timers.cancel_key(StimulusTimer::Off(side));
        if self.state.is_active(side) {
            self.state.set(side, false);
            self.renderer.set_side_stimulus(side, false);
            let message = format!("{}_stimulus_off", side.as_str());
            self.emit(now_ns, LogCategory::Action, &message);
        }
    }

    fn all_off(&mut self) {
        for side in [Side::Left, Side::Right] {
            self.timers.cancel_key(StimulusTimer::Off(side));
            self.state.set(side, false);
            self.renderer.set_side_stimulus(side, false);
        }
    }

    fn fire(&mut self, timer: StimulusTimer, now_ns: u64) {
        match timer {
            StimulusTimer::Off(side) => self.off(side, now_ns),
            StimulusTimer::InterTrial => {
                self.iti_active = false;
                self.emit(now_ns, LogCategory::Session, "inter_trial_end");
            }
            StimulusTimer::DarkPeriodEnd => {
                self.dark = false;
                self.emit(now_ns, LogCategory::Transition, "end_dark_period");
            }
        }
    }
}

#[derive(Clone)]
pub struct StimulusScheduler {
    inner: Arc<Mutex<Inner>>,
}

impl StimulusScheduler {
    pub fn new(
        config: &StimulusConfig,
        renderer: Box<dyn StimulusRenderer>,
        log: Arc<dyn TrialLog>,
        rng: StdRng,
    ) -> Self {
        let inner = Inner {
            state: StimulusState::default(),
            timers: Schedule::new(),
            renderer,
            log,
            rng,
            probability: config.probability,
            duration: config.duration(),
            dark_period_times: config.dark_period_times(),
            inter_trial: config.inter_trial(),
            dark: false,
            iti_active: false,
            counters: PeriodCounters::default(),
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reseed(&self, seed: u64) {
        self.lock().rng = StdRng::seed_from_u64(seed);
    }

    /// Patch entry: turns that side's stimulus on with the configured
    /// probability. Returns whether it did.
    pub fn enter_patch(&self, side: Side, now_ns: u64) -> bool {
        let mut inner = self.lock();
        inner.emit(
            now_ns,
            LogCategory::Transition,
            &format!("enter_{}_patch", side.as_str()),
        );
        inner.counters.patch_entries += 1;
        if inner.dark {
            return false;
        }
        let p = inner.probability;
        let roll: f64 = inner.rng.random();
        roll < p && inner.on(side, now_ns)
    }

    /// Turns `side` on and schedules its automatic deactivation. Refused
    /// during a dark period.
    pub fn stimulus_on(&self, side: Side, now_ns: u64) -> bool {
        self.lock().on(side, now_ns)
    }

    /// Both sides off; pending deactivations are revoked.
    pub fn stimuli_off(&self, now_ns: u64) {
        let mut inner = self.lock();
        inner.all_off();
        inner.emit(now_ns, LogCategory::Action, "turn_stimuli_off");
    }

    pub fn reset(&self, now_ns: u64) {
        let mut inner = self.lock();
        inner.all_off();
        inner.emit(now_ns, LogCategory::Action, "reset_stimuli");
    }

    /// Arms the session-level inter-trial timer.
    pub fn start_inter_trial(&self, now_ns: u64) {
        let mut inner = self.lock();
        let deadline = now_ns.saturating_add(nanos(inner.inter_trial));
        inner.iti_active = true;
        inner.timers.arm(StimulusTimer::InterTrial, deadline);
    }

    /// Enters a dark period and returns its length.
    ///
    /// In one critical section: cancel the inter-trial timer, force both
    /// stimuli off, reset the period counters, arm the exit timer.
    pub fn activate_dark_period(&self, now_ns: u64) -> Duration {
        let mut inner = self.lock();
        inner.iti_active = false;
        inner.timers.cancel_key(StimulusTimer::InterTrial);
        inner.all_off();
        inner.emit(now_ns, LogCategory::Action, "turn_stimuli_off");
        inner.counters = PeriodCounters::default();
        inner.dark = true;

        let Inner {
            rng,
            dark_period_times,
            ..
        } = &mut *inner;
        let length = dark_period_times.choose(rng).copied().unwrap_or_default();
        inner.timers.arm(
            StimulusTimer::DarkPeriodEnd,
            now_ns.saturating_add(nanos(length)),
        );
        inner.emit(
            now_ns,
            LogCategory::Transition,
            &format!("activate_dark_period;{}", length.as_secs_f64()),
        );
        length
    }

    /// Cancels every timer and turns both sides off.
    pub fn shutdown(&self, now_ns: u64) {
        let mut inner = self.lock();
        inner.timers.clear();
        inner.all_off();
        inner.iti_active = false;
        inner.emit(now_ns, LogCategory::Action, "turn_stimuli_off");
    }

    /// Runs every timer due at `now_ns`. Safe to call from any thread.
    pub fn service(&self, now_ns: u64) -> usize {
        let mut inner = self.lock();
        let mut fired = 0;
        for expired in inner.timers.expire(now_ns) {
            if inner.timers.claim(expired.handle) {
                inner.fire(expired.key, now_ns);
                fired += 1;
            }
        }
        if fired > 0 {
            debug!(fired, "stimulus timers");
        }
        fired
    }

    pub fn snapshot(&self) -> StimulusState {
        self.lock().state
    }

    pub fn is_dark(&self) -> bool {
        self.lock().dark
    }

    pub fn iti_active(&self) -> bool {
        self.lock().iti_active
    }

    pub fn period_counters(&self) -> PeriodCounters {
        self.lock().counters
    }
}
