use crate::controller::TrialController;
use crate::deck::CardDeck;
use rand::Rng;
use rigex_core::{ErrorCounts, TrialResult};
use rigex_timing::{Clock, TickRecorder, nanos};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub mouse_name: String,
    pub trials: u32,
    pub total_reward: u32,
    pub errors: ErrorCounts,
    pub sensor_faults: u32,
    pub results: Vec<TrialResult>,
}

/// The session loop around a [`TrialController`]: deals cards, paces ticks,
/// applies the punishment delay after error trials.
pub struct SessionRunner<C: Clock, R: Rng> {
    controller: TrialController<C>,
    deck: CardDeck<R>,
    tick_interval: Duration,
    punishment: Duration,
    max_trials: Option<u32>,
    standby_until: u64,
    recorder: TickRecorder,
}

impl<C: Clock, R: Rng> SessionRunner<C, R> {
    pub fn new(controller: TrialController<C>, rng: R) -> Self {
        let policy = controller.config().session.clone();
        Self {
            deck: CardDeck::new(&policy, rng),
            tick_interval: policy.tick_interval(),
            punishment: policy.punishment_timeout(),
            max_trials: policy.max_trials,
            standby_until: 0,
            recorder: TickRecorder::new(),
            controller,
        }
    }

    pub fn controller(&self) -> &TrialController<C> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut TrialController<C> {
        &mut self.controller
    }

    pub fn deck(&self) -> &CardDeck<R> {
        &self.deck
    }

    /// One pass of the loop. Returns `false` once the session should stop.
    pub fn step(&mut self) -> bool {
        if self.controller.quit_requested() {
            return false;
        }
        let now = self.controller.clock().now();
        if self.controller.current_state().is_standby() {
            let done = self.controller.current_counters().trial_number;
            if self.max_trials.is_some_and(|max| done >= max) {
                return false;
            }
            if now >= self.standby_until {
                let card = self.deck.next_card(self.controller.error_repeat());
                if let Err(err) = self.controller.start_trial(card) {
                    warn!(%err, "could not start trial");
                }
            }
        }

        let outcome = self.controller.tick();
        if outcome.ended_trial() {
            let punished = self
                .controller
                .results()
                .last()
                .is_some_and(|r| r.outcome.is_error());
            let delay = if punished { self.punishment } else { Duration::ZERO };
            self.standby_until = self
                .controller
                .clock()
                .now()
                .saturating_add(nanos(delay));
        }
        !self.controller.quit_requested()
    }

    pub fn run(&mut self) -> SessionSummary {
        let clock = self.controller.clock().clone();
        self.controller.start_session();
        let mut last = clock.now();
        while self.step() {
            clock.sleep(self.tick_interval);
            let now = clock.now();
            self.recorder.record_tick(Duration::from_nanos(now.saturating_sub(last)));
            last = now;
        }
        self.controller.end_session();

        let stats = self.recorder.stats();
        info!(
            mean_ms = stats.average_tick_ns / 1e6,
            jitter_ms = stats.jitter_ns / 1e6,
            min_ms = stats.min_tick_ns / 1e6,
            max_ms = stats.max_tick_ns / 1e6,
            hz = stats.effective_hz,
            "control loop timing"
        );
        self.summary()
    }

    pub fn summary(&self) -> SessionSummary {
        let c = self.controller.current_counters();
        SessionSummary {
            mouse_name: self.controller.config().mouse_name.clone(),
            trials: c.trial_number,
            total_reward: c.total_reward,
            errors: c.errors,
            sensor_faults: c.sensor_faults,
            results: self.controller.results().to_vec(),
        }
    }
}
