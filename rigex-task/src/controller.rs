use crate::config::{ConfigError, SessionConfig};
use crate::events::{EventQueue, EventSource};
use crate::hardware::{Rig, StimulusRenderer};
use crate::log::{LogCategory, TrialLog};
use crate::machine::{MachineError, TrialContext, TrialData, TrialStateMachine};
use crate::stimulus::StimulusScheduler;
use crate::timeout::TimeoutScheduler;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rigex_core::{
    ChoiceError, ErrorFlags, HwEvent, SessionCounters, TrialCard, TrialOutcome, TrialResult,
    TrialState, Trigger,
};
use rigex_timing::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Machine(#[from] MachineError),
}

/// What one call to [`TrialController::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub from: TrialState,
    pub to: TrialState,
    /// Trigger fired by the guard evaluation.
    pub trigger: Option<Trigger>,
    /// Whether the state deadline forced a restart.
    pub timed_out: bool,
}

impl TickOutcome {
    pub fn ended_trial(&self) -> bool {
        !self.from.is_standby() && self.to.is_standby()
    }
}

/// Drives one trial state machine from a cooperative control loop.
pub struct TrialController<C: Clock> {
    config: Arc<SessionConfig>,
    clock: C,
    machine: TrialStateMachine,
    data: TrialData,
    rig: Rig,
    log: Arc<dyn TrialLog>,
    queue: EventQueue,
    source: Option<Box<dyn EventSource>>,
    timeouts: TimeoutScheduler,
    stimulus: StimulusScheduler,
    running: bool,
    quit_requested: bool,
}

impl<C: Clock> TrialController<C> {
    pub fn new(
        config: SessionConfig,
        clock: C,
        rig: Rig,
        renderer: Box<dyn StimulusRenderer>,
        log: Arc<dyn TrialLog>,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        let machine = TrialStateMachine::new()?;
        let stimulus = StimulusScheduler::new(
            &config.stimulus,
            renderer,
            log.clone(),
            StdRng::from_os_rng(),
        );
        let timeouts = TimeoutScheduler::new(config.timeouts.clone());
        Ok(Self {
            config: Arc::new(config),
            clock,
            machine,
            data: TrialData::default(),
            rig,
            log,
            queue: EventQueue::new(),
            source: None,
            timeouts,
            stimulus,
            running: false,
            quit_requested: false,
        })
    }

    pub fn with_event_source(mut self, source: impl EventSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Deterministic stimulus draws.
    pub fn with_seed(self, seed: u64) -> Self {
        self.stimulus.reseed(seed);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn current_state(&self) -> TrialState {
        self.machine.state()
    }

    pub fn current_counters(&self) -> SessionCounters {
        self.data.counters
    }

    pub fn flags(&self) -> ErrorFlags {
        self.data.flags
    }

    /// Whether the next trial should reuse the current card.
    pub fn error_repeat(&self) -> bool {
        self.data.flags.error_repeat
    }

    pub fn current_card(&self) -> Option<TrialCard> {
        self.data.card
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.data.results
    }

    pub fn stimulus(&self) -> &StimulusScheduler {
        &self.stimulus
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    fn emit(&self, now_ns: u64, category: LogCategory, message: &str) {
        self.log.emit(now_ns, category, message);
    }

    pub fn push_event(&mut self, event: HwEvent) {
        self.queue.push(event);
    }

    /// Queues a named GPIO signal. Undecodable signals are sensor faults.
    pub fn submit_signal(&mut self, name: &str) {
        if let Err(err) = self.queue.push_signal(name) {
            let now = self.clock.now();
            self.data.counters.sensor_faults += 1;
            self.emit(now, LogCategory::Sensor, &err.to_string());
        }
    }

    pub fn start_session(&mut self) {
        let now = self.clock.now();
        self.running = true;
        self.quit_requested = false;
        self.stimulus.reset(now);
        self.rig.video.start();
        self.emit(now, LogCategory::Session, "session_start");
        info!(mouse = %self.config.mouse_name, "session started");
    }

    /// Stops timers, stimuli and video. A trial still running is closed as
    /// aborted without counting errors.
    pub fn end_session(&mut self) {
        let now = self.clock.now();
        if !self.machine.state().is_standby() {
            self.data.flags = ErrorFlags {
                error_repeat: self.data.flags.error_repeat,
                ..ErrorFlags::default()
            };
            self.data.outcome = Some(TrialOutcome::Aborted);
            self.apply(Trigger::Restart, now);
        }
        self.timeouts.cancel();
        self.stimulus.shutdown(now);
        self.rig.video.stop();
        self.running = false;
        let c = self.data.counters;
        self.emit(
            now,
            LogCategory::Session,
            &format!(
                "session_end;trials={};rewards={};errors={}",
                c.trial_number,
                c.total_reward,
                c.error_count()
            ),
        );
        info!(
            trials = c.trial_number,
            rewards = c.total_reward,
            errors = c.error_count(),
            sensor_faults = c.sensor_faults,
            "session ended"
        );
    }

    /// `Standby → Initiate` with `card` for the new trial.
    pub fn start_trial(&mut self, card: TrialCard) -> Result<(), MachineError> {
        let state = self.machine.state();
        if !self.machine.can_fire(Trigger::StartTrial) {
            return Err(MachineError::InvalidTrigger {
                trigger: Trigger::StartTrial,
                state,
            });
        }
        let now = self.clock.now();
        self.data.card = Some(card);
        self.data.outcome = None;
        self.apply(Trigger::StartTrial, now);
        Ok(())
    }

    /// One control cycle.
    ///
    /// Guard evaluation runs before the state deadline is checked, so a
    /// transition that becomes possible in the same tick as the deadline
    /// wins and the deadline is discarded with the state it belonged to.
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now();
        if let Some(source) = self.source.as_mut() {
            self.queue.fill_from(source.as_mut());
        }
        let events = self.queue.drain_tick();
        for event in events.control {
            self.handle_control(event, now);
        }

        let from = self.machine.state();
        let mut outcome = TickOutcome {
            from,
            to: from,
            trigger: None,
            timed_out: false,
        };

        if let Some(side) = events.lick {
            if from != TrialState::RewardAvailable {
                debug!(side = side.as_str(), state = %from, "lick discarded");
            }
        }

        if !from.is_standby() {
            let trigger = {
                let mut ctx = TrialContext {
                    config: &self.config,
                    data: &mut self.data,
                    rig: &mut self.rig,
                    log: self.log.as_ref(),
                    now_ns: now,
                };
                self.machine.evaluate(&mut ctx, events.lick)
            };
            if let Some(trigger) = trigger {
                self.apply(trigger, now);
                outcome.trigger = Some(trigger);
            }
        }

        if let Some(expired) = self.timeouts.poll(now) {
            if expired == self.machine.state() {
                self.force_restart(expired, now);
                outcome.timed_out = true;
            }
        }

        self.stimulus.service(now);
        outcome.to = self.machine.state();
        outcome
    }

    fn handle_control(&mut self, event: HwEvent, now: u64) {
        match event {
            HwEvent::KeyPress(key) => {
                self.emit(now, LogCategory::Key, &format!("key_{key}"));
                match key {
                    'q' => self.quit_requested = true,
                    'd' => {
                        self.stimulus.activate_dark_period(now);
                    }
                    _ => {}
                }
            }
            other => {
                if let Some(side) = other.patch_side() {
                    self.stimulus.enter_patch(side, now);
                }
            }
        }
    }

    /// Deadline expiry: classify the timeout, then restart.
    fn force_restart(&mut self, state: TrialState, now: u64) {
        self.emit(now, LogCategory::Timeout, &format!("{state}_timeout"));
        let flags = &mut self.data.flags;
        let outcome = match state {
            TrialState::Initiate => {
                flags.initiate_error = true;
                TrialOutcome::InitiateTimeout
            }
            TrialState::CueState => {
                flags.cue_state_error = true;
                TrialOutcome::CueTimeout
            }
            TrialState::RewardAvailable => {
                let err = flags.choice.unwrap_or(ChoiceError::NoChoice);
                flags.mark_choice(err);
                TrialOutcome::Choice(err)
            }
            TrialState::Standby => return,
        };
        flags.error_repeat = true;
        self.data.outcome = Some(outcome);
        self.apply(Trigger::Restart, now);
    }

    fn apply(&mut self, trigger: Trigger, now: u64) {
        let result = {
            let mut ctx = TrialContext {
                config: &self.config,
                data: &mut self.data,
                rig: &mut self.rig,
                log: self.log.as_ref(),
                now_ns: now,
            };
            self.machine.fire(trigger, &mut ctx)
        };
        match result {
            Ok(state) => {
                self.timeouts.arm(state, now);
                if state.is_standby() {
                    self.stimulus.start_inter_trial(now);
                }
            }
            Err(err) => warn!(%err, "transition rejected"),
        }
    }
}
