//! Trial state machine.
//!
//! The machine is an explicit state tag, a transition table that is checked
//! when the machine is built, and a state-indexed table of entry/exit hooks.
//! Hooks only ever see a [`TrialContext`], never the machine, so a transition
//! cannot start another one from inside its side effects.

use crate::config::SessionConfig;
use crate::hardware::Rig;
use crate::log::{LogCategory, TrialLog};
use rigex_core::{
    ChoiceError, ErrorFlags, SessionCounters, Side, TrialCard, TrialOutcome, TrialResult,
    TrialState, Trigger,
};
use std::collections::{HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("duplicate transition `{trigger}` from {from}")]
    Duplicate { trigger: Trigger, from: TrialState },
    #[error("state {0} is unreachable from the initial state")]
    Unreachable(TrialState),
    #[error("state {0} has no path back to standby")]
    NoWayBack(TrialState),
    #[error("timed state {0} has no restart transition")]
    MissingRestart(TrialState),
    #[error("trigger `{trigger}` is not valid in state {state}")]
    InvalidTrigger { trigger: Trigger, state: TrialState },
    #[error("no card loaded for the current trial")]
    NoCard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub trigger: Trigger,
    pub from: TrialState,
    pub to: TrialState,
}

/// Validated `(trigger, from) -> to` table.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    rows: Vec<Transition>,
}

impl TransitionTable {
    pub fn standard() -> Result<Self, MachineError> {
        use TrialState::*;
        let row = |trigger, from, to| Transition { trigger, from, to };
        Self::new(vec![
            row(Trigger::StartTrial, Standby, Initiate),
            row(Trigger::StartCue, Initiate, CueState),
            row(Trigger::EvaluateReward, CueState, RewardAvailable),
            row(Trigger::Restart, Initiate, Standby),
            row(Trigger::Restart, CueState, Standby),
            row(Trigger::Restart, RewardAvailable, Standby),
        ])
    }

    pub fn new(rows: Vec<Transition>) -> Result<Self, MachineError> {
        let table = Self { rows };
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<(), MachineError> {
        let mut seen = HashSet::new();
        for r in &self.rows {
            if !seen.insert((r.trigger, r.from)) {
                return Err(MachineError::Duplicate {
                    trigger: r.trigger,
                    from: r.from,
                });
            }
        }

        let forward = self.reachable_from(TrialState::Standby, |r| (r.from, r.to));
        if let Some(s) = TrialState::ALL.into_iter().find(|s| !forward.contains(s)) {
            return Err(MachineError::Unreachable(s));
        }
        let backward = self.reachable_from(TrialState::Standby, |r| (r.to, r.from));
        if let Some(s) = TrialState::ALL.into_iter().find(|s| !backward.contains(s)) {
            return Err(MachineError::NoWayBack(s));
        }

        for s in TrialState::ALL.into_iter().filter(TrialState::is_timed) {
            if self.target(Trigger::Restart, s) != Some(TrialState::Standby) {
                return Err(MachineError::MissingRestart(s));
            }
        }
        Ok(())
    }

    fn reachable_from(
        &self,
        start: TrialState,
        edge: impl Fn(&Transition) -> (TrialState, TrialState),
    ) -> HashSet<TrialState> {
        let mut seen = HashSet::from([start]);
        let mut todo = VecDeque::from([start]);
        while let Some(s) = todo.pop_front() {
            for (a, b) in self.rows.iter().map(&edge) {
                if a == s && seen.insert(b) {
                    todo.push_back(b);
                }
            }
        }
        seen
    }

    pub fn target(&self, trigger: Trigger, from: TrialState) -> Option<TrialState> {
        self.rows
            .iter()
            .find(|r| r.trigger == trigger && r.from == from)
            .map(|r| r.to)
    }

    pub fn rows(&self) -> &[Transition] {
        &self.rows
    }
}

/// Mutable trial bookkeeping owned by the controller.
#[derive(Debug, Default)]
pub struct TrialData {
    pub counters: SessionCounters,
    pub flags: ErrorFlags,
    pub card: Option<TrialCard>,
    pub distance_buffer: f64,
    pub distance_diff: f64,
    /// Set once per state entry so a reset encoder is counted once.
    pub sensor_fault_latched: bool,
    pub outcome: Option<TrialOutcome>,
    pub results: Vec<TrialResult>,
}

/// What hooks and the per-tick evaluation get to touch.
pub struct TrialContext<'a> {
    pub config: &'a SessionConfig,
    pub data: &'a mut TrialData,
    pub rig: &'a mut Rig,
    pub log: &'a dyn TrialLog,
    pub now_ns: u64,
}

impl TrialContext<'_> {
    fn emit(&self, category: LogCategory, message: &str) {
        self.log.emit(self.now_ns, category, message);
    }

    /// Snapshot the treadmill as the new distance baseline.
    fn snapshot_distance(&mut self) {
        let d = self.rig.sensor.current_cumulative_distance();
        self.data.distance_buffer = d;
        self.data.distance_diff = 0.0;
        self.data.sensor_fault_latched = false;
        self.emit(LogCategory::Treadmill, &d.to_string());
    }

    /// Distance travelled since the last snapshot, compared to `required`.
    ///
    /// A negative or non-finite delta means the encoder was reset; it is
    /// logged once per state entry and never counts as progress.
    fn distance_reached(&mut self, required: f64) -> bool {
        let live = self.rig.sensor.current_cumulative_distance();
        let diff = live - self.data.distance_buffer;
        self.data.distance_diff = diff;
        if !(diff >= 0.0) {
            if !self.data.sensor_fault_latched {
                self.data.sensor_fault_latched = true;
                self.data.counters.sensor_faults += 1;
                self.emit(LogCategory::Sensor, &format!("distance_reset;{diff}"));
            }
            return false;
        }
        diff >= required
    }

    fn cue_on(&mut self) {
        if let Some(card) = self.data.card {
            self.rig.cue.set(card.cue, true);
            self.emit(LogCategory::Cue, &format!("{}_on", card.cue.as_str()));
        }
    }

    fn cue_off(&mut self) {
        if let Some(card) = self.data.card {
            self.rig.cue.set(card.cue, false);
            self.emit(LogCategory::Cue, &format!("{}_off", card.cue.as_str()));
        }
    }
}

type Hook = fn(&mut TrialContext<'_>);

#[derive(Clone, Copy)]
struct StateHooks {
    on_enter: Hook,
    on_exit: Hook,
}

fn enter_standby(ctx: &mut TrialContext<'_>) {
    ctx.emit(LogCategory::Transition, "enter_standby");
    let threshold = ctx.config.lick_threshold;
    if ctx.data.flags.reward_error && ctx.data.counters.lick_count < threshold {
        ctx.emit(LogCategory::Error, "lick_error");
        ctx.data.flags.reward_error = false;
    }

    if let Some(card) = ctx.data.card.take() {
        let outcome = ctx.data.outcome.take().unwrap_or(TrialOutcome::Aborted);
        ctx.data.results.push(TrialResult {
            trial_id: ctx.data.counters.trial_number,
            card,
            outcome,
            lick_count: ctx.data.counters.lick_count,
            timestamp_ns: ctx.now_ns,
        });
    }

    ctx.data.counters.reset_trial();
    let c = &ctx.data.counters;
    info!(
        trial = c.trial_number,
        total_reward = c.total_reward,
        errors = c.error_count(),
        "total reward up till current session: {}",
        c.total_reward
    );
    ctx.emit(LogCategory::Trial, &format!("trial_{}", c.trial_number));
}

fn exit_standby(ctx: &mut TrialContext<'_>) {
    ctx.emit(LogCategory::Transition, "exit_standby");
    ctx.data.flags.error_repeat = false;
    ctx.data.counters.trial_number += 1;
}

fn enter_initiate(ctx: &mut TrialContext<'_>) {
    ctx.emit(LogCategory::Transition, "enter_initiate");
    ctx.snapshot_distance();
}

fn exit_initiate(ctx: &mut TrialContext<'_>) {
    ctx.emit(LogCategory::Transition, "exit_initiate");
    if ctx.data.flags.initiate_error {
        ctx.emit(LogCategory::Error, "initiate_error");
        ctx.data.flags.initiate_error = false;
        ctx.data.flags.error_repeat = true;
        ctx.data.counters.errors.initiate += 1;
    }
}

fn enter_cue_state(ctx: &mut TrialContext<'_>) {
    ctx.emit(LogCategory::Transition, "enter_cue_state");
    ctx.cue_on();
    ctx.snapshot_distance();
}

fn exit_cue_state(ctx: &mut TrialContext<'_>) {
    ctx.emit(LogCategory::Transition, "exit_cue_state");
    ctx.cue_off();
    if ctx.data.flags.cue_state_error {
        ctx.emit(LogCategory::Error, "cue_state_error");
        ctx.data.flags.cue_state_error = false;
        ctx.data.flags.error_repeat = true;
        ctx.data.counters.errors.cue_state += 1;
    }
}

fn enter_reward_available(ctx: &mut TrialContext<'_>) {
    ctx.emit(LogCategory::Transition, "enter_reward_available");
    debug!(trial = ctx.data.counters.trial_number, "cue_state distance satisfied");
    ctx.cue_off();
}

fn exit_reward_available(ctx: &mut TrialContext<'_>) {
    ctx.emit(LogCategory::Transition, "exit_reward_available");
    if ctx.data.flags.reward_error {
        if let Some(err) = ctx.data.flags.choice.take() {
            ctx.emit(LogCategory::Error, err.as_str());
            ctx.data.counters.errors.add_choice(err);
        }
        ctx.data.flags.error_repeat = true;
    }
    ctx.data.flags.choice = None;
}

fn standard_hooks() -> [StateHooks; 4] {
    [
        StateHooks {
            on_enter: enter_standby,
            on_exit: exit_standby,
        },
        StateHooks {
            on_enter: enter_initiate,
            on_exit: exit_initiate,
        },
        StateHooks {
            on_enter: enter_cue_state,
            on_exit: exit_cue_state,
        },
        StateHooks {
            on_enter: enter_reward_available,
            on_exit: exit_reward_available,
        },
    ]
}

pub struct TrialStateMachine {
    state: TrialState,
    table: TransitionTable,
    hooks: [StateHooks; 4],
}

impl TrialStateMachine {
    pub fn new() -> Result<Self, MachineError> {
        Ok(Self::with_table(TransitionTable::standard()?))
    }

    pub fn with_table(table: TransitionTable) -> Self {
        Self {
            state: TrialState::Standby,
            table,
            hooks: standard_hooks(),
        }
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn can_fire(&self, trigger: Trigger) -> bool {
        self.table.target(trigger, self.state).is_some()
    }

    /// Applies `trigger`: exit hook of the current state, state change, entry
    /// hook of the new state.
    pub fn fire(
        &mut self,
        trigger: Trigger,
        ctx: &mut TrialContext<'_>,
    ) -> Result<TrialState, MachineError> {
        let from = self.state;
        let to = self
            .table
            .target(trigger, from)
            .ok_or(MachineError::InvalidTrigger {
                trigger,
                state: from,
            })?;
        (self.hooks[from.index()].on_exit)(ctx);
        self.state = to;
        (self.hooks[to.index()].on_enter)(ctx);
        debug!(%trigger, %from, %to, "transition");
        Ok(to)
    }

    /// Per-tick guard evaluation. Returns the trigger to fire, if any.
    ///
    /// `lick` is the lick-port event offered to this tick; it is only
    /// consumed in `RewardAvailable`.
    pub fn evaluate(&self, ctx: &mut TrialContext<'_>, lick: Option<Side>) -> Option<Trigger> {
        match self.state {
            TrialState::Standby => None,
            TrialState::Initiate => {
                let required = ctx.config.distances.initiation;
                if ctx.distance_reached(required) {
                    ctx.data.flags.initiate_error = false;
                    Some(Trigger::StartCue)
                } else {
                    ctx.data.flags.initiate_error = true;
                    ctx.data.flags.error_repeat = true;
                    None
                }
            }
            TrialState::CueState => {
                let Some(card) = ctx.data.card else {
                    warn!("cue state without a card");
                    return None;
                };
                let required = ctx.config.distances.required(card.distance);
                if ctx.distance_reached(required) {
                    ctx.data.flags.cue_state_error = false;
                    Some(Trigger::EvaluateReward)
                } else {
                    ctx.data.flags.cue_state_error = true;
                    ctx.data.flags.error_repeat = true;
                    None
                }
            }
            TrialState::RewardAvailable => evaluate_choice(ctx, lick),
        }
    }
}

fn evaluate_choice(ctx: &mut TrialContext<'_>, lick: Option<Side>) -> Option<Trigger> {
    let Some(card) = ctx.data.card else {
        warn!("reward window without a card");
        return None;
    };
    let Some(side) = lick else {
        ctx.data.flags.mark_choice(ChoiceError::NoChoice);
        return None;
    };
    ctx.emit(LogCategory::Action, &format!("lick_{}", side.as_str()));

    if !card.rewards(side) {
        return Some(choice_error(ctx, ChoiceError::WrongChoice));
    }

    let counters = &mut ctx.data.counters;
    if counters.lick_count == 0 {
        let size = card.reward_for(side);
        let volume = ctx.config.reward_volume.volume(size);
        ctx.rig.pump.dispense(side, volume);
        counters.side_buffer = Some(side);
        counters.lick_count = 1;
        ctx.data.outcome = Some(TrialOutcome::Rewarded { side, size });
        ctx.emit(
            LogCategory::Reward,
            &format!("reward_{};{:?};{volume}", side.as_str(), size).to_lowercase(),
        );
    } else if counters.side_buffer != Some(side) {
        // Free choice: both ports reward, but only the first one is kept.
        return Some(choice_error(ctx, ChoiceError::MultipleChoice));
    } else {
        counters.lick_count += 1;
    }

    debug!(licks = ctx.data.counters.lick_count, "number of licks detected");
    if ctx.data.counters.lick_count >= ctx.config.lick_threshold {
        ctx.data.counters.total_reward += 1;
        ctx.data.flags.error_repeat = false;
        ctx.data.flags.reward_error = false;
        ctx.data.flags.choice = None;
        return Some(Trigger::Restart);
    }
    None
}

fn choice_error(ctx: &mut TrialContext<'_>, err: ChoiceError) -> Trigger {
    ctx.data.flags.mark_choice(err);
    ctx.data.outcome = Some(TrialOutcome::Choice(err));
    Trigger::Restart
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLog;
    use crate::sim::SimRig;
    use rigex_core::{Cue, DistanceCondition, RewardSize};

    struct Harness {
        machine: TrialStateMachine,
        data: TrialData,
        rig: Rig,
        sim: SimRig,
        log: MemoryLog,
        config: SessionConfig,
    }

    impl Harness {
        fn new(lick_threshold: u32) -> Self {
            let sim = SimRig::new();
            let config = SessionConfig {
                lick_threshold,
                ..SessionConfig::default()
            };
            Self {
                machine: TrialStateMachine::new().unwrap(),
                data: TrialData::default(),
                rig: sim.rig(),
                sim,
                log: MemoryLog::new(),
                config,
            }
        }

        fn fire(&mut self, trigger: Trigger) -> Result<TrialState, MachineError> {
            let mut ctx = TrialContext {
                config: &self.config,
                data: &mut self.data,
                rig: &mut self.rig,
                log: &self.log,
                now_ns: 0,
            };
            self.machine.fire(trigger, &mut ctx)
        }

        fn evaluate(&mut self, lick: Option<Side>) -> Option<Trigger> {
            let mut ctx = TrialContext {
                config: &self.config,
                data: &mut self.data,
                rig: &mut self.rig,
                log: &self.log,
                now_ns: 0,
            };
            self.machine.evaluate(&mut ctx, lick)
        }

        fn enter_reward(&mut self, card: TrialCard) {
            self.data.card = Some(card);
            self.fire(Trigger::StartTrial).unwrap();
            self.fire(Trigger::StartCue).unwrap();
            self.fire(Trigger::EvaluateReward).unwrap();
        }
    }

    fn card(cue: Cue, side: Side, reward: RewardSize) -> TrialCard {
        TrialCard::new(cue, DistanceCondition::Short, side, reward)
    }

    #[test]
    fn standard_table_is_valid() {
        let table = TransitionTable::standard().unwrap();
        assert_eq!(table.rows().len(), 6);
        assert_eq!(
            table.target(Trigger::Restart, TrialState::CueState),
            Some(TrialState::Standby)
        );
        assert_eq!(table.target(Trigger::Restart, TrialState::Standby), None);
    }

    #[test]
    fn table_without_restart_is_rejected() {
        use TrialState::*;
        let rows = vec![
            Transition {
                trigger: Trigger::StartTrial,
                from: Standby,
                to: Initiate,
            },
            Transition {
                trigger: Trigger::StartCue,
                from: Initiate,
                to: CueState,
            },
            Transition {
                trigger: Trigger::EvaluateReward,
                from: CueState,
                to: RewardAvailable,
            },
            Transition {
                trigger: Trigger::Restart,
                from: RewardAvailable,
                to: Standby,
            },
        ];
        assert_eq!(
            TransitionTable::new(rows).unwrap_err(),
            MachineError::MissingRestart(Initiate)
        );
    }

    #[test]
    fn table_with_unreachable_state_is_rejected() {
        use TrialState::*;
        let rows = vec![
            Transition {
                trigger: Trigger::StartTrial,
                from: Standby,
                to: Initiate,
            },
            Transition {
                trigger: Trigger::Restart,
                from: Initiate,
                to: Standby,
            },
        ];
        assert_eq!(
            TransitionTable::new(rows).unwrap_err(),
            MachineError::Unreachable(CueState)
        );
    }

    #[test]
    fn duplicate_rows_are_rejected() {
        use TrialState::*;
        let rows = vec![
            Transition {
                trigger: Trigger::StartTrial,
                from: Standby,
                to: Initiate,
            },
            Transition {
                trigger: Trigger::StartTrial,
                from: Standby,
                to: CueState,
            },
        ];
        assert!(matches!(
            TransitionTable::new(rows),
            Err(MachineError::Duplicate { .. })
        ));
    }

    #[test]
    fn invalid_trigger_leaves_state_untouched() {
        let mut h = Harness::new(1);
        let err = h.fire(Trigger::Restart).unwrap_err();
        assert_eq!(
            err,
            MachineError::InvalidTrigger {
                trigger: Trigger::Restart,
                state: TrialState::Standby
            }
        );
        assert_eq!(h.machine.state(), TrialState::Standby);
        assert!(h.log.records().is_empty());
    }

    #[test]
    fn initiate_waits_for_distance() {
        let mut h = Harness::new(1);
        h.data.card = Some(card(Cue::Sound, Side::Left, RewardSize::Small));
        h.fire(Trigger::StartTrial).unwrap();
        h.sim.treadmill.advance(4.0);
        assert_eq!(h.evaluate(None), None);
        assert!(h.data.flags.initiate_error && h.data.flags.error_repeat);
        h.sim.treadmill.advance(6.0);
        assert_eq!(h.evaluate(None), Some(Trigger::StartCue));
        assert!(!h.data.flags.initiate_error);
    }

    #[test]
    fn encoder_reset_is_a_sensor_fault_not_progress() {
        let mut h = Harness::new(1);
        h.sim.treadmill.set(50.0);
        h.data.card = Some(card(Cue::Sound, Side::Left, RewardSize::Small));
        h.fire(Trigger::StartTrial).unwrap();
        h.sim.treadmill.set(0.0);
        assert_eq!(h.evaluate(None), None);
        assert_eq!(h.evaluate(None), None);
        assert_eq!(h.data.counters.sensor_faults, 1);
        assert!(h.data.distance_diff < 0.0);
        assert_eq!(h.log.messages(LogCategory::Sensor), vec!["distance_reset;-50"]);
    }

    #[test]
    fn cue_is_switched_on_and_off() {
        let mut h = Harness::new(1);
        h.enter_reward(card(Cue::Led, Side::Left, RewardSize::Small));
        assert_eq!(
            h.sim.cue.commands(),
            vec![(Cue::Led, true), (Cue::Led, false), (Cue::Led, false)]
        );
    }

    #[test]
    fn wrong_side_restarts_and_counts_on_exit() {
        let mut h = Harness::new(2);
        h.enter_reward(card(Cue::Sound, Side::Left, RewardSize::Small));
        assert_eq!(h.evaluate(None), None);
        assert!(h.data.flags.no_choice_error());
        assert_eq!(h.evaluate(Some(Side::Right)), Some(Trigger::Restart));
        assert!(h.data.flags.wrong_choice_error());
        h.fire(Trigger::Restart).unwrap();
        assert_eq!(h.data.counters.errors.wrong_choice, 1);
        assert_eq!(h.data.counters.errors.no_choice, 0);
        assert!(h.data.flags.error_repeat);
        assert!(h.sim.pump.dispensed().is_empty());
        assert_eq!(
            h.data.results[0].outcome,
            TrialOutcome::Choice(ChoiceError::WrongChoice)
        );
    }

    #[test]
    fn free_choice_inverts_reward_volume() {
        let mut h = Harness::new(1);
        h.enter_reward(card(Cue::SoundAndLed, Side::Left, RewardSize::Large));
        assert_eq!(h.evaluate(Some(Side::Right)), Some(Trigger::Restart));
        assert_eq!(
            h.sim.pump.dispensed(),
            vec![(Side::Right, h.config.reward_volume.small)]
        );
        assert_eq!(h.data.counters.total_reward, 1);
    }

    #[test]
    fn switching_ports_after_first_lick_is_multiple_choice() {
        let mut h = Harness::new(3);
        h.enter_reward(card(Cue::SoundAndLed, Side::Left, RewardSize::Large));
        assert_eq!(h.evaluate(Some(Side::Left)), None);
        assert_eq!(h.evaluate(Some(Side::Right)), Some(Trigger::Restart));
        h.fire(Trigger::Restart).unwrap();
        assert_eq!(h.data.counters.errors.multiple_choice, 1);
        assert_eq!(h.data.counters.total_reward, 0);
        assert_eq!(h.sim.pump.dispensed().len(), 1);
        assert_eq!(h.log.count(LogCategory::Error, "lick_error"), 1);
        assert_eq!(h.data.counters.lick_count, 0);
        assert_eq!(h.data.counters.side_buffer, None);
    }

    #[test]
    fn wrong_port_after_credited_lick_is_wrong_choice() {
        let mut h = Harness::new(3);
        h.enter_reward(card(Cue::Sound, Side::Left, RewardSize::Large));
        assert_eq!(h.evaluate(Some(Side::Left)), None);
        assert_eq!(h.evaluate(Some(Side::Right)), Some(Trigger::Restart));
        h.fire(Trigger::Restart).unwrap();
        assert_eq!(h.data.counters.errors.wrong_choice, 1);
        assert_eq!(h.data.counters.errors.multiple_choice, 0);
        assert_eq!(h.sim.pump.dispensed().len(), 1);
    }

    #[test]
    fn completed_trial_clears_pending_no_choice() {
        let mut h = Harness::new(2);
        h.enter_reward(card(Cue::Led, Side::Right, RewardSize::Small));
        h.evaluate(Some(Side::Right));
        h.evaluate(None);
        assert!(h.data.flags.no_choice_error());
        assert_eq!(h.evaluate(Some(Side::Right)), Some(Trigger::Restart));
        h.fire(Trigger::Restart).unwrap();
        assert_eq!(h.data.counters.error_count(), 0);
        assert!(!h.data.flags.error_repeat);
        assert_eq!(h.data.flags, ErrorFlags::default());
    }

    #[test]
    fn exit_standby_numbers_trials() {
        let mut h = Harness::new(1);
        h.data.flags.error_repeat = true;
        h.data.card = Some(card(Cue::Sound, Side::Left, RewardSize::Small));
        h.fire(Trigger::StartTrial).unwrap();
        assert_eq!(h.data.counters.trial_number, 1);
        assert!(!h.data.flags.error_repeat);
    }
}
