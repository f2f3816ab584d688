use crate::config::Timeouts;
use rigex_core::TrialState;
use rigex_timing::{Schedule, TimerHandle, nanos};

/// Per-state deadline.
///
/// At most one deadline is armed at a time, tied to one state-entry instance.
/// Re-arming or cancelling bumps the generation, so an expiry observed for an
/// earlier entry can never force a restart of a later one.
#[derive(Debug)]
pub struct TimeoutScheduler {
    timeouts: Timeouts,
    schedule: Schedule<TrialState>,
    current: Option<TimerHandle>,
}

impl TimeoutScheduler {
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            timeouts,
            schedule: Schedule::new(),
            current: None,
        }
    }

    /// Arms the deadline for a fresh entry into `state`, replacing any other.
    pub fn arm(&mut self, state: TrialState, now_ns: u64) -> Option<TimerHandle> {
        self.cancel();
        let timeout = self.timeouts.for_state(state)?;
        let handle = self.schedule.arm(state, now_ns.saturating_add(nanos(timeout)));
        self.current = Some(handle);
        Some(handle)
    }

    pub fn cancel(&mut self) -> bool {
        match self.current.take() {
            Some(handle) => self.schedule.cancel(handle),
            None => false,
        }
    }

    /// The state whose deadline has elapsed, at most once per arming.
    pub fn poll(&mut self, now_ns: u64) -> Option<TrialState> {
        let mut fired = None;
        for expired in self.schedule.expire(now_ns) {
            let live = self.schedule.claim(expired.handle);
            if live && self.current == Some(expired.handle) {
                self.current = None;
                fired = Some(expired.key);
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> TimeoutScheduler {
        TimeoutScheduler::new(Timeouts {
            initiate_s: 1.0,
            cue_s: 2.0,
            reward_s: 3.0,
        })
    }

    #[test]
    fn standby_has_no_deadline() {
        let mut t = scheduler();
        assert_eq!(t.arm(TrialState::Standby, 0), None);
        assert_eq!(t.poll(u64::MAX), None);
    }

    #[test]
    fn fires_exactly_once() {
        let mut t = scheduler();
        t.arm(TrialState::Initiate, 0);
        assert_eq!(t.poll(999_999_999), None);
        assert_eq!(t.poll(1_000_000_000), Some(TrialState::Initiate));
        assert_eq!(t.poll(5_000_000_000), None);
    }

    #[test]
    fn rearm_on_next_state_discards_old_deadline() {
        let mut t = scheduler();
        let first = t.arm(TrialState::Initiate, 0).unwrap();
        let second = t.arm(TrialState::CueState, 500_000_000).unwrap();
        assert_ne!(first, second);
        assert_eq!(t.poll(1_500_000_000), None);
        assert_eq!(t.poll(2_500_000_000), Some(TrialState::CueState));
    }

    #[test]
    fn cancelled_deadline_never_fires() {
        let mut t = scheduler();
        t.arm(TrialState::RewardAvailable, 0);
        assert!(t.cancel());
        assert!(!t.cancel());
        assert_eq!(t.poll(10_000_000_000), None);
    }
}
