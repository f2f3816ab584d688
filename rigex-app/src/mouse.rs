//! A scripted animal for dry runs: it keeps running, licks at random and
//! wanders into the side patches now and then.

use rand::Rng;
use rand::rngs::StdRng;
use rigex_core::{HwEvent, Side};
use rigex_task::sim::SimTreadmill;
use std::sync::mpsc::Sender;

pub struct SimMouse {
    treadmill: SimTreadmill,
    events: Sender<HwEvent>,
    rng: StdRng,
    cm_per_step: f64,
    lick_probability: f64,
    patch_probability: f64,
    /// Port the mouse currently favours; it sometimes changes its mind.
    preferred: Side,
}

impl SimMouse {
    pub fn new(treadmill: SimTreadmill, events: Sender<HwEvent>, rng: StdRng) -> Self {
        Self {
            treadmill,
            events,
            rng,
            cm_per_step: 0.2,
            lick_probability: 0.05,
            patch_probability: 0.002,
            preferred: Side::Left,
        }
    }

    /// One step of behaviour. Returns `false` once nobody is listening.
    pub fn step(&mut self) -> bool {
        let jitter: f64 = self.rng.random_range(0.5..1.5);
        self.treadmill.advance(self.cm_per_step * jitter);

        if self.rng.random_bool(0.01) {
            self.preferred = self.preferred.opposite();
        }
        if self.rng.random_bool(self.lick_probability)
            && self.events.send(HwEvent::lick(self.preferred)).is_err()
        {
            return false;
        }
        if self.rng.random_bool(self.patch_probability) {
            let patch = if self.rng.random_bool(0.5) {
                HwEvent::LeftPatch
            } else {
                HwEvent::RightPatch
            };
            return self.events.send(patch).is_ok();
        }
        true
    }
}
