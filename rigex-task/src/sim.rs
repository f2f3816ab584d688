//! In-memory rig used for dry runs and tests. Clones share state, so a test
//! can keep a handle while the controller owns the boxed collaborator.

use crate::hardware::{
    CueActuator, LocomotionSensor, RewardActuator, Rig, StimulusRenderer, VideoRecorder,
};
use rigex_core::{Cue, Side};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default)]
pub struct SimTreadmill {
    distance: Arc<Mutex<f64>>,
}

impl SimTreadmill {
    pub fn advance(&self, cm: f64) {
        *lock(&self.distance) += cm;
    }

    /// Jump to an absolute reading, e.g. to emulate an encoder reset.
    pub fn set(&self, cm: f64) {
        *lock(&self.distance) = cm;
    }

    pub fn distance(&self) -> f64 {
        *lock(&self.distance)
    }
}

impl LocomotionSensor for SimTreadmill {
    fn current_cumulative_distance(&mut self) -> f64 {
        self.distance()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingPump {
    dispensed: Arc<Mutex<Vec<(Side, f64)>>>,
}

impl RecordingPump {
    pub fn dispensed(&self) -> Vec<(Side, f64)> {
        lock(&self.dispensed).clone()
    }
}

impl RewardActuator for RecordingPump {
    fn dispense(&mut self, port: Side, volume_ul: f64) {
        debug!(port = port.port(), volume_ul, "pump");
        lock(&self.dispensed).push((port, volume_ul));
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingCue {
    commands: Arc<Mutex<Vec<(Cue, bool)>>>,
}

impl RecordingCue {
    pub fn commands(&self) -> Vec<(Cue, bool)> {
        lock(&self.commands).clone()
    }

    /// State implied by the last command sent for `cue`.
    pub fn is_on(&self, cue: Cue) -> bool {
        lock(&self.commands)
            .iter()
            .rev()
            .find(|(c, _)| *c == cue)
            .is_some_and(|(_, on)| *on)
    }
}

impl CueActuator for RecordingCue {
    fn set(&mut self, cue: Cue, on: bool) {
        lock(&self.commands).push((cue, on));
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    commands: Arc<Mutex<Vec<(Side, bool)>>>,
}

impl RecordingRenderer {
    pub fn commands(&self) -> Vec<(Side, bool)> {
        lock(&self.commands).clone()
    }
}

impl StimulusRenderer for RecordingRenderer {
    fn set_side_stimulus(&mut self, side: Side, on: bool) {
        lock(&self.commands).push((side, on));
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingVideo {
    running: Arc<AtomicBool>,
    starts: Arc<AtomicU32>,
}

impl RecordingVideo {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }
}

impl VideoRecorder for RecordingVideo {
    fn start(&mut self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Handles to every simulated collaborator.
#[derive(Debug, Clone, Default)]
pub struct SimRig {
    pub treadmill: SimTreadmill,
    pub pump: RecordingPump,
    pub cue: RecordingCue,
    pub renderer: RecordingRenderer,
    pub video: RecordingVideo,
}

impl SimRig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rig(&self) -> Rig {
        Rig::new(self.treadmill.clone(), self.pump.clone(), self.cue.clone())
            .with_video(self.video.clone())
    }

    pub fn renderer(&self) -> Box<dyn StimulusRenderer> {
        Box::new(self.renderer.clone())
    }
}
