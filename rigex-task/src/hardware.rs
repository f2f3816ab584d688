//! Narrow interfaces to the rig hardware. Every command is fire-and-forget.

use rigex_core::{Cue, Side};

pub trait LocomotionSensor: Send {
    /// Cumulative treadmill distance in cm; monotonic unless the encoder resets.
    fn current_cumulative_distance(&mut self) -> f64;
}

pub trait RewardActuator: Send {
    fn dispense(&mut self, port: Side, volume_ul: f64);
}

pub trait CueActuator: Send {
    fn set(&mut self, cue: Cue, on: bool);
}

pub trait StimulusRenderer: Send {
    fn set_side_stimulus(&mut self, side: Side, on: bool);
}

pub trait VideoRecorder: Send {
    fn start(&mut self);
    fn stop(&mut self);
}

/// Rig without a camera.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVideo;

impl VideoRecorder for NoVideo {
    fn start(&mut self) {}
    fn stop(&mut self) {}
}

/// The actuators and sensors driven from trial transitions.
pub struct Rig {
    pub sensor: Box<dyn LocomotionSensor>,
    pub pump: Box<dyn RewardActuator>,
    pub cue: Box<dyn CueActuator>,
    pub video: Box<dyn VideoRecorder>,
}

impl Rig {
    pub fn new(
        sensor: impl LocomotionSensor + 'static,
        pump: impl RewardActuator + 'static,
        cue: impl CueActuator + 'static,
    ) -> Self {
        Self {
            sensor: Box::new(sensor),
            pump: Box::new(pump),
            cue: Box::new(cue),
            video: Box::new(NoVideo),
        }
    }

    pub fn with_video(mut self, video: impl VideoRecorder + 'static) -> Self {
        self.video = Box::new(video);
        self
    }
}
