use rigex_core::{HwEvent, Side, SignalError};
use std::collections::VecDeque;
use std::sync::mpsc::Receiver;

/// Non-blocking producer of hardware events, polled once per tick.
pub trait EventSource: Send {
    fn poll_event(&mut self) -> Option<HwEvent>;
}

impl EventSource for Receiver<HwEvent> {
    fn poll_event(&mut self) -> Option<HwEvent> {
        self.try_recv().ok()
    }
}

/// Events handed to one control tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickEvents {
    /// First queued lick-port event, if any.
    pub lick: Option<Side>,
    /// Key presses and patch entries, in arrival order.
    pub control: Vec<HwEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Queued {
    seq: u64,
    event: HwEvent,
}

/// FIFO of hardware events.
///
/// Each tick takes every session-control event plus the oldest lick. Later
/// licks stay queued, in order, for the following ticks.
#[derive(Debug, Default)]
pub struct EventQueue {
    queue: VecDeque<Queued>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event` and returns its arrival sequence number.
    pub fn push(&mut self, event: HwEvent) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push_back(Queued { seq, event });
        seq
    }

    /// Decodes a named GPIO signal and queues it.
    pub fn push_signal(&mut self, name: &str) -> Result<u64, SignalError> {
        let event: HwEvent = name.parse()?;
        Ok(self.push(event))
    }

    pub fn fill_from(&mut self, source: &mut dyn EventSource) -> usize {
        let mut n = 0;
        while let Some(event) = source.poll_event() {
            self.push(event);
            n += 1;
        }
        n
    }

    pub fn drain_tick(&mut self) -> TickEvents {
        let mut out = TickEvents::default();
        let mut kept = VecDeque::with_capacity(self.queue.len());
        for q in self.queue.drain(..) {
            if q.event.is_session_control() {
                out.control.push(q.event);
            } else if out.lick.is_none() {
                out.lick = q.event.lick_side();
            } else {
                kept.push_back(q);
            }
        }
        self.queue = kept;
        out
    }

    /// Sequence number of the oldest queued event.
    pub fn front_seq(&self) -> Option<u64> {
        self.queue.front().map(|q| q.seq)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn one_lick_per_tick_in_arrival_order() {
        let mut q = EventQueue::new();
        q.push(HwEvent::LeftEntry);
        q.push(HwEvent::RightEntry);
        q.push(HwEvent::LeftEntry);

        assert_eq!(q.drain_tick().lick, Some(Side::Left));
        assert_eq!(q.front_seq(), Some(1));
        assert_eq!(q.drain_tick().lick, Some(Side::Right));
        assert_eq!(q.drain_tick().lick, Some(Side::Left));
        assert_eq!(q.drain_tick(), TickEvents::default());
    }

    #[test]
    fn control_events_are_drained_every_tick() {
        let mut q = EventQueue::new();
        q.push(HwEvent::LeftEntry);
        q.push(HwEvent::KeyPress('q'));
        q.push(HwEvent::RightEntry);
        q.push(HwEvent::RightPatch);

        let tick = q.drain_tick();
        assert_eq!(tick.lick, Some(Side::Left));
        assert_eq!(tick.control, vec![HwEvent::KeyPress('q'), HwEvent::RightPatch]);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn fills_from_channel_without_blocking() {
        let (tx, mut rx) = mpsc::channel();
        tx.send(HwEvent::LeftEntry).unwrap();
        tx.send(HwEvent::KeyPress('d')).unwrap();
        let mut q = EventQueue::new();
        assert_eq!(q.fill_from(&mut rx), 2);
        assert_eq!(q.fill_from(&mut rx), 0);
    }

    #[test]
    fn undecodable_signal_is_not_queued() {
        let mut q = EventQueue::new();
        assert!(q.push_signal("center_IR_entry").is_err());
        assert!(q.is_empty());
        assert_eq!(q.push_signal("right_IR_entry"), Ok(0));
    }
}
