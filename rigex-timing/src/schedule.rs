//! One-shot timers with generation-tagged handles.
//!
//! A timer moves through three stages: armed, in flight (its deadline was
//! observed by [`Schedule::expire`]) and claimed. Cancelling at any point
//! before [`Schedule::claim`] turns the fire into a no-op, which is what lets
//! a callback that was already dequeued be revoked safely.

/// Identifies one arming of one timer. Never reused within a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    generation: u64,
}

/// A timer whose deadline has passed and that still has to be claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired<K> {
    pub key: K,
    pub handle: TimerHandle,
    pub deadline_ns: u64,
}

#[derive(Debug, Clone)]
struct Entry<K> {
    key: K,
    handle: TimerHandle,
    deadline_ns: u64,
    in_flight: bool,
}

#[derive(Debug, Clone)]
pub struct Schedule<K> {
    entries: Vec<Entry<K>>,
    next_generation: u64,
}

impl<K: Copy + PartialEq> Schedule<K> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_generation: 1,
        }
    }

    /// Arms `key` for `deadline_ns`. Any pending timer under the same key,
    /// in flight or not, is revoked first.
    pub fn arm(&mut self, key: K, deadline_ns: u64) -> TimerHandle {
        self.cancel_key(key);
        let handle = TimerHandle {
            generation: self.next_generation,
        };
        self.next_generation += 1;
        self.entries.push(Entry {
            key,
            handle,
            deadline_ns,
            in_flight: false,
        });
        handle
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.handle != handle);
        before != self.entries.len()
    }

    pub fn cancel_key(&mut self, key: K) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.key != key);
        before != self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Marks every timer due at `now_ns` as in flight and returns them in
    /// deadline order. A timer is reported once.
    pub fn expire(&mut self, now_ns: u64) -> Vec<Expired<K>> {
        let mut due: Vec<Expired<K>> = self
            .entries
            .iter_mut()
            .filter(|e| !e.in_flight && e.deadline_ns <= now_ns)
            .map(|e| {
                e.in_flight = true;
                Expired {
                    key: e.key,
                    handle: e.handle,
                    deadline_ns: e.deadline_ns,
                }
            })
            .collect();
        due.sort_by_key(|e| (e.deadline_ns, e.handle.generation));
        due
    }

    /// Consumes a fired timer. Returns `false` when it was cancelled or
    /// re-armed after it was reported, in which case the fire must be ignored.
    pub fn claim(&mut self, handle: TimerHandle) -> bool {
        match self.entries.iter().position(|e| e.handle == handle && e.in_flight) {
            Some(ix) => {
                self.entries.swap_remove(ix);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Copy + PartialEq> Default for Schedule<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Key {
        A,
        B,
    }

    #[test]
    fn fires_once_in_deadline_order() {
        let mut s = Schedule::new();
        s.arm(Key::B, 20);
        s.arm(Key::A, 10);
        assert!(s.expire(5).is_empty());
        let due = s.expire(25);
        assert_eq!(due.iter().map(|e| e.key).collect::<Vec<_>>(), vec![Key::A, Key::B]);
        assert!(s.expire(30).is_empty());
    }

    #[test]
    fn cancelled_in_flight_timer_cannot_be_claimed() {
        let mut s = Schedule::new();
        let h = s.arm(Key::A, 10);
        let due = s.expire(10);
        assert_eq!(due[0].handle, h);
        assert!(s.cancel(h));
        assert!(!s.claim(h));
    }

    #[test]
    fn rearming_revokes_previous_generation() {
        let mut s = Schedule::new();
        let first = s.arm(Key::A, 10);
        s.expire(10);
        let second = s.arm(Key::A, 50);
        assert_ne!(first, second);
        assert!(!s.claim(first));
        assert!(s.expire(49).is_empty());
        let due = s.expire(50);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].handle, second);
        assert!(s.claim(second));
        assert!(s.is_empty());
    }

    #[test]
    fn clear_drops_in_flight_timers() {
        let mut s = Schedule::new();
        let a = s.arm(Key::A, 1);
        s.arm(Key::B, 100);
        s.expire(10);
        s.clear();
        assert!(!s.claim(a));
        assert_eq!(s.len(), 0);
        assert!(s.expire(200).is_empty());
    }
}
