//! [`crate::traits::Scheduler`] implementations (spec.md §6 "Scheduler",
//! §5 event-loop dispatch notes).
//!
//! `ThreadScheduler` runs real timers on a background thread and delivers
//! firings over a channel, avoiding the self-referential-closure problem
//! noted in SPEC_FULL.md §5: the core never hands a closure capturing its
//! own `&mut self` across this boundary, it only reads fired events back out
//! of the channel on its own thread and dispatches them itself.

use crate::traits::{Scheduler, TimeoutEvent, TimeoutId};
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

/// Real scheduler backed by a detached timer thread per timeout.
pub struct ThreadScheduler {
    next_id: u64,
    live: HashSet<u64>,
    tx: Sender<(TimeoutId, TimeoutEvent)>,
    rx: Receiver<(TimeoutId, TimeoutEvent)>,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        ThreadScheduler { next_id: 0, live: HashSet::new(), tx, rx }
    }

    /// Drain whatever timeouts have fired since the last call without
    /// blocking. The host's event loop calls this on every tick and
    /// dispatches each event back into `ReferenceTracker`.
    pub fn poll(&mut self) -> Vec<(TimeoutId, TimeoutEvent)> {
        let mut fired = Vec::new();
        while let Ok((id, event)) = self.rx.try_recv() {
            if self.live.remove(&id.0) {
                fired.push((id, event));
            }
        }
        fired
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn add_timeout(&mut self, delay: Duration, event: TimeoutEvent) -> TimeoutId {
        let id = TimeoutId(self.next_id);
        self.next_id += 1;
        self.live.insert(id.0);

        let tx = self.tx.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            let _ = tx.send((id, event));
        });

        id
    }

    fn remove_timeout(&mut self, id: TimeoutId) {
        self.live.remove(&id.0);
    }
}

/// Deterministic test double: timeouts never fire on their own, a test
/// advances them explicitly with [`ManualScheduler::fire_due`].
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: u64,
    pending: Vec<(TimeoutId, Duration, TimeoutEvent)>,
    elapsed: Duration,
}

impl ManualScheduler {
    pub fn new() -> Self {
        ManualScheduler::default()
    }

    /// Advance simulated time and return every event now due, in the order
    /// their deadlines were reached.
    pub fn advance(&mut self, by: Duration) -> Vec<TimeoutEvent> {
        self.elapsed += by;
        let elapsed = self.elapsed;
        let mut due: Vec<(Duration, TimeoutEvent)> = self
            .pending
            .iter()
            .filter(|(_, deadline, _)| *deadline <= elapsed)
            .map(|(_, deadline, event)| (*deadline, *event))
            .collect();
        due.sort_by_key(|(deadline, _)| *deadline);
        self.pending.retain(|(_, deadline, _)| *deadline > elapsed);
        due.into_iter().map(|(_, event)| event).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Scheduler for ManualScheduler {
    fn add_timeout(&mut self, delay: Duration, event: TimeoutEvent) -> TimeoutId {
        let id = TimeoutId(self.next_id);
        self.next_id += 1;
        self.pending.push((id, self.elapsed + delay, event));
        id
    }

    fn remove_timeout(&mut self, id: TimeoutId) {
        self.pending.retain(|(pending_id, _, _)| *pending_id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_scheduler_fires_when_due() {
        let mut sched = ManualScheduler::new();
        sched.add_timeout(Duration::from_secs(10), TimeoutEvent::FallbackDrift);
        assert!(sched.advance(Duration::from_secs(5)).is_empty());
        let fired = sched.advance(Duration::from_secs(5));
        assert_eq!(fired, vec![TimeoutEvent::FallbackDrift]);
    }

    #[test]
    fn manual_scheduler_removed_timeout_never_fires() {
        let mut sched = ManualScheduler::new();
        let id = sched.add_timeout(Duration::from_secs(1), TimeoutEvent::FallbackDrift);
        sched.remove_timeout(id);
        assert!(sched.advance(Duration::from_secs(10)).is_empty());
        assert_eq!(sched.pending_count(), 0);
    }

    #[test]
    fn thread_scheduler_poll_is_empty_before_firing() {
        let mut sched = ThreadScheduler::new();
        sched.add_timeout(Duration::from_secs(60), TimeoutEvent::FallbackDrift);
        assert!(sched.poll().is_empty());
    }

    #[test]
    fn thread_scheduler_removed_timeout_is_dropped_from_poll() {
        let mut sched = ThreadScheduler::new();
        let id = sched.add_timeout(Duration::from_millis(10), TimeoutEvent::FallbackDrift);
        sched.remove_timeout(id);
        thread::sleep(Duration::from_millis(30));
        assert!(sched.poll().is_empty());
    }
}
