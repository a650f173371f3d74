//! # Event Scheduler
//!
//! A time-ordered queue of delayed side effects. Every peripheral that needs
//! to act "N cycles from now" (timer overflow, immediate DMA start, end of a
//! serial transfer) registers an event here instead of being polled.
//!
//! ```text
//!  counter ──► 100
//!
//!  queue:  [ 104: TimerOverflow(0) ][ 104: DmaStart(3) ][ 612: Serial ]
//!            ▲ fires first            ▲ same deadline,    ▲ later
//!                                       scheduled later
//! ```
//!
//! Ordering rules:
//! - events fire in non-decreasing deadline order;
//! - events sharing a deadline fire in the order they were scheduled;
//! - [`Scheduler::advance`] keeps draining until nothing is due, so an event
//!   fired during an advance may schedule another one that is already due and
//!   it will run before `advance` returns.
//!
//! Events are plain values (usually an enum) rather than closures. The owner
//! of the scheduler decides what an event does when it fires, which keeps the
//! borrow of the peripherals on the owner's side.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Identifies one scheduled event. Handles are never reused, so cancelling a
/// handle whose event already fired is a harmless no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventHandle(u64);

#[derive(Debug, Serialize, Deserialize)]
struct Entry<E> {
    deadline: u64,
    handle: EventHandle,
    event: E,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Scheduler<E> {
    counter: u64,
    next_handle: u64,
    queue: VecDeque<Entry<E>>,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counter: 0,
            next_handle: 0,
            queue: VecDeque::new(),
        }
    }

    /// Cycles elapsed since construction.
    #[must_use]
    pub const fn counter(&self) -> u64 {
        self.counter
    }

    /// Registers `event` to fire `delay` cycles from now.
    pub fn schedule(&mut self, delay: u64, event: E) -> EventHandle {
        let deadline = self.counter + delay;
        let handle = EventHandle(self.next_handle);
        self.next_handle += 1;

        // Inserting after every entry with the same deadline gives FIFO ties.
        let position = self.queue.partition_point(|e| e.deadline <= deadline);
        self.queue.insert(
            position,
            Entry {
                deadline,
                handle,
                event,
            },
        );

        handle
    }

    /// Removes the event if it is still pending. Returns whether something was removed.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.queue
            .iter()
            .position(|e| e.handle == handle)
            .and_then(|index| self.queue.remove(index))
            .is_some()
    }

    #[must_use]
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.queue.iter().any(|e| e.handle == handle)
    }

    /// Absolute deadline of a pending event.
    #[must_use]
    pub fn deadline(&self, handle: EventHandle) -> Option<u64> {
        self.queue
            .iter()
            .find(|e| e.handle == handle)
            .map(|e| e.deadline)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Moves time forward by one cycle without firing anything.
    /// Pair with [`Scheduler::pop_due`] when the caller must dispatch events
    /// with access to state the scheduler cannot borrow.
    pub const fn tick(&mut self) {
        self.counter += 1;
    }

    /// Takes the earliest event whose deadline has been reached.
    pub fn pop_due(&mut self) -> Option<E> {
        if self.queue.front()?.deadline <= self.counter {
            self.queue.pop_front().map(|e| e.event)
        } else {
            None
        }
    }

    /// Moves time forward by one cycle and fires every due event, including
    /// the ones scheduled as due by `fire` itself.
    pub fn advance<F>(&mut self, mut fire: F)
    where
        F: FnMut(E, &mut Self),
    {
        self.tick();
        while let Some(event) = self.pop_due() {
            fire(event, self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Ev {
        A,
        B,
        C,
        Periodic,
    }

    #[test]
    fn fires_on_the_tenth_advance() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(10, Ev::A);

        let mut fired = 0;
        for _ in 0..9 {
            scheduler.advance(|_, _| fired += 1);
        }
        assert_eq!(fired, 0);

        scheduler.advance(|_, _| fired += 1);
        assert_eq!(fired, 1);

        scheduler.advance(|_, _| fired += 1);
        assert_eq!(fired, 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn deadline_then_fifo_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(5, Ev::C);
        scheduler.schedule(2, Ev::A);
        scheduler.schedule(5, Ev::B);
        scheduler.schedule(2, Ev::B);

        let mut order = vec![];
        for _ in 0..5 {
            scheduler.advance(|e, s| order.push((s.counter(), e)));
        }

        assert_eq!(
            order,
            vec![(2, Ev::A), (2, Ev::B), (5, Ev::C), (5, Ev::B)]
        );
    }

    #[test]
    fn cancelled_event_never_fires() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(3, Ev::A);
        scheduler.schedule(3, Ev::B);

        scheduler.advance(|_, _| {});
        assert!(scheduler.is_pending(handle));
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));

        let mut fired = vec![];
        for _ in 0..10 {
            scheduler.advance(|e, _| fired.push(e));
        }
        assert_eq!(fired, vec![Ev::B]);
    }

    #[test]
    fn cancel_after_firing_is_noop() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(1, Ev::A);
        scheduler.advance(|_, _| {});
        let other = scheduler.schedule(1, Ev::B);

        assert!(!scheduler.cancel(handle));
        assert_eq!(scheduler.deadline(other), Some(2));
    }

    #[test]
    fn periodic_event_is_evenly_spaced() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(7, Ev::Periodic);

        let mut deadlines = vec![];
        for _ in 0..70 {
            scheduler.advance(|e, s| {
                deadlines.push(s.counter());
                s.schedule(7, e);
            });
        }

        assert_eq!(deadlines, (1..=10).map(|n| n * 7).collect::<Vec<u64>>());
    }

    #[test]
    fn zero_delay_from_callback_runs_in_same_advance() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(1, Ev::A);

        let mut fired = vec![];
        scheduler.advance(|e, s| {
            fired.push((s.counter(), e));
            if e == Ev::A {
                s.schedule(0, Ev::B);
            }
        });

        assert_eq!(fired, vec![(1, Ev::A), (1, Ev::B)]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn random_delays_come_out_sorted() {
        let mut scheduler = Scheduler::new();
        let mut expected = vec![];
        for id in 0..200_u32 {
            let delay = u64::from(rand::random::<u32>() % 64) + 1;
            scheduler.schedule(delay, id);
            expected.push((delay, id));
        }
        // Stable sort keeps insertion order on equal deadlines.
        expected.sort_by_key(|&(delay, _)| delay);

        let mut fired = vec![];
        for _ in 0..64 {
            scheduler.advance(|id, s| fired.push((s.counter(), id)));
        }

        assert_eq!(fired, expected);
    }
}
