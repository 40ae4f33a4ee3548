//! Cooperative timer queue on a virtual clock.
//!
//! Nothing here sleeps: popping a timer moves the clock forward to its due
//! time. Timers due at the same instant run in the order they were queued.
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

pub(crate) type Task = Box<dyn FnOnce()>;

struct Timer {
    due: Duration,
    seq: u64,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Reversed: BinaryHeap is a max-heap and the earliest timer must pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

#[derive(Default)]
pub(crate) struct Scheduler {
    now: Cell<Duration>,
    seq: Cell<u64>,
    timers: RefCell<BinaryHeap<Timer>>,
}

impl Scheduler {
    pub(crate) fn now(&self) -> Duration {
        self.now.get()
    }

    pub(crate) fn len(&self) -> usize {
        self.timers.borrow().len()
    }

    pub(crate) fn schedule(&self, delay: Duration, task: Task) {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.timers.borrow_mut().push(Timer {
            due: self.now.get().saturating_add(delay),
            seq,
            task,
        });
    }

    /// Removes the earliest timer and advances the clock to its due time.
    pub(crate) fn pop(&self) -> Option<Task> {
        let timer = self.timers.borrow_mut().pop()?;
        if timer.due > self.now.get() {
            self.now.set(timer.due);
        }
        Some(timer.task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn drain(scheduler: &Scheduler) {
        while let Some(task) = scheduler.pop() {
            task();
        }
    }

    #[test]
    fn runs_in_due_order_then_fifo() {
        let scheduler = Scheduler::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (delay, name) in [(500, "one"), (100, "two"), (100, "three"), (4, "four")] {
            let log = log.clone();
            scheduler.schedule(
                Duration::from_millis(delay),
                Box::new(move || log.borrow_mut().push(name)),
            );
        }
        assert_eq!(scheduler.len(), 4);
        drain(&scheduler);
        assert_eq!(*log.borrow(), vec!["four", "two", "three", "one"]);
        assert_eq!(scheduler.now(), Duration::from_millis(500));
    }

    #[test]
    fn delays_are_relative_to_the_current_time() {
        let scheduler = Rc::new(Scheduler::default());
        let seen = Rc::new(Cell::new(Duration::ZERO));
        let inner = scheduler.clone();
        let inner_seen = seen.clone();
        scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                let clock = inner.clone();
                inner.schedule(
                    Duration::from_millis(5),
                    Box::new(move || inner_seen.set(clock.now())),
                );
            }),
        );
        drain(&scheduler);
        assert_eq!(seen.get(), Duration::from_millis(15));
    }

    #[test]
    fn far_future_delays_saturate() {
        let scheduler = Scheduler::default();
        let hits = Rc::new(Cell::new(0));
        let first = hits.clone();
        scheduler.schedule(Duration::MAX, Box::new(move || first.set(first.get() + 1)));
        drain(&scheduler);
        assert_eq!(scheduler.now(), Duration::MAX);
        let second = hits.clone();
        scheduler.schedule(Duration::from_millis(4), Box::new(move || second.set(second.get() + 1)));
        drain(&scheduler);
        assert_eq!(hits.get(), 2);
        assert_eq!(scheduler.now(), Duration::MAX);
    }
}
