//! Interval clock - callbacks that run once a fixed period has elapsed.
//!
//! Each scheduled callback gets a deadline of `now + interval`. The owning
//! thread drains due callbacks with [`IntervalTickSource::run_due`], or blocks
//! on [`IntervalTickSource::wait_and_run`] when it has nothing else to do.
//!
//! Sources from [`IntervalTickSource::current`] share one queue per thread,
//! drained by [`run_due_intervals`] and [`wait_for_interval`]:
//!
//! ```ignore
//! use spark_watch::clock::wait_for_interval;
//!
//! manager::use_interval(None);
//! while running() {
//!     wait_for_interval(); // observers compare and notify
//! }
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use super::{TickCallback, TickHandle, TickSource};

struct Scheduled {
    handle: TickHandle,
    due: Instant,
    callback: TickCallback,
}

struct IntervalQueue {
    scheduled: Vec<Scheduled>,
    next_id: u64,
}

impl IntervalQueue {
    fn new() -> Self {
        Self {
            scheduled: Vec::new(),
            next_id: 0,
        }
    }
}

thread_local! {
    /// Queue shared by this thread's default interval sources.
    static INTERVAL_QUEUE: Rc<RefCell<IntervalQueue>> =
        Rc::new(RefCell::new(IntervalQueue::new()));
}

/// Fixed-interval tick source.
///
/// Cloning shares the same queue.
#[derive(Clone)]
pub struct IntervalTickSource {
    interval: Duration,
    queue: Rc<RefCell<IntervalQueue>>,
}

impl IntervalTickSource {
    /// Create an independent interval clock with its own queue.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            queue: Rc::new(RefCell::new(IntervalQueue::new())),
        }
    }

    /// Source on this thread's default queue, scheduling `interval` ahead.
    ///
    /// Sources with different intervals share the queue; each callback keeps
    /// its own deadline.
    pub fn current(interval: Duration) -> Self {
        Self {
            interval,
            queue: INTERVAL_QUEUE.with(Rc::clone),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Earliest pending deadline, if anything is scheduled.
    pub fn next_due(&self) -> Option<Instant> {
        self.queue.borrow().scheduled.iter().map(|s| s.due).min()
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().scheduled.len()
    }

    /// Run every callback whose deadline is at or before `now`.
    pub fn run_due_at(&self, now: Instant) -> usize {
        let due = {
            let mut queue = self.queue.borrow_mut();
            let (due, waiting): (Vec<Scheduled>, Vec<Scheduled>) =
                std::mem::take(&mut queue.scheduled)
                    .into_iter()
                    .partition(|s| s.due <= now);
            queue.scheduled = waiting;
            due
        };

        let count = due.len();
        for scheduled in due {
            (scheduled.callback)();
        }
        count
    }

    /// Run every callback that is due now.
    pub fn run_due(&self) -> usize {
        self.run_due_at(Instant::now())
    }

    /// Sleep until the next deadline, then run what is due.
    ///
    /// Returns 0 immediately when nothing is scheduled.
    pub fn wait_and_run(&self) -> usize {
        let Some(due) = self.next_due() else {
            return 0;
        };

        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
        self.run_due()
    }

    /// Check if two handles share the same queue.
    pub fn shares_queue(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.queue, &other.queue)
    }
}

impl TickSource for IntervalTickSource {
    fn schedule(&self, callback: TickCallback) -> TickHandle {
        let mut queue = self.queue.borrow_mut();
        let handle = TickHandle::new(queue.next_id);
        queue.next_id += 1;
        queue.scheduled.push(Scheduled {
            handle,
            due: Instant::now() + self.interval,
            callback,
        });
        handle
    }

    fn cancel(&self, handle: TickHandle) {
        let removed = {
            let mut queue = self.queue.borrow_mut();
            queue
                .scheduled
                .iter()
                .position(|s| s.handle == handle)
                .map(|pos| queue.scheduled.remove(pos))
        };
        drop(removed);
    }
}

/// Run every due callback on this thread's default interval queue.
pub fn run_due_intervals() -> usize {
    // Draining only looks at deadlines, not the handle's interval
    IntervalTickSource::current(Duration::ZERO).run_due()
}

/// Sleep until the next deadline on this thread's default interval queue,
/// then run what is due. Returns 0 immediately when nothing is scheduled.
pub fn wait_for_interval() -> usize {
    IntervalTickSource::current(Duration::ZERO).wait_and_run()
}
