//! Frame clock - callbacks that run just before the next frame.
//!
//! The host render loop calls [`advance_frame`] (or [`FrameTickSource::run_frame`]
//! on its own clock) once per frame. Every callback pending at that moment
//! runs; callbacks scheduled while the frame runs wait for the next one.
//!
//! # Example
//!
//! ```ignore
//! use spark_watch::clock::advance_frame;
//!
//! loop {
//!     advance_frame(); // observers compare and notify
//!     render();
//! }
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use super::{TickCallback, TickHandle, TickSource};

struct FrameQueue {
    pending: Vec<(TickHandle, TickCallback)>,
    next_id: u64,
    frames: u64,
}

impl FrameQueue {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            next_id: 0,
            frames: 0,
        }
    }
}

thread_local! {
    /// Default frame clock for this thread.
    static FRAME_CLOCK: FrameTickSource = FrameTickSource::new();
}

/// Frame-driven tick source.
///
/// Cloning shares the same queue.
#[derive(Clone)]
pub struct FrameTickSource {
    queue: Rc<RefCell<FrameQueue>>,
}

impl Default for FrameTickSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTickSource {
    /// Create an independent frame clock.
    pub fn new() -> Self {
        Self {
            queue: Rc::new(RefCell::new(FrameQueue::new())),
        }
    }

    /// Handle to this thread's default frame clock.
    pub fn current() -> Self {
        FRAME_CLOCK.with(|clock| clock.clone())
    }

    /// Run every callback that was pending when the frame started.
    ///
    /// Returns the number of callbacks run.
    pub fn run_frame(&self) -> usize {
        // Take the batch first so callbacks can schedule into the queue
        let batch = {
            let mut queue = self.queue.borrow_mut();
            queue.frames += 1;
            std::mem::take(&mut queue.pending)
        };

        let count = batch.len();
        for (_, callback) in batch {
            callback();
        }
        count
    }

    /// Number of callbacks waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.queue.borrow().pending.len()
    }

    /// Number of frames run so far.
    pub fn frame_count(&self) -> u64 {
        self.queue.borrow().frames
    }

    /// Check if two handles share the same queue.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.queue, &other.queue)
    }
}

impl TickSource for FrameTickSource {
    fn schedule(&self, callback: TickCallback) -> TickHandle {
        let mut queue = self.queue.borrow_mut();
        let handle = TickHandle::new(queue.next_id);
        queue.next_id += 1;
        queue.pending.push((handle, callback));
        handle
    }

    fn cancel(&self, handle: TickHandle) {
        // Dropping the callback may drop registry handles; release the borrow first
        let removed = {
            let mut queue = self.queue.borrow_mut();
            queue
                .pending
                .iter()
                .position(|(h, _)| *h == handle)
                .map(|pos| queue.pending.remove(pos))
        };
        drop(removed);
    }
}

/// Run one frame on this thread's default clock.
pub fn advance_frame() -> usize {
    FrameTickSource::current().run_frame()
}
