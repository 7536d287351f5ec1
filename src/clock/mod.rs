//! Tick sources - pluggable scheduling for the observer loop.
//!
//! The registry never sleeps or spins on its own. It asks a [`TickSource`]
//! to run a callback "soon", and the source decides what soon means:
//!
//! - [`FrameTickSource`] - runs pending callbacks when the host advances a
//!   frame (default, one tick per rendered frame)
//! - [`IntervalTickSource`] - runs callbacks once a fixed period has elapsed
//!
//! Each scheduled callback fires at most once. The registry schedules the
//! next tick from inside the current one, so exactly one callback is pending
//! while the loop runs.

mod frame;
mod interval;

pub use frame::*;
pub use interval::*;

/// Callback handed to a tick source. Runs at most once.
pub type TickCallback = Box<dyn FnOnce()>;

/// Opaque handle identifying one scheduled callback within its source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TickHandle(u64);

impl TickHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Something that can schedule a callback to run soon.
///
/// Cancelling an unknown or already-fired handle must be a no-op.
pub trait TickSource {
    /// Arrange for `callback` to run on a later tick.
    fn schedule(&self, callback: TickCallback) -> TickHandle;

    /// Drop a scheduled callback before it runs.
    fn cancel(&self, handle: TickHandle);
}
