//! Watch configuration.
//!
//! A [`WatchConfig`] decides how an [`ObserverRegistry`](crate::ObserverRegistry)
//! schedules its ticks, what happens when a getter fails, and how generated
//! keys are spelled.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use spark_watch::{WatchConfig, FaultPolicy, manager};
//!
//! manager::configure(
//!     WatchConfig::default()
//!         .interval(Duration::from_millis(16))
//!         .fault_policy(FaultPolicy::FailFast),
//! );
//! ```

use std::rc::Rc;
use std::time::Duration;

use crate::clock::{FrameTickSource, IntervalTickSource, TickSource};

/// Interval used when an interval tick is requested without an explicit period.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1);

/// Prefix for keys produced by `generate_key()`.
pub const DEFAULT_KEY_PREFIX: &str = "observer";

// =============================================================================
// Tick Mode
// =============================================================================

/// Which tick source a registry builds from its config
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TickMode {
    /// Tick once per frame of the thread's frame clock
    #[default]
    Frame,
    /// Tick on a fixed interval, on the thread's default interval queue
    /// (driven by `run_due_intervals` / `wait_for_interval`)
    Interval(Duration),
}

impl TickMode {
    /// Build the tick source for this mode
    pub fn build(self) -> Rc<dyn TickSource> {
        match self {
            TickMode::Frame => Rc::new(FrameTickSource::current()),
            TickMode::Interval(period) => Rc::new(IntervalTickSource::current(period)),
        }
    }
}

// =============================================================================
// Fault Policy
// =============================================================================

/// What a tick does when an observer's getter fails or panics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Skip the failing observer for this tick and keep evaluating the rest
    #[default]
    Isolate,
    /// Abort the tick and stop the loop until the next registration
    FailFast,
}

// =============================================================================
// Config
// =============================================================================

/// Registry configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchConfig {
    pub tick: TickMode,
    pub fault_policy: FaultPolicy,
    pub key_prefix: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            tick: TickMode::Frame,
            fault_policy: FaultPolicy::Isolate,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl WatchConfig {
    /// Tick on the frame clock
    pub fn frames(mut self) -> Self {
        self.tick = TickMode::Frame;
        self
    }

    /// Tick on a fixed interval
    pub fn interval(mut self, period: Duration) -> Self {
        self.tick = TickMode::Interval(period);
        self
    }

    pub fn fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}
