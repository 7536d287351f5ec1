//! Observer Manager - the per-thread registry behind the free functions.
//!
//! UI code runs on one thread, so "process-wide" means one
//! [`ObserverRegistry`] per thread, created the first time it is touched and
//! ticking on that thread's frame clock.
//!
//! # Example
//!
//! ```ignore
//! use spark_watch::{manager, Observation};
//! use spark_watch::clock::advance_frame;
//!
//! let key = manager::generate_key();
//! manager::register(key.clone(), Observation::new(0, || COUNTER.get(), || println!("changed")));
//!
//! advance_frame();
//!
//! manager::unregister(&key);
//! ```

use std::rc::Rc;
use std::time::Duration;

use super::entry::Observation;
use super::registry::{ObserverRegistry, TickReport};
use crate::clock::{IntervalTickSource, TickSource};
use crate::config::{DEFAULT_INTERVAL, FaultPolicy, TickMode, WatchConfig};
use crate::error::WatchError;

thread_local! {
    /// This thread's registry. Built on first use, never replaced.
    static REGISTRY: ObserverRegistry = ObserverRegistry::default();
}

/// Handle to this thread's registry.
pub fn registry() -> ObserverRegistry {
    REGISTRY.with(|registry| registry.clone())
}

// =============================================================================
// Registration
// =============================================================================

/// Insert or replace the observer under `key`.
pub fn register<T: 'static>(key: impl Into<String>, observation: Observation<T>) {
    registry().register(key, observation);
}

/// Insert or replace an observer whose getter can fail.
pub fn try_register<T, E>(
    key: impl Into<String>,
    initial: T,
    getter: impl Fn() -> Result<T, E> + 'static,
    notify: impl Fn() + 'static,
) where
    T: PartialEq + 'static,
    E: std::fmt::Display + 'static,
{
    registry().try_register(key, initial, getter, notify);
}

/// Remove the observer under `key`. Missing keys are ignored.
pub fn unregister(key: &str) -> bool {
    registry().unregister(key)
}

pub fn generate_key() -> String {
    registry().generate_key()
}

/// Run a tick now, outside the tick source's schedule.
pub fn tick() -> Result<TickReport, WatchError> {
    registry().tick()
}

pub fn is_running() -> bool {
    registry().is_running()
}

pub fn observer_count() -> usize {
    registry().len()
}

// =============================================================================
// Configuration
// =============================================================================

/// Replace the tick source used for future ticks.
pub fn set_tick_source(source: Rc<dyn TickSource>) {
    registry().set_tick_source(source);
}

/// Tick on a fixed interval instead of once per frame.
///
/// `None` uses [`DEFAULT_INTERVAL`] (1 ms). Ticks land on this thread's
/// default interval queue; the host drives it with
/// [`run_due_intervals`](crate::clock::run_due_intervals) or
/// [`wait_for_interval`](crate::clock::wait_for_interval). The returned
/// handle shares that queue.
pub fn use_interval(interval: Option<Duration>) -> IntervalTickSource {
    let source = IntervalTickSource::current(interval.unwrap_or(DEFAULT_INTERVAL));
    set_tick_source(Rc::new(source.clone()));
    source
}

/// Go back to ticking on this thread's frame clock.
pub fn use_frames() {
    set_tick_source(TickMode::Frame.build());
}

pub fn set_fault_policy(policy: FaultPolicy) {
    registry().set_fault_policy(policy);
}

/// Apply a config to this thread's registry.
pub fn configure(config: WatchConfig) {
    registry().configure(config);
}

/// Reset this thread's registry (for testing).
///
/// Cancels the loop, drops every observer, restarts key generation and
/// restores the default config.
pub fn reset_registry() {
    let registry = registry();
    registry.reset();
    registry.configure(WatchConfig::default());
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FrameTickSource, advance_frame, run_due_intervals, wait_for_interval};
    use std::cell::Cell;

    fn setup() {
        reset_registry();
    }

    #[test]
    fn test_singleton_is_shared() {
        setup();
        assert!(registry().ptr_eq(&registry()));
    }

    #[test]
    fn test_register_runs_on_frame_clock() {
        setup();
        let hits = Rc::new(Cell::new(0));

        let h = hits.clone();
        register("a", Observation::new(0, || 1, move || h.set(h.get() + 1)));
        assert!(is_running());
        assert_eq!(observer_count(), 1);

        advance_frame();
        assert_eq!(hits.get(), 1);

        advance_frame();
        assert_eq!(hits.get(), 1);

        unregister("a");
        assert!(!is_running());
        assert_eq!(FrameTickSource::current().pending(), 0);
    }

    #[test]
    fn test_generate_key_after_reset() {
        setup();
        assert_eq!(generate_key(), "observer_0");
        assert_eq!(generate_key(), "observer_1");
        assert_eq!(generate_key(), "observer_2");

        reset_registry();
        assert_eq!(generate_key(), "observer_0");
    }

    #[test]
    fn test_reset_clears_everything() {
        setup();
        register("a", Observation::new(0, || 0, || {}));
        set_fault_policy(FaultPolicy::FailFast);

        reset_registry();
        assert_eq!(observer_count(), 0);
        assert!(!is_running());
        assert_eq!(registry().fault_policy(), FaultPolicy::Isolate);
        assert_eq!(FrameTickSource::current().pending(), 0);
    }

    #[test]
    fn test_use_interval_ticks_when_driven() {
        setup();
        let source = use_interval(Some(Duration::from_millis(1)));
        assert_eq!(source.interval(), Duration::from_millis(1));
        let hits = Rc::new(Cell::new(0));

        let h = hits.clone();
        register("a", Observation::new(0, || 1, move || h.set(h.get() + 1)));
        assert!(is_running());

        // Nothing lands on the frame clock
        assert_eq!(advance_frame(), 0);
        assert_eq!(registry().tick_count(), 0);

        for _ in 0..3 {
            assert_eq!(wait_for_interval(), 1);
        }
        assert_eq!(registry().tick_count(), 3);
        assert_eq!(hits.get(), 1);

        unregister("a");
        assert!(!is_running());
        assert_eq!(source.pending(), 0);

        use_frames();
    }

    #[test]
    fn test_use_interval_default_period() {
        setup();
        assert_eq!(use_interval(None).interval(), DEFAULT_INTERVAL);
        use_frames();
    }

    #[test]
    fn test_configured_interval_is_driven_by_thread_queue() {
        setup();
        configure(WatchConfig::default().interval(Duration::ZERO));
        register("a", Observation::new(0, || 0, || {}));

        assert_eq!(run_due_intervals(), 1);
        assert_eq!(registry().tick_count(), 1);

        reset_registry();
        assert_eq!(run_due_intervals(), 0);
    }

    #[test]
    fn test_try_register_isolates_failure() {
        setup();
        try_register("flaky", 0, || Err::<i32, _>("not ready"), || {});

        let report = tick().unwrap();
        assert_eq!(report.faulted, 1);
        assert!(is_running());
    }
}
