//! # spark-watch
//!
//! Polling value watchers for reactive UI components.
//!
//! Lets a component re-render when some plain value changes (a field, a
//! global, anything behind a getter) without routing the mutation through
//! a signal. Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals):
//! a change flips a `Signal<bool>` that the component's render effect reads.
//!
//! ## Architecture
//!
//! One registry per UI thread holds every active watcher. A single loop,
//! driven by a pluggable tick source, re-evaluates all getters each tick and
//! notifies the ones whose value changed:
//!
//! ```text
//! ChangeDetector / ValueWatcher ──register──► ObserverRegistry ◄──tick── TickSource
//!                               ◄──notify───                               (frame | interval)
//! ```
//!
//! The loop only runs while at least one watcher is registered.
//!
//! ## Modules
//!
//! - [`observer`] - Observation entries, the registry, the per-thread manager
//! - [`clock`] - Tick sources (frame clock, fixed interval)
//! - [`binding`] - Component bindings (change detector, value watcher)
//! - [`config`] - Registry configuration
//! - [`error`] - Getter failure errors

pub mod binding;
pub mod clock;
pub mod config;
pub mod error;
pub mod observer;

pub use binding::{ChangeDetector, ValueWatcher, WatchOptions, watch_changes, watch_value};

pub use clock::{
    FrameTickSource, IntervalTickSource, TickCallback, TickHandle, TickSource, advance_frame,
    run_due_intervals, wait_for_interval,
};

pub use config::{DEFAULT_INTERVAL, FaultPolicy, TickMode, WatchConfig};

pub use error::WatchError;

pub use observer::{
    Baseline, Comparator, Notify, Observation, ObserverRegistry, TickReport, manager,
};
