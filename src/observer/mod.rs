//! Observer core - entries, the registry and its per-thread singleton.
//!
//! - Entry: getter + comparator + notifier + last-seen value
//! - Registry: keyed entries and the shared polling loop
//! - Manager: the thread's registry behind free functions
//!
//! # Architecture
//!
//! Observed values have no change hook, so the only way to notice a change
//! is to read them again. One loop reads every registered getter per tick
//! instead of one timer per watcher:
//!
//! ```text
//! tick source ──► tick() ──► for each entry: getter() ≠ previous ? notify()
//!      ▲                                  │
//!      └──────── schedule next ◄──────────┘   (only while entries exist)
//! ```

mod entry;
mod registry;
pub mod manager;

pub use entry::*;
pub use registry::*;
