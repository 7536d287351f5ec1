//! Observer Registry - keyed observers sharing one polling loop.
//!
//! The registry owns every active [`Observation`] and a single loop that
//! re-evaluates all of them once per tick:
//!
//! - First registration schedules a tick on the [`TickSource`]
//! - Each tick evaluates a snapshot of the entries, notifies the changed
//!   ones, then schedules the next tick
//! - Removing the last entry cancels the pending tick
//!
//! So the loop runs exactly while at least one observer is registered.
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use spark_watch::{FrameTickSource, Observation, ObserverRegistry};
//!
//! let clock = FrameTickSource::new();
//! let registry = ObserverRegistry::new(Rc::new(clock.clone()));
//!
//! let key = registry.generate_key();
//! registry.register(key.clone(), Observation::new(0, move || read_counter(), || rerender()));
//!
//! clock.run_frame(); // compares, notifies on change, schedules next frame
//!
//! registry.unregister(&key); // loop stops
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace, warn};

use super::entry::{Baseline, Entry, Observation, ObserverEntry, Poll};
use crate::clock::{FrameTickSource, TickHandle, TickSource};
use crate::config::{FaultPolicy, WatchConfig};
use crate::error::WatchError;

type EntryRef = Rc<RefCell<dyn ObserverEntry>>;

// =============================================================================
// Tick Report
// =============================================================================

/// Counts from one tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Entries in the tick's snapshot
    pub evaluated: usize,
    /// Entries whose value changed (notifier invoked)
    pub notified: usize,
    /// Entries skipped because their getter failed
    pub faulted: usize,
}

// =============================================================================
// Registry State
// =============================================================================

struct RegistryInner {
    /// Entries in registration order. Replacing a key keeps its slot.
    entries: Vec<(String, EntryRef)>,
    /// Source used for the next schedule.
    source: Rc<dyn TickSource>,
    /// Pending tick and the source that issued it.
    loop_handle: Option<(Rc<dyn TickSource>, TickHandle)>,
    key_counter: u64,
    key_prefix: String,
    fault_policy: FaultPolicy,
    ticks: u64,
}

impl RegistryInner {
    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

/// Shared handle to an observer registry.
///
/// Cloning hands out another handle to the same registry. The registry is
/// single-threaded: all calls must come from the thread that created it.
#[derive(Clone)]
pub struct ObserverRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new(Rc::new(FrameTickSource::current()))
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ObserverRegistry")
            .field("entries", &inner.entries.len())
            .field("running", &inner.loop_handle.is_some())
            .field("ticks", &inner.ticks)
            .finish()
    }
}

impl ObserverRegistry {
    /// Create a registry that schedules its ticks on `source`.
    pub fn new(source: Rc<dyn TickSource>) -> Self {
        let config = WatchConfig::default();
        Self::build(source, config)
    }

    /// Create a registry from a config, building its tick source.
    pub fn with_config(config: WatchConfig) -> Self {
        Self::build(config.tick.build(), config)
    }

    fn build(source: Rc<dyn TickSource>, config: WatchConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                entries: Vec::new(),
                source,
                loop_handle: None,
                key_counter: 0,
                key_prefix: config.key_prefix,
                fault_policy: config.fault_policy,
                ticks: 0,
            })),
        }
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Insert or replace the observer under `key`.
    ///
    /// Replacing keeps the key's position in tick order. Starts the loop if
    /// it is not running.
    pub fn register<T: 'static>(&self, key: impl Into<String>, mut observation: Observation<T>) {
        let key = key.into();

        let replaced = {
            let mut inner = self.inner.borrow_mut();
            let position = inner.position(&key);

            if let (Baseline::Keep, Some(index)) = (observation.baseline, position) {
                // The old entry may be mid-poll if its own getter re-registers
                let carried = inner.entries[index]
                    .1
                    .try_borrow_mut()
                    .ok()
                    .and_then(|mut old| old.take_baseline())
                    .and_then(|value| value.downcast::<T>().ok());
                if let Some(value) = carried {
                    observation.initial = *value;
                }
            }

            let entry: EntryRef = Rc::new(RefCell::new(Entry::new(key.clone(), observation)));
            match position {
                Some(index) => Some(std::mem::replace(&mut inner.entries[index].1, entry)),
                None => {
                    inner.entries.push((key.clone(), entry));
                    None
                }
            }
        };

        debug!(key = %key, replaced = replaced.is_some(), "observer registered");
        // Drop the old entry's closures outside the borrow
        drop(replaced);

        if self.ensure_running() {
            debug!("observer loop started");
        }
    }

    /// Insert or replace an observer whose getter can fail.
    ///
    /// Convenience over [`Observation::try_new`].
    pub fn try_register<T, E>(
        &self,
        key: impl Into<String>,
        initial: T,
        getter: impl Fn() -> Result<T, E> + 'static,
        notify: impl Fn() + 'static,
    ) where
        T: PartialEq + 'static,
        E: std::fmt::Display + 'static,
    {
        self.register(key, Observation::try_new(initial, getter, notify));
    }

    /// Remove the observer under `key`.
    ///
    /// Returns false if there was none. Stops the loop when the registry
    /// becomes empty.
    pub fn unregister(&self, key: &str) -> bool {
        let (removed, now_empty) = {
            let mut inner = self.inner.borrow_mut();
            let removed = inner.position(key).map(|index| inner.entries.remove(index));
            (removed, inner.entries.is_empty())
        };

        let found = removed.is_some();
        if found {
            debug!(key = %key, "observer unregistered");
        }
        drop(removed);

        if now_empty {
            self.stop_loop();
        }
        found
    }

    /// Move the observer under `from` to `to`, keeping its slot and baseline.
    ///
    /// An observer already under `to` is dropped. Returns false if `from`
    /// was not registered.
    pub fn rename(&self, from: &str, to: &str) -> bool {
        if from == to {
            return self.contains(from);
        }

        let displaced = {
            let mut inner = self.inner.borrow_mut();
            let Some(index) = inner.position(from) else {
                return false;
            };
            let displaced = inner.position(to).map(|other| inner.entries.remove(other));
            let index = inner.position(from).unwrap_or(index);

            let (key, entry) = &mut inner.entries[index];
            *key = to.to_string();
            // Mid-poll entries keep their old key in error reports
            if let Ok(mut entry) = entry.try_borrow_mut() {
                entry.set_key(to.to_string());
            }
            displaced
        };

        debug!(from = %from, to = %to, "observer renamed");
        drop(displaced);
        true
    }

    /// Produce a key no earlier call on this registry returned.
    pub fn generate_key(&self) -> String {
        let mut inner = self.inner.borrow_mut();
        let key = format!("{}_{}", inner.key_prefix, inner.key_counter);
        inner.key_counter += 1;
        key
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// Evaluate every registered observer once.
    ///
    /// Works on a snapshot taken at the start, so observers added or removed
    /// by a notifier only take part from the next tick on. Afterwards the
    /// loop is rescheduled, or stopped if the registry emptied.
    ///
    /// Under [`FaultPolicy::FailFast`] the first getter failure aborts the
    /// tick, stops the loop and is returned.
    pub fn tick(&self) -> Result<TickReport, WatchError> {
        let (snapshot, policy) = {
            let mut inner = self.inner.borrow_mut();
            inner.ticks += 1;
            let snapshot: Vec<EntryRef> = inner.entries.iter().map(|(_, e)| Rc::clone(e)).collect();
            (snapshot, inner.fault_policy)
        };

        let mut report = TickReport {
            evaluated: snapshot.len(),
            ..TickReport::default()
        };

        for entry in snapshot {
            let outcome = match entry.try_borrow_mut() {
                Ok(mut entry) => entry.poll(),
                // Already being polled by an outer tick
                Err(_) => continue,
            };

            match outcome {
                Ok(Poll::Unchanged) => {}
                Ok(Poll::Changed(notify)) => {
                    report.notified += 1;
                    notify();
                }
                Err(err) => match policy {
                    FaultPolicy::Isolate => {
                        warn!(key = %err.key(), error = %err, "observer skipped this tick");
                        report.faulted += 1;
                    }
                    FaultPolicy::FailFast => {
                        error!(key = %err.key(), error = %err, "observer failed, stopping loop");
                        self.stop_loop();
                        return Err(err);
                    }
                },
            }
        }

        trace!(
            evaluated = report.evaluated,
            notified = report.notified,
            faulted = report.faulted,
            "observer tick"
        );

        if self.is_empty() {
            self.stop_loop();
        } else {
            self.ensure_running();
        }
        Ok(report)
    }

    /// Entry point for the tick source. The handle that fired is spent.
    fn run_scheduled(&self) {
        self.inner.borrow_mut().loop_handle = None;
        // Failures were logged by tick(); fail-fast already stopped the loop
        let _ = self.tick();
    }

    /// Schedule the next tick unless one is pending. Returns true if it scheduled.
    fn ensure_running(&self) -> bool {
        let source = {
            let inner = self.inner.borrow();
            if inner.loop_handle.is_some() || inner.entries.is_empty() {
                return false;
            }
            Rc::clone(&inner.source)
        };

        let weak: Weak<RefCell<RegistryInner>> = Rc::downgrade(&self.inner);
        let handle = source.schedule(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                ObserverRegistry { inner }.run_scheduled();
            }
        }));

        self.inner.borrow_mut().loop_handle = Some((source, handle));
        true
    }

    fn stop_loop(&self) {
        let pending = self.inner.borrow_mut().loop_handle.take();
        if let Some((source, handle)) = pending {
            source.cancel(handle);
            debug!("observer loop stopped");
        }
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Swap the tick source.
    ///
    /// Only future scheduling uses the new source. A tick already pending on
    /// the old one still fires there.
    pub fn set_tick_source(&self, source: Rc<dyn TickSource>) {
        self.inner.borrow_mut().source = source;
        debug!("observer tick source replaced");
    }

    pub fn set_fault_policy(&self, policy: FaultPolicy) {
        self.inner.borrow_mut().fault_policy = policy;
    }

    pub fn fault_policy(&self) -> FaultPolicy {
        self.inner.borrow().fault_policy
    }

    /// Apply a config: tick source, fault policy and key prefix.
    pub fn configure(&self, config: WatchConfig) {
        let mut inner = self.inner.borrow_mut();
        inner.source = config.tick.build();
        inner.fault_policy = config.fault_policy;
        inner.key_prefix = config.key_prefix;
    }

    /// Cancel the loop, drop every entry and restart key generation.
    ///
    /// The tick source and fault policy are left as they are.
    pub fn reset(&self) {
        self.stop_loop();
        let entries = {
            let mut inner = self.inner.borrow_mut();
            inner.key_counter = 0;
            inner.ticks = 0;
            std::mem::take(&mut inner.entries)
        };
        drop(entries);
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.borrow().position(key).is_some()
    }

    /// Keys in tick order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Check if a tick is scheduled.
    pub fn is_running(&self) -> bool {
        self.inner.borrow().loop_handle.is_some()
    }

    /// Number of ticks run since creation or the last reset.
    pub fn tick_count(&self) -> u64 {
        self.inner.borrow().ticks
    }

    /// Check if both handles point at the same registry.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// =============================================================================
// TESTS
// =============================================================================
