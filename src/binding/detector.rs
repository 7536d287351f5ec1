//! Change detector - re-render a component when a watched value changes.
//!
//! A [`ChangeDetector`] ties one component's mount/unmount to one registry
//! entry. While active, every change the loop sees flips the detector's
//! render flag, a `spark_signals::Signal<bool>`. Any effect that reads the
//! flag re-runs, which is how the component re-renders; it then reads the
//! watched value itself.
//!
//! # Example
//!
//! ```ignore
//! use spark_signals::effect;
//! use spark_watch::binding::ChangeDetector;
//!
//! let mut detector = ChangeDetector::new(settings.volume, move || settings.volume);
//! detector.activate();
//!
//! let flag = detector.render_flag();
//! let _stop = effect(move || {
//!     let _ = flag.get();
//!     draw_volume(settings.volume);
//! });
//!
//! // Later, on unmount
//! detector.deactivate();
//! ```

use std::cell::Cell;
use std::rc::Rc;

use spark_signals::{Signal, signal};
use tracing::debug;

use super::WatchOptions;
use crate::observer::{Baseline, Comparator, Observation, ObserverRegistry, manager};

/// Watches a getter and flips a render flag when its value changes.
///
/// Dropping an active detector unregisters it.
pub struct ChangeDetector<T: 'static> {
    registry: ObserverRegistry,
    getter: Rc<dyn Fn() -> T>,
    compare: Comparator<T>,
    /// Caller-supplied key
    explicit_key: Option<String>,
    /// Key generated on first use, stable for this detector
    generated_key: Option<String>,
    /// Registered key while active
    active_key: Option<String>,
    /// Value the component last rendered with
    value: Option<T>,
    render: Signal<bool>,
    changes: Rc<Cell<u64>>,
    on_change: Option<Rc<dyn Fn()>>,
}

impl<T: PartialEq + 'static> ChangeDetector<T> {
    /// Watch `getter`, starting from `value`, with `==` as the comparator.
    pub fn new(value: T, getter: impl Fn() -> T + 'static) -> Self {
        Self::with_comparator(value, getter, Comparator::strict())
    }
}

impl<T: 'static> ChangeDetector<T> {
    /// Watch `getter` with a custom comparator.
    pub fn with_comparator(
        value: T,
        getter: impl Fn() -> T + 'static,
        compare: Comparator<T>,
    ) -> Self {
        let mut detector = Self::from_getter(Rc::new(getter), compare);
        detector.value = Some(value);
        detector
    }

    /// No rendered value yet: the first activation reads the getter.
    pub(super) fn from_getter(getter: Rc<dyn Fn() -> T>, compare: Comparator<T>) -> Self {
        Self {
            registry: manager::registry(),
            getter,
            compare,
            explicit_key: None,
            generated_key: None,
            active_key: None,
            value: None,
            render: signal(false),
            changes: Rc::new(Cell::new(0)),
            on_change: None,
        }
    }

    pub fn with_compare(mut self, compare: Comparator<T>) -> Self {
        self.compare = compare;
        self
    }

    /// Register under a stable, caller-chosen key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.explicit_key = Some(key.into());
        self
    }

    /// Register on `registry` instead of this thread's registry.
    pub fn with_registry(mut self, registry: ObserverRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Also run `callback` on every change.
    pub fn on_change(mut self, callback: impl Fn() + 'static) -> Self {
        self.on_change = Some(Rc::new(callback));
        self
    }

    /// Apply both optional overrides from `options`.
    pub fn with_options(mut self, options: WatchOptions<T>) -> Self {
        if let Some(key) = options.key {
            self.explicit_key = Some(key);
        }
        if let Some(compare) = options.compare {
            self.compare = compare;
        }
        self
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Register with the registry (mount). No-op if already active.
    ///
    /// The baseline is the value from construction or the last
    /// [`ChangeDetector::set_value`], else the getter's current value.
    pub fn activate(&mut self) {
        if self.active_key.is_some() {
            return;
        }
        let key = self.resolve_key();
        let initial = self.value.take().unwrap_or_else(|| (self.getter)());
        self.registry
            .register(key.clone(), self.observation(initial).baseline(Baseline::Reset));
        self.active_key = Some(key);
    }

    /// Unregister (unmount). No-op if not active.
    pub fn deactivate(&mut self) {
        if let Some(key) = self.active_key.take() {
            self.registry.unregister(&key);
        }
    }

    /// Re-render with new dependencies.
    ///
    /// Re-registers when the key or the comparator's identity changed,
    /// carrying the comparison baseline over. Fields left `None` keep their
    /// current setting. Returns true if the entry was replaced.
    pub fn reconfigure(&mut self, options: WatchOptions<T>) -> bool {
        let key_changed = match &options.key {
            Some(key) => self.explicit_key.as_deref() != Some(key.as_str()),
            None => false,
        };
        let compare_changed = match &options.compare {
            Some(compare) => !compare.ptr_eq(&self.compare),
            None => false,
        };
        if !key_changed && !compare_changed {
            return false;
        }

        if let Some(key) = options.key {
            self.explicit_key = Some(key);
        }
        if let Some(compare) = options.compare {
            self.compare = compare;
        }

        let Some(old_key) = self.active_key.take() else {
            return false;
        };
        let key = self.resolve_key();
        if key != old_key {
            // Move the entry so changes the loop has not seen yet survive
            self.registry.rename(&old_key, &key);
        }

        // Keep adopts the entry's baseline; the fresh read only applies if
        // the entry vanished
        let fallback = (self.getter)();
        self.registry
            .register(key.clone(), self.observation(fallback).baseline(Baseline::Keep));
        debug!(from = %old_key, to = %key, "change detector re-registered");
        self.active_key = Some(key);
        true
    }

    /// Record the value the component rendered with.
    ///
    /// Used as the baseline on the next activation.
    pub fn set_value(&mut self, value: T) {
        self.value = Some(value);
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    pub fn is_active(&self) -> bool {
        self.active_key.is_some()
    }

    /// Key of the registered entry, if active.
    pub fn active_key(&self) -> Option<&str> {
        self.active_key.as_deref()
    }

    /// Flag flipped on every change. Read it inside an effect to re-run
    /// the effect on change.
    pub fn render_flag(&self) -> Signal<bool> {
        self.render.clone()
    }

    /// Number of changes seen since construction.
    pub fn change_count(&self) -> u64 {
        self.changes.get()
    }

    pub fn registry(&self) -> &ObserverRegistry {
        &self.registry
    }

    /// Key this detector registers under.
    ///
    /// Without a caller-supplied key, the first call generates one on the
    /// registry and keeps it for the detector's lifetime.
    pub fn resolve_key(&mut self) -> String {
        if let Some(key) = &self.explicit_key {
            return key.clone();
        }
        let registry = &self.registry;
        self.generated_key
            .get_or_insert_with(|| registry.generate_key())
            .clone()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn observation(&self, initial: T) -> Observation<T> {
        let getter = Rc::clone(&self.getter);
        let render = self.render.clone();
        let changes = Rc::clone(&self.changes);
        let on_change = self.on_change.clone();

        Observation::with_compare(
            initial,
            move || getter(),
            self.compare.clone(),
            move || {
                changes.set(changes.get() + 1);
                render.set(!render.get());
                if let Some(callback) = &on_change {
                    callback();
                }
            },
        )
    }
}

impl<T: 'static> Drop for ChangeDetector<T> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrameTickSource;
    use spark_signals::effect;

    fn setup() -> (ObserverRegistry, FrameTickSource) {
        let clock = FrameTickSource::new();
        let registry = ObserverRegistry::new(Rc::new(clock.clone()));
        (registry, clock)
    }

    #[test]
    fn test_activate_registers_and_deactivate_unregisters() {
        let (registry, _) = setup();
        let mut detector = ChangeDetector::new(0, || 0).with_registry(registry.clone());

        assert!(registry.is_empty());
        detector.activate();
        assert!(detector.is_active());
        assert_eq!(registry.len(), 1);
        assert!(registry.is_running());

        // Activating twice keeps one entry
        detector.activate();
        assert_eq!(registry.len(), 1);

        detector.deactivate();
        assert!(!detector.is_active());
        assert!(registry.is_empty());
        assert!(!registry.is_running());
    }

    #[test]
    fn test_change_flips_render_flag() {
        let (registry, clock) = setup();
        let source = Rc::new(Cell::new(1));

        let s = source.clone();
        let mut detector = ChangeDetector::new(1, move || s.get()).with_registry(registry);
        detector.activate();

        let flag = detector.render_flag();
        assert!(!flag.get());

        clock.run_frame();
        assert_eq!(detector.change_count(), 0);

        source.set(2);
        clock.run_frame();
        assert_eq!(detector.change_count(), 1);
        assert!(flag.get());

        source.set(3);
        clock.run_frame();
        assert_eq!(detector.change_count(), 2);
        assert!(!flag.get());
    }

    #[test]
    fn test_effect_reruns_on_change() {
        let (registry, clock) = setup();
        let source = Rc::new(Cell::new(0));
        let renders = Rc::new(Cell::new(0));

        let s = source.clone();
        let mut detector = ChangeDetector::new(0, move || s.get()).with_registry(registry);
        detector.activate();

        let flag = detector.render_flag();
        let r = renders.clone();
        let _stop = effect(move || {
            let _ = flag.get();
            r.set(r.get() + 1);
        });
        assert_eq!(renders.get(), 1);

        source.set(5);
        clock.run_frame();
        assert_eq!(renders.get(), 2);

        clock.run_frame();
        assert_eq!(renders.get(), 2);
    }

    #[test]
    fn test_explicit_key() {
        let (registry, _) = setup();
        let mut detector = ChangeDetector::new(0, || 0)
            .with_key("volume")
            .with_registry(registry.clone());
        detector.activate();
        assert!(registry.contains("volume"));
        assert_eq!(detector.active_key(), Some("volume"));
        assert_eq!(detector.resolve_key(), "volume");
    }

    #[test]
    fn test_generated_key_is_stable() {
        let (registry, _) = setup();
        let mut detector = ChangeDetector::new(0, || 0).with_registry(registry.clone());

        let first = detector.resolve_key();
        detector.activate();
        assert_eq!(detector.active_key(), Some(first.as_str()));
        detector.deactivate();
        assert_eq!(detector.active_key(), None);
        detector.activate();

        assert_eq!(detector.resolve_key(), first);
        assert_eq!(registry.keys(), vec![first]);
    }

    #[test]
    fn test_reconfigure_same_deps_is_noop() {
        let (registry, _) = setup();
        let compare = Comparator::strict();
        let mut detector = ChangeDetector::with_comparator(0, || 0, compare.clone())
            .with_key("k")
            .with_registry(registry.clone());
        detector.activate();

        let replaced = detector.reconfigure(WatchOptions {
            key: Some("k".into()),
            compare: Some(compare),
        });
        assert!(!replaced);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reconfigure_new_key_moves_entry() {
        let (registry, _) = setup();
        let mut detector = ChangeDetector::new(0, || 0)
            .with_key("old")
            .with_registry(registry.clone());
        detector.activate();

        assert!(detector.reconfigure(WatchOptions::default().key("new")));
        assert_eq!(registry.keys(), vec!["new".to_string()]);
        assert!(registry.is_running());
    }

    #[test]
    fn test_reconfigure_new_key_keeps_unseen_change() {
        let (registry, clock) = setup();
        let source = Rc::new(Cell::new(0));

        let s = source.clone();
        let mut detector = ChangeDetector::new(0, move || s.get())
            .with_key("old")
            .with_registry(registry.clone());
        detector.activate();

        // Changes before the loop runs, then the key moves
        source.set(5);
        assert!(detector.reconfigure(WatchOptions::default().key("new")));

        clock.run_frame();
        assert_eq!(detector.change_count(), 1);
        clock.run_frame();
        assert_eq!(detector.change_count(), 1);
    }

    #[test]
    fn test_reconfigure_generated_to_explicit_key() {
        let (registry, clock) = setup();
        let source = Rc::new(Cell::new(0));

        let s = source.clone();
        let mut detector = ChangeDetector::new(0, move || s.get()).with_registry(registry.clone());
        detector.activate();
        let generated = detector.resolve_key();

        source.set(1);
        assert!(detector.reconfigure(WatchOptions::default().key("named")));
        assert!(!registry.contains(&generated));
        assert_eq!(detector.active_key(), Some("named"));

        clock.run_frame();
        assert_eq!(detector.change_count(), 1);
    }

    #[test]
    fn test_first_activation_without_value_reads_getter() {
        let (registry, clock) = setup();
        let reads = Rc::new(Cell::new(0));

        let r = reads.clone();
        let getter: Rc<dyn Fn() -> i32> = Rc::new(move || {
            r.set(r.get() + 1);
            4
        });
        let mut detector =
            ChangeDetector::from_getter(getter, Comparator::strict()).with_registry(registry);
        assert_eq!(reads.get(), 0);

        detector.activate();
        assert_eq!(reads.get(), 1);

        clock.run_frame();
        assert_eq!(detector.change_count(), 0);
    }

    #[test]
    fn test_reconfigure_new_comparator_keeps_baseline() {
        let (registry, clock) = setup();
        let source = Rc::new(Cell::new(0));

        let s = source.clone();
        let mut detector = ChangeDetector::new(0, move || s.get()).with_registry(registry.clone());
        detector.activate();

        source.set(10);
        clock.run_frame();
        assert_eq!(detector.change_count(), 1);

        // Coarser comparator; baseline stays at 10
        let coarse = Comparator::new(|a: &i32, b: &i32| (a - b).abs() < 5);
        assert!(detector.reconfigure(WatchOptions::default().compare(coarse)));
        assert_eq!(registry.len(), 1);

        source.set(12);
        clock.run_frame();
        assert_eq!(detector.change_count(), 1);

        source.set(20);
        clock.run_frame();
        assert_eq!(detector.change_count(), 2);
    }

    #[test]
    fn test_reconfigure_inactive_only_stores() {
        let (registry, _) = setup();
        let mut detector = ChangeDetector::new(0, || 0).with_registry(registry.clone());

        assert!(!detector.reconfigure(WatchOptions::default().key("later")));
        assert!(registry.is_empty());

        detector.activate();
        assert!(registry.contains("later"));
    }

    #[test]
    fn test_drop_unregisters() {
        let (registry, _) = setup();
        {
            let mut detector = ChangeDetector::new(0, || 0).with_registry(registry.clone());
            detector.activate();
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
        assert!(!registry.is_running());
    }

    #[test]
    fn test_on_change_callback() {
        let (registry, clock) = setup();
        let calls = Rc::new(Cell::new(0));

        let c = calls.clone();
        let mut detector = ChangeDetector::new(0, || 1)
            .with_registry(registry)
            .on_change(move || c.set(c.get() + 1));
        detector.activate();

        clock.run_frame();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_set_value_is_next_baseline() {
        let (registry, clock) = setup();
        let mut detector = ChangeDetector::new(0, || 7).with_registry(registry);

        detector.activate();
        clock.run_frame();
        assert_eq!(detector.change_count(), 1);

        detector.deactivate();
        detector.set_value(7);
        detector.activate();
        clock.run_frame();
        assert_eq!(detector.change_count(), 1);
    }
}
