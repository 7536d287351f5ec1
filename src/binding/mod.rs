//! Bindings - connect a component's lifecycle to the observer registry.
//!
//! Two flavors over the same primitive:
//! - [`ChangeDetector`] - component passes the value it rendered with; a
//!   change flips the render flag and the component re-reads the source
//! - [`ValueWatcher`] - component passes only a getter and gets the current
//!   value back on every read
//!
//! # Pattern: Mount / Unmount
//!
//! `activate()` on mount registers one entry, `deactivate()` (or drop) on
//! unmount removes it. When a re-render hands in a different key or a
//! different comparator, `reconfigure()` replaces the entry under the new
//! key. The same key and comparator leave the single entry alone.

mod detector;
mod value;

pub use detector::*;
pub use value::*;

use crate::observer::Comparator;

/// Optional dependencies of a binding.
pub struct WatchOptions<T> {
    /// Stable key. A key is generated per binding when `None`.
    pub key: Option<String>,
    /// Equality predicate. `==` when `None`.
    pub compare: Option<Comparator<T>>,
}

impl<T> Default for WatchOptions<T> {
    fn default() -> Self {
        Self {
            key: None,
            compare: None,
        }
    }
}

impl<T> WatchOptions<T> {
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn compare(mut self, compare: Comparator<T>) -> Self {
        self.compare = Some(compare);
        self
    }
}

/// Watch `getter` on this thread's registry and return the active detector.
///
/// `value` is what the component rendered with.
pub fn watch_changes<T: PartialEq + 'static>(
    value: T,
    getter: impl Fn() -> T + 'static,
    options: WatchOptions<T>,
) -> ChangeDetector<T> {
    let mut detector = ChangeDetector::new(value, getter).with_options(options);
    detector.activate();
    detector
}

/// Watch `getter` on this thread's registry; returns its current value and
/// the active watcher.
pub fn watch_value<T: Clone + PartialEq + 'static>(
    getter: impl Fn() -> T + 'static,
    options: WatchOptions<T>,
) -> (T, ValueWatcher<T>) {
    let mut watcher = ValueWatcher::new(getter).with_options(options);
    let value = watcher.activate();
    (value, watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::advance_frame;
    use crate::observer::manager::{observer_count, registry, reset_registry};
    use std::cell::Cell;
    use std::rc::Rc;

    fn setup() {
        reset_registry();
    }

    #[test]
    fn test_watch_changes() {
        setup();
        let source = Rc::new(Cell::new(1));

        let s = source.clone();
        let detector = watch_changes(1, move || s.get(), WatchOptions::default());
        assert!(detector.is_active());
        assert_eq!(observer_count(), 1);

        source.set(2);
        advance_frame();
        assert_eq!(detector.change_count(), 1);

        drop(detector);
        assert_eq!(observer_count(), 0);
        assert!(!registry().is_running());
    }

    #[test]
    fn test_watch_value_with_key() {
        setup();
        let (value, watcher) = watch_value(|| 42, WatchOptions::default().key("answer"));
        assert_eq!(value, 42);
        assert!(registry().contains("answer"));
        assert!(watcher.is_active());
    }

    #[test]
    fn test_shared_key_overwrites() {
        setup();
        let a = watch_changes(0, || 0, WatchOptions::default().key("shared"));
        let b = watch_changes(0, || 0, WatchOptions::default().key("shared"));

        assert_eq!(observer_count(), 1);
        assert!(a.is_active());
        assert!(b.is_active());
    }

    #[test]
    fn test_generated_keys_differ_per_binding() {
        setup();
        let mut a = watch_changes(0, || 0, WatchOptions::default());
        let mut b = watch_changes(0, || 0, WatchOptions::default());

        assert_ne!(a.resolve_key(), b.resolve_key());
        assert_eq!(observer_count(), 2);
    }

    #[test]
    fn test_custom_compare_option() {
        setup();
        let source = Rc::new(Cell::new(0));

        let s = source.clone();
        let detector = watch_changes(
            0,
            move || s.get(),
            WatchOptions::default().compare(Comparator::new(|_: &i32, _: &i32| true)),
        );

        source.set(99);
        advance_frame();
        assert_eq!(detector.change_count(), 0);
    }
}
