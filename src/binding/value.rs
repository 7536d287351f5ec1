//! Value watcher - a change detector that also hands back the value.

use std::rc::Rc;

use spark_signals::Signal;

use super::WatchOptions;
use super::detector::ChangeDetector;
use crate::observer::{Comparator, ObserverRegistry};

/// Watches a getter and returns its current value on every read.
///
/// Spares the component a separate read of the source: [`ValueWatcher::activate`]
/// and [`ValueWatcher::value`] both evaluate the getter synchronously.
pub struct ValueWatcher<T: Clone + 'static> {
    getter: Rc<dyn Fn() -> T>,
    detector: ChangeDetector<T>,
}

impl<T: Clone + PartialEq + 'static> ValueWatcher<T> {
    pub fn new(getter: impl Fn() -> T + 'static) -> Self {
        Self::with_comparator(getter, Comparator::strict())
    }
}

impl<T: Clone + 'static> ValueWatcher<T> {
    pub fn with_comparator(getter: impl Fn() -> T + 'static, compare: Comparator<T>) -> Self {
        let getter: Rc<dyn Fn() -> T> = Rc::new(getter);
        Self {
            detector: ChangeDetector::from_getter(Rc::clone(&getter), compare),
            getter,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.detector = self.detector.with_key(key);
        self
    }

    pub fn with_registry(mut self, registry: ObserverRegistry) -> Self {
        self.detector = self.detector.with_registry(registry);
        self
    }

    pub fn on_change(mut self, callback: impl Fn() + 'static) -> Self {
        self.detector = self.detector.on_change(callback);
        self
    }

    pub fn with_options(mut self, options: WatchOptions<T>) -> Self {
        self.detector = self.detector.with_options(options);
        self
    }

    /// Evaluate the getter, register with that value as the baseline, and
    /// return it.
    pub fn activate(&mut self) -> T {
        let value = (self.getter)();
        if !self.detector.is_active() {
            self.detector.set_value(value.clone());
            self.detector.activate();
        }
        value
    }

    pub fn deactivate(&mut self) {
        self.detector.deactivate();
    }

    pub fn reconfigure(&mut self, options: WatchOptions<T>) -> bool {
        self.detector.reconfigure(options)
    }

    /// Current value of the getter.
    pub fn value(&self) -> T {
        (self.getter)()
    }

    pub fn is_active(&self) -> bool {
        self.detector.is_active()
    }

    pub fn active_key(&self) -> Option<&str> {
        self.detector.active_key()
    }

    /// See [`ChangeDetector::resolve_key`].
    pub fn resolve_key(&mut self) -> String {
        self.detector.resolve_key()
    }

    pub fn render_flag(&self) -> Signal<bool> {
        self.detector.render_flag()
    }

    pub fn change_count(&self) -> u64 {
        self.detector.change_count()
    }

    pub fn detector(&self) -> &ChangeDetector<T> {
        &self.detector
    }
}
