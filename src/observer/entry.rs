//! Observation entries - one per active watcher.
//!
//! An entry owns a getter, a comparator, a notifier and the last value it
//! saw. Entries of different value types live side by side in the registry
//! behind the [`ObserverEntry`] trait.

use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::WatchError;

// =============================================================================
// Callback Types
// =============================================================================

/// Change notifier. Carries no payload; it only means "re-render".
pub type Notify = Rc<dyn Fn()>;

/// Type-erased getter. Errors are already rendered to strings.
pub(crate) type Getter<T> = Rc<dyn Fn() -> Result<T, String>>;

/// Equality predicate used to decide whether a value changed.
///
/// Returns true when the two values count as equal (no notification).
/// Cloning shares the same function, so [`Comparator::ptr_eq`] can tell
/// whether a binding was handed the same comparator again.
pub struct Comparator<T> {
    eq: Rc<dyn Fn(&T, &T) -> bool>,
}

impl<T> Clone for Comparator<T> {
    fn clone(&self) -> Self {
        Self { eq: Rc::clone(&self.eq) }
    }
}

impl<T> std::fmt::Debug for Comparator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comparator").finish_non_exhaustive()
    }
}

impl<T: 'static> Comparator<T> {
    pub fn new(eq: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self { eq: Rc::new(eq) }
    }

    /// Run the predicate.
    pub fn equal(&self, previous: &T, next: &T) -> bool {
        (self.eq)(previous, next)
    }

    /// Check if both comparators share the same function.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.eq, &other.eq)
    }
}

impl<T: PartialEq + 'static> Comparator<T> {
    /// Plain `==`.
    pub fn strict() -> Self {
        Self::new(|a: &T, b: &T| a == b)
    }
}

// =============================================================================
// Observation
// =============================================================================

/// What a re-registration under an existing key does with the old baseline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Baseline {
    /// Carry the replaced entry's last-seen value forward when its type
    /// matches. Falls back to the supplied initial value otherwise.
    #[default]
    Keep,
    /// Always compare against the supplied initial value.
    Reset,
}

/// Everything needed to register one observer.
pub struct Observation<T> {
    pub(crate) getter: Getter<T>,
    pub(crate) compare: Comparator<T>,
    pub(crate) notify: Notify,
    pub(crate) initial: T,
    pub(crate) baseline: Baseline,
}

impl<T: PartialEq + 'static> Observation<T> {
    /// Observe `getter`, notifying when its value stops being `==` to the
    /// last one seen. `initial` is the first baseline.
    pub fn new(
        initial: T,
        getter: impl Fn() -> T + 'static,
        notify: impl Fn() + 'static,
    ) -> Self {
        Self::with_compare(initial, getter, Comparator::strict(), notify)
    }

    /// Like [`Observation::new`] with a getter that can fail.
    pub fn try_new<E: Display + 'static>(
        initial: T,
        getter: impl Fn() -> Result<T, E> + 'static,
        notify: impl Fn() + 'static,
    ) -> Self {
        Self::try_with_compare(initial, getter, Comparator::strict(), notify)
    }
}

impl<T: 'static> Observation<T> {
    pub fn with_compare(
        initial: T,
        getter: impl Fn() -> T + 'static,
        compare: Comparator<T>,
        notify: impl Fn() + 'static,
    ) -> Self {
        Self {
            getter: Rc::new(move || Ok(getter())),
            compare,
            notify: Rc::new(notify),
            initial,
            baseline: Baseline::default(),
        }
    }

    pub fn try_with_compare<E: Display + 'static>(
        initial: T,
        getter: impl Fn() -> Result<T, E> + 'static,
        compare: Comparator<T>,
        notify: impl Fn() + 'static,
    ) -> Self {
        Self {
            getter: Rc::new(move || getter().map_err(|e| e.to_string())),
            compare,
            notify: Rc::new(notify),
            initial,
            baseline: Baseline::default(),
        }
    }

    pub fn compare(mut self, compare: Comparator<T>) -> Self {
        self.compare = compare;
        self
    }

    pub fn baseline(mut self, baseline: Baseline) -> Self {
        self.baseline = baseline;
        self
    }
}

// =============================================================================
// Entry
// =============================================================================

/// Result of evaluating one entry.
pub(crate) enum Poll {
    Unchanged,
    Changed(Notify),
}

/// Type-erased view of an entry, as stored by the registry.
pub(crate) trait ObserverEntry {
    /// Evaluate the getter and compare against the stored baseline.
    ///
    /// On change the baseline is replaced and the notifier is handed back
    /// so the caller can invoke it without holding a borrow on the entry.
    fn poll(&mut self) -> Result<Poll, WatchError>;

    /// Move the baseline out, for a replacement entry to adopt.
    fn take_baseline(&mut self) -> Option<Box<dyn Any>>;

    /// Key reported in errors.
    fn set_key(&mut self, key: String);
}

pub(crate) struct Entry<T> {
    key: String,
    getter: Getter<T>,
    compare: Comparator<T>,
    notify: Notify,
    /// None once the baseline was handed to a replacement entry.
    previous: Option<T>,
}

impl<T: 'static> Entry<T> {
    /// The observation's initial value becomes the first baseline.
    pub(crate) fn new(key: String, observation: Observation<T>) -> Self {
        Self {
            key,
            getter: observation.getter,
            compare: observation.compare,
            notify: observation.notify,
            previous: Some(observation.initial),
        }
    }
}

impl<T: 'static> ObserverEntry for Entry<T> {
    fn poll(&mut self) -> Result<Poll, WatchError> {
        // Retired entries can still show up in the tick snapshot that was
        // taken before they were replaced
        let Some(previous) = self.previous.as_ref() else {
            return Ok(Poll::Unchanged);
        };

        let getter = &self.getter;
        let compare = &self.compare;
        let evaluated = panic::catch_unwind(AssertUnwindSafe(|| {
            getter().map(|next| {
                let equal = compare.equal(previous, &next);
                (next, equal)
            })
        }));

        match evaluated {
            Ok(Ok((_, true))) => Ok(Poll::Unchanged),
            Ok(Ok((next, false))) => {
                self.previous = Some(next);
                Ok(Poll::Changed(Rc::clone(&self.notify)))
            }
            Ok(Err(message)) => Err(WatchError::Getter {
                key: self.key.clone(),
                message,
            }),
            Err(payload) => Err(WatchError::Panicked {
                key: self.key.clone(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    fn take_baseline(&mut self) -> Option<Box<dyn Any>> {
        self.previous.take().map(|value| Box::new(value) as Box<dyn Any>)
    }

    fn set_key(&mut self, key: String) {
        self.key = key;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
