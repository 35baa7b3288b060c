use crate::handlers::{EventHandlers, HandlerId};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

#[derive(Debug)]
struct Inner<T> {
    value: RwLock<T>,
    changed: EventHandlers<T>,
}

/// A shared, observable value.
///
/// Cloning yields another handle to the same value. Listeners are notified
/// with the new value after every effective change, on the thread that made
/// the change.
#[derive(Debug)]
pub struct Property<T>(Arc<Inner<T>>);

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Default + Clone + PartialEq + Send + Sync + 'static> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Property<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(Inner {
            value: RwLock::new(value),
            changed: EventHandlers::new(),
        }))
    }

    pub fn get(&self) -> T {
        self.0.value.read().clone()
    }

    /// Store `value` and notify listeners.
    ///
    /// Returns `false` without notifying anyone when `value` equals the
    /// current value.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.0.value.write();
            if *current == value {
                return false;
            }
            *current = value.clone();
        }
        self.0.changed.raise(&value);
        true
    }

    /// Listen for changes. The current value is not replayed.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> HandlerId {
        self.0.changed.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        self.0.changed.unsubscribe(id)
    }

    /// A view of this property that cannot be written through.
    pub fn read_only(&self) -> ReadOnlyProperty<T> {
        ReadOnlyProperty(self.clone())
    }

    pub(crate) fn downgrade(&self) -> WeakProperty<T> {
        WeakProperty(Arc::downgrade(&self.0))
    }
}

pub(crate) struct WeakProperty<T>(Weak<Inner<T>>);

impl<T> WeakProperty<T> {
    pub(crate) fn upgrade(&self) -> Option<Property<T>> {
        self.0.upgrade().map(Property)
    }
}

/// Read access to a [`Property`] owned by someone else.
#[derive(Debug, Clone)]
pub struct ReadOnlyProperty<T>(Property<T>);

impl<T: Clone + PartialEq + Send + Sync + 'static> ReadOnlyProperty<T> {
    pub fn get(&self) -> T {
        self.0.get()
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> HandlerId {
        self.0.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        self.0.unsubscribe(id)
    }
}
