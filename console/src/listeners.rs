//! Explicit listener registration.
//!
//! Components that publish events own a [`Listeners`] registry. Consumers
//! subscribe with a callback and receive a [`Subscription`]; dropping it
//! (or calling [`Subscription::unsubscribe`]) removes the callback, which
//! ties the registration to the consumer's lifetime.

use std::sync::{Arc, Mutex, Weak};

use crate::sync::lock;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Table<E> {
    next_id: u64,
    entries: Vec<(u64, Callback<E>)>,
}

/// A registry of callbacks for events of type `E`. Clones share the registry.
pub struct Listeners<E> {
    table: Arc<Mutex<Table<E>>>,
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(Table {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register `callback` until the returned subscription is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription<E>
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut table = lock(&self.table);
        let id = table.next_id;
        table.next_id += 1;
        table.entries.push((id, Arc::new(callback)));

        Subscription {
            id,
            table: Arc::downgrade(&self.table),
        }
    }

    /// Call every registered callback with `event`.
    ///
    /// Callbacks run outside the registry lock, so they may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = lock(&self.table)
            .entries
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.table).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Listeners<E> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
        }
    }
}

/// Handle of one registered callback.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription<E> {
    id: u64,
    table: Weak<Mutex<Table<E>>>,
}

impl<E> Subscription<E> {
    /// Remove the callback now.
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    fn remove(&self) {
        if let Some(table) = self.table.upgrade() {
            lock(&table).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_every_subscriber() {
        let listeners = Listeners::<u32>::new();
        let sum = Arc::new(AtomicUsize::new(0));

        let s1 = sum.clone();
        let _a = listeners.subscribe(move |v| {
            s1.fetch_add(*v as usize, Ordering::SeqCst);
        });
        let s2 = sum.clone();
        let _b = listeners.subscribe(move |v| {
            s2.fetch_add(*v as usize * 10, Ordering::SeqCst);
        });

        listeners.emit(&2);
        assert_eq!(sum.load(Ordering::SeqCst), 22);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let listeners = Listeners::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let subscription = listeners.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        listeners.emit(&());
        assert_eq!(listeners.len(), 1);

        subscription.unsubscribe();
        listeners.emit(&());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_clones_share_registry() {
        let listeners = Listeners::<()>::new();
        let clone = listeners.clone();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let _subscription = clone.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        listeners.emit(&());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_outliving_registry_is_harmless() {
        let listeners = Listeners::<()>::new();
        let subscription = listeners.subscribe(|_| {});
        drop(listeners);
        drop(subscription);
    }

    #[test]
    fn test_callback_may_subscribe_during_emit() {
        let listeners = Listeners::<()>::new();
        let inner = listeners.clone();
        let held = Arc::new(Mutex::new(Vec::new()));

        let h = held.clone();
        let _subscription = listeners.subscribe(move |_| {
            let nested = inner.subscribe(|_| {});
            lock(&h).push(nested);
        });

        listeners.emit(&());
        assert_eq!(listeners.len(), 2);
    }
}
