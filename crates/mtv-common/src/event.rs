//! Listener registry.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::lock;

/// Handle returned by [`Event::add_listener`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A publish/subscribe point owned by whoever raises it.
///
/// Listeners are called synchronously, in registration order, from the thread
/// that raises the event. The registry lock is not held while listeners run,
/// so a listener may add or remove listeners.
pub struct Event<T> {
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<T> Event<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a listener.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Calls every registered listener with `args`.
    pub fn raise(&self, args: &T) {
        let listeners: Vec<Listener<T>> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(args);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn clear(&self) {
        lock(&self.listeners).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn raise_calls_listeners_in_order() {
        let event = Event::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        event.add_listener(move |value| lock(&first).push(("first", *value)));
        let second = Arc::clone(&seen);
        event.add_listener(move |value| lock(&second).push(("second", *value)));

        event.raise(&7);
        assert_eq!(*lock(&seen), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let event = Event::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = event.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        event.raise(&());
        assert!(event.remove_listener(id));
        assert!(!event.remove_listener(id));
        event.raise(&());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(event.listener_count(), 0);
    }

    #[test]
    fn listener_may_remove_itself() {
        let event = Arc::new(Event::<()>::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let registry = Arc::clone(&event);
        let own_id = Arc::clone(&slot);
        let id = event.add_listener(move |_| {
            if let Some(id) = *lock(&own_id) {
                registry.remove_listener(id);
            }
        });
        *lock(&slot) = Some(id);

        event.raise(&());
        assert_eq!(event.listener_count(), 0);
    }
}
