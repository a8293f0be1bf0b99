use super::Subscription;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;

struct Listener<K, T> {
    id: u64,
    key: K,
    sender: mpsc::UnboundedSender<T>,
}

/// Registry of push listeners, each registered under a key (a query, or `()`).
///
/// Handles returned by [`ListenerSet::subscribe`] remove their listener on
/// release. The registry is only reached through a `Weak`, so an outstanding
/// handle never keeps a dropped backend alive.
pub struct ListenerSet<K, T> {
    next_id: u64,
    listeners: Vec<Listener<K, T>>,
}

impl<K, T> Default for ListenerSet<K, T> {
    fn default() -> Self {
        ListenerSet {
            next_id: 0,
            listeners: Vec::new(),
        }
    }
}

impl<K, T> ListenerSet<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    /// Registers a listener and sends `initial` to it before anything else.
    pub fn subscribe(set: &Arc<Mutex<Self>>, key: K, initial: T) -> Subscription<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(initial);

        let id = {
            let mut guard = lock(set);
            let id = guard.next_id;
            guard.next_id += 1;
            guard.listeners.push(Listener { id, key, sender });
            id
        };
        tracing::debug!(listener = id, "listener registered");

        let weak: Weak<Mutex<Self>> = Arc::downgrade(set);
        Subscription::new(receiver, move || {
            if let Some(set) = weak.upgrade() {
                lock(&set).remove(id);
            }
        })
    }

    fn remove(&mut self, id: u64) {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        if self.listeners.len() < before {
            tracing::debug!(listener = id, "listener released");
        }
    }

    /// Pushes to every listener for which `payload` yields a value.
    /// Listeners whose receiving end is gone are dropped.
    pub fn notify(&mut self, mut payload: impl FnMut(&mut K) -> Option<T>) {
        self.listeners.retain_mut(|listener| match payload(&mut listener.key) {
            Some(value) => listener.sender.send(value).is_ok(),
            None => !listener.sender.is_closed(),
        });
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Locks the registry, recovering from a poisoned lock.
pub(crate) fn lock<V>(mutex: &Mutex<V>) -> std::sync::MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
