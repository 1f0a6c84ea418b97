use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use indexmap::IndexMap;
use parking_lot::Mutex;

type ObserverMap<K, T> = IndexMap<u64, Observer<K, T>>;

struct Observer<K, T> {
    key: K,
    sender: Sender<T>,
}

/// Receiving end of a registered observer. Dropping it unregisters the
/// observer so nothing is published to it afterwards.
pub struct Subscription<T> {
    receiver: Receiver<T>,
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    pub fn try_recv(&self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drains every queued notification and returns the most recent one.
    pub fn drain_latest(&self) -> Option<T> {
        let mut latest = None;
        while let Some(value) = self.try_recv() {
            latest = Some(value);
        }
        latest
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pending", &self.receiver.len())
            .field("registered", &self.unregister.is_some())
            .finish()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

/// Observer list shared by a backend implementation. Each observer gets its
/// own channel and a key the publisher uses to decide what it receives.
pub struct ObserverRegistry<K, T> {
    observers: Arc<Mutex<ObserverMap<K, T>>>,
    next_id: AtomicU64,
}

impl<K, T> Default for ObserverRegistry<K, T> {
    fn default() -> Self {
        Self {
            observers: Arc::new(Mutex::new(IndexMap::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<K, T> ObserverRegistry<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    pub fn register(&self, key: K, initial: Option<T>) -> Subscription<T> {
        let (sender, receiver) = unbounded();
        if let Some(value) = initial {
            // the receiver is alive in this scope, so the send cannot fail
            let _ = sender.send(value);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().insert(id, Observer { key, sender });

        let observers: Weak<Mutex<ObserverMap<K, T>>> = Arc::downgrade(&self.observers);
        Subscription {
            receiver,
            unregister: Some(Box::new(move || {
                if let Some(observers) = observers.upgrade() {
                    observers.lock().shift_remove(&id);
                }
            })),
        }
    }

    /// Offers a value to every observer; `value_for` returns `None` to skip
    /// one. Observers whose receiver is gone are pruned.
    pub fn publish<F>(&self, mut value_for: F) -> usize
    where
        F: FnMut(&K) -> Option<T>,
    {
        let mut delivered = 0;
        let mut observers = self.observers.lock();
        observers.retain(|_, observer| {
            let Some(value) = value_for(&observer.key) else {
                return true;
            };
            match observer.sender.send(value) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
