use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use modelsync_core::Model;

/// Change listener for one model type, called after every successful local write.
pub trait Observer: Send + Sync {
    fn on_change(&self);
}

impl<F> Observer for F
where
    F: Fn() + Send + Sync,
{
    fn on_change(&self) {
        self();
    }
}

/// Handle returned by [`ObserverRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    model: TypeId,
    id: u64,
}

type ObserverList = Vec<(u64, Arc<dyn Observer>)>;

/// Observers keyed by model type, shared between the stores of an application.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    observers: RwLock<HashMap<TypeId, ObserverList>>,
}

impl ObserverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: Model>(&self, observer: impl Observer + 'static) -> Subscription {
        let model = TypeId::of::<M>();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Registering observer {} for {}", id, std::any::type_name::<M>());
        self.observers.write().entry(model).or_default().push((id, Arc::new(observer)));
        Subscription { model, id }
    }

    /// Returns whether the subscription was still registered.
    pub fn unregister(&self, subscription: Subscription) -> bool {
        let mut observers = self.observers.write();
        let Some(list) = observers.get_mut(&subscription.model) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != subscription.id);
        let removed = list.len() != before;
        if list.is_empty() {
            observers.remove(&subscription.model);
        }
        removed
    }

    /// Call every observer of `M`. The registry lock is released first, so
    /// observers may register or unregister.
    pub fn notify<M: Model>(&self) {
        let observers: Vec<Arc<dyn Observer>> = self
            .observers
            .read()
            .get(&TypeId::of::<M>())
            .map(|list| list.iter().map(|(_, observer)| Arc::clone(observer)).collect())
            .unwrap_or_default();

        if observers.is_empty() {
            tracing::debug!("No observers for {}", std::any::type_name::<M>());
            return;
        }
        for observer in observers {
            observer.on_change();
        }
    }

    #[must_use]
    pub fn observer_count<M: Model>(&self) -> usize {
        self.observers.read().get(&TypeId::of::<M>()).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> =
            self.observers.read().iter().map(|(model, list)| (*model, list.len())).collect();
        f.debug_struct("ObserverRegistry").field("observers", &counts).finish()
    }
}
