use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::domain::entities::subscriptions::SubscriptionEntity;
use crate::domain::gateways::cache::SubscriptionCache;

/// Process-local cache for the active-subscription read path. Correctness does
/// not depend on it: every mutation evicts the affected user, and a stale miss
/// just falls through to the database.
#[derive(Default)]
pub struct InMemorySubscriptionCache {
    active: RwLock<HashMap<Uuid, SubscriptionEntity>>,
}

impl InMemorySubscriptionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubscriptionCache for InMemorySubscriptionCache {
    fn get_active(&self, user_id: Uuid) -> Option<SubscriptionEntity> {
        match self.active.read() {
            Ok(guard) => guard.get(&user_id).cloned(),
            Err(_) => None,
        }
    }

    fn put_active(&self, user_id: Uuid, subscription: SubscriptionEntity) {
        if let Ok(mut guard) = self.active.write() {
            guard.insert(user_id, subscription);
        }
    }

    fn evict_active(&self, user_id: Uuid) {
        if let Ok(mut guard) = self.active.write() {
            guard.remove(&user_id);
        }
    }
}
