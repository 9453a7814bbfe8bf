use uuid::Uuid;

use crate::domain::entities::subscriptions::SubscriptionEntity;

/// Read cache for "the user's active subscription". Every state-mutating path
/// must call `evict_active` for the affected user before returning; reads go
/// through `get_active`/`put_active` in the query use case only.
#[cfg_attr(test, mockall::automock)]
pub trait SubscriptionCache: Send + Sync {
    fn get_active(&self, user_id: Uuid) -> Option<SubscriptionEntity>;
    fn put_active(&self, user_id: Uuid, subscription: SubscriptionEntity);
    fn evict_active(&self, user_id: Uuid);
}
