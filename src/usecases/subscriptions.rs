use std::sync::Arc;

use chrono::{Months, NaiveDate};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity};
use crate::domain::gateways::cache::SubscriptionCache;
use crate::domain::repositories::subscriptions::{
    InsertSubscriptionOutcome, SubscriptionRepository,
};
use crate::domain::repositories::users::UserRepository;
use crate::domain::time::Clock;
use crate::domain::value_objects::enums::plans::Plan;
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::usecases::transitions;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("user not found")]
    UserNotFound,
    #[error("user already has an active or cancel-scheduled subscription")]
    AlreadyActive,
    #[error("active subscription not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type UseCaseResult<T> = std::result::Result<T, SubscriptionError>;

/// Purchase, query and cancellation paths. The renewal machinery never goes
/// through here; it claims rows directly.
pub struct SubscriptionUseCase<S, U, C, K>
where
    S: SubscriptionRepository + 'static,
    U: UserRepository + 'static,
    C: SubscriptionCache + 'static,
    K: Clock + 'static,
{
    subscription_repo: Arc<S>,
    user_repo: Arc<U>,
    cache: Arc<C>,
    clock: Arc<K>,
}

impl<S, U, C, K> SubscriptionUseCase<S, U, C, K>
where
    S: SubscriptionRepository + 'static,
    U: UserRepository + 'static,
    C: SubscriptionCache + 'static,
    K: Clock + 'static,
{
    pub fn new(subscription_repo: Arc<S>, user_repo: Arc<U>, cache: Arc<C>, clock: Arc<K>) -> Self {
        Self {
            subscription_repo,
            user_repo,
            cache,
            clock,
        }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        plan: Plan,
        start_date: Option<NaiveDate>,
    ) -> UseCaseResult<SubscriptionEntity> {
        info!(%user_id, plan = %plan, "subscriptions: create requested");

        let user_exists = self.user_repo.exists(user_id).await.map_err(|err| {
            error!(%user_id, db_error = ?err, "subscriptions: failed to check user existence");
            SubscriptionError::Internal(err)
        })?;
        if !user_exists {
            return Err(SubscriptionError::UserNotFound);
        }

        let existing = self.find_active(user_id).await?;
        if existing.is_some() {
            warn!(%user_id, "subscriptions: create rejected, already active");
            return Err(SubscriptionError::AlreadyActive);
        }

        let now = self.clock.now();
        let start = start_date.unwrap_or_else(|| self.clock.today_utc());
        let expiration = start
            .checked_add_months(Months::new(1))
            .ok_or_else(|| anyhow::anyhow!("start date out of range"))?;

        let insert = InsertSubscriptionEntity {
            user_id,
            plan: plan.to_string(),
            start_date: start,
            expiration_date: expiration,
            status: SubscriptionStatus::Active.to_string(),
            auto_renew: true,
            renewal_failures: 0,
            created_at: now,
            updated_at: now,
        };

        let outcome = self.subscription_repo.create(insert).await.map_err(|err| {
            error!(%user_id, db_error = ?err, "subscriptions: failed to insert subscription");
            SubscriptionError::Internal(err)
        })?;
        self.cache.evict_active(user_id);

        match outcome {
            InsertSubscriptionOutcome::Created(entity) => {
                info!(
                    %user_id,
                    subscription_id = %entity.id,
                    expiration = %entity.expiration_date,
                    "subscriptions: created"
                );
                Ok(entity)
            }
            // The partial unique index caught a race the pre-check missed.
            InsertSubscriptionOutcome::Conflict => {
                warn!(%user_id, "subscriptions: create lost race to concurrent purchase");
                Err(SubscriptionError::AlreadyActive)
            }
        }
    }

    pub async fn get_active(&self, user_id: Uuid) -> UseCaseResult<SubscriptionEntity> {
        if let Some(cached) = self.cache.get_active(user_id) {
            return Ok(cached);
        }

        let subscription = self
            .find_active(user_id)
            .await?
            .ok_or(SubscriptionError::NotFound)?;

        self.cache.put_active(user_id, subscription.clone());
        Ok(subscription)
    }

    pub async fn history(&self, user_id: Uuid) -> UseCaseResult<Vec<SubscriptionEntity>> {
        let history = self
            .subscription_repo
            .history_for_user(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "subscriptions: failed to load history");
                SubscriptionError::Internal(err)
            })?;
        Ok(history)
    }

    /// Idempotent: canceling a CANCEL_SCHEDULED subscription returns the
    /// current state unchanged. Access is retained through the current
    /// expiration date either way.
    pub async fn cancel(&self, user_id: Uuid) -> UseCaseResult<SubscriptionEntity> {
        let mut subscription = self
            .find_active(user_id)
            .await?
            .ok_or(SubscriptionError::NotFound)?;

        if subscription.status_enum() == Some(SubscriptionStatus::CancelScheduled) {
            return Ok(subscription);
        }

        let now = self.clock.now();
        transitions::apply_cancel_requested(&mut subscription, now);

        let saved = self
            .subscription_repo
            .save(subscription.clone())
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "subscriptions: failed to save cancellation");
                SubscriptionError::Internal(err)
            })?;
        if !saved {
            return Err(SubscriptionError::Internal(anyhow::anyhow!(
                "subscription changed concurrently, retry the cancellation"
            )));
        }

        self.cache.evict_active(user_id);
        subscription.version += 1;

        info!(
            %user_id,
            subscription_id = %subscription.id,
            access_until = %subscription.expiration_date,
            "subscriptions: cancellation scheduled"
        );
        Ok(subscription)
    }

    async fn find_active(&self, user_id: Uuid) -> UseCaseResult<Option<SubscriptionEntity>> {
        self.subscription_repo
            .find_active_for_user(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "subscriptions: failed to load active subscription");
                SubscriptionError::Internal(err)
            })
    }
}
