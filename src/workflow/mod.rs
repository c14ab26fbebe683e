//! Onboarding workflow.
//!
//! [`OnboardingService`] owns the handlers for every phase. It holds no
//! mutable state of its own: each handler loads the record, checks the
//! current status, and writes back through [`OnboardingService::modify`],
//! which retries on optimistic-concurrency conflicts.
//!
//! ## Modules
//!
//! - `requests`: the request surface (create, get, list, replace, delete)
//! - `validation`: Initiated handler and the validation queue worker
//! - `tenant`: tenant assignment and the base stack phase
//! - `provisioning`: app stack phase and provisioned-tenant updates
//! - `parameters`: stack parameter assembly
//! - `stacks`: stack status listener
//! - `deployment`: deployment-ready fan-out and pipeline tracking
//! - `failure`: the single failure sink
//! - `teardown`: tenant deletion
//! - `platform`: shared platform stack updates

mod deployment;
mod failure;
mod parameters;
mod platform;
mod provisioning;
mod requests;
mod stacks;
mod teardown;
mod tenant;
mod validation;

pub use parameters::{path_priorities, service_resource_name, TenantResources};
pub use stacks::{aggregate_status, StackAggregate};
pub use validation::{BatchReport, ValidationOutcome};

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use onboarding_types::{Onboarding, OnboardingStatus};

use crate::clients::{
    ContainerRegistry, DnsRegistry, NetworkAllocator, ObjectStorage, ProvisioningEngine,
    SettingsService, TenantDirectory,
};
use crate::config::OnboardingConfig;
use crate::error::{OnboardingError, OnboardingResult, StoreError};
use crate::events::{
    EventEnvelope, EventPublisher, OnboardingEvent, StatusChangedNotice, EVENT_SOURCE,
    STATUS_CHANGED,
};
use crate::queue::ValidationQueue;
use crate::store::OnboardingStore;

/// Conditional-write attempts before a conflict is surfaced to the caller.
const MAX_CONFLICT_RETRIES: usize = 5;

/// Synchronous collaborators the handlers call.
#[derive(Clone)]
pub struct Collaborators {
    pub tenants: Arc<dyn TenantDirectory>,
    pub settings: Arc<dyn SettingsService>,
    pub network: Arc<dyn NetworkAllocator>,
    pub registry: Arc<dyn ContainerRegistry>,
    pub dns: Arc<dyn DnsRegistry>,
    pub provisioning: Arc<dyn ProvisioningEngine>,
    pub storage: Arc<dyn ObjectStorage>,
}

pub struct OnboardingService {
    config: Arc<OnboardingConfig>,
    store: Arc<dyn OnboardingStore>,
    queue: Arc<dyn ValidationQueue>,
    publisher: Arc<dyn EventPublisher>,
    clients: Collaborators,
}

impl OnboardingService {
    pub fn new(
        config: Arc<OnboardingConfig>,
        store: Arc<dyn OnboardingStore>,
        queue: Arc<dyn ValidationQueue>,
        publisher: Arc<dyn EventPublisher>,
        clients: Collaborators,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            publisher,
            clients,
        }
    }

    pub fn config(&self) -> &OnboardingConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<dyn ValidationQueue> {
        &self.queue
    }

    // ========================================================================
    // RECORD GLUE
    // ========================================================================

    async fn load(&self, id: Uuid) -> OnboardingResult<Onboarding> {
        self.store
            .get(id)
            .await?
            .ok_or(OnboardingError::NotFound(id))
    }

    /// Load, mutate and conditionally write one record.
    ///
    /// `apply` runs against a fresh copy on every attempt. Returning `None`
    /// skips the write (the record is not in a state the caller acts on).
    /// Returns the stored record and the closure's value when a write
    /// happened.
    async fn modify<T, F>(
        &self,
        id: Uuid,
        mut apply: F,
    ) -> OnboardingResult<Option<(Onboarding, T)>>
    where
        F: FnMut(&mut Onboarding) -> OnboardingResult<Option<T>> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            let mut record = self.load(id).await?;
            let Some(value) = apply(&mut record)? else {
                return Ok(None);
            };

            match self.store.update(&record).await {
                Ok(stored) => return Ok(Some((stored, value))),
                Err(StoreError::Conflict { version, .. }) if attempt < MAX_CONFLICT_RETRIES => {
                    debug!(onboarding_id = %id, version, attempt, "Write conflict, re-reading");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Move `from -> to`. `None` when the record was not at `from`.
    async fn advance(
        &self,
        id: Uuid,
        from: OnboardingStatus,
        to: OnboardingStatus,
    ) -> OnboardingResult<Option<Onboarding>> {
        let result = self
            .modify(id, |record| {
                if record.status != from {
                    return Ok(None);
                }
                set_status(record, to)?;
                Ok(Some(()))
            })
            .await?;

        match result {
            Some((record, ())) => {
                debug!(onboarding_id = %id, %from, %to, "Status advanced");
                Ok(Some(record))
            }
            None => {
                debug!(onboarding_id = %id, %from, %to, "Status not advanced, record moved on");
                Ok(None)
            }
        }
    }

    // ========================================================================
    // PUBLISHING
    // ========================================================================

    async fn publish(
        &self,
        event: OnboardingEvent,
        payload: &(impl Serialize + Sync),
        correlation: Option<&str>,
    ) -> OnboardingResult<()> {
        let envelope = EventEnvelope::lifecycle(event, payload)?.correlated(correlation);
        self.publisher.publish(envelope).await?;
        Ok(())
    }

    /// Outbound notification under this system's source tag.
    async fn notify(
        &self,
        detail_type: &str,
        payload: &(impl Serialize + Sync),
        correlation: Option<&str>,
    ) -> OnboardingResult<()> {
        let envelope =
            EventEnvelope::new(EVENT_SOURCE, detail_type, payload)?.correlated(correlation);
        self.publisher.publish(envelope).await?;
        Ok(())
    }

    async fn notify_status(
        &self,
        tenant_id: Uuid,
        status: OnboardingStatus,
        correlation: Option<&str>,
    ) -> OnboardingResult<()> {
        let notice = StatusChangedNotice {
            tenant_id,
            onboarding_status: status.to_string(),
        };
        self.notify(STATUS_CHANGED, &notice, correlation).await
    }
}

/// Apply a status change through the transition guard.
fn set_status(record: &mut Onboarding, to: OnboardingStatus) -> OnboardingResult<()> {
    if !record.status.can_transition_to(to) {
        return Err(OnboardingError::InvalidTransition {
            from: record.status,
            to,
        });
    }
    record.status = to;
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing;
