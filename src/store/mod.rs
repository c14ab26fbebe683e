//! Onboarding record store.
//!
//! All coordination between handlers lives in the record. Writes are
//! conditional on `version`: a writer that read version N can only replace the
//! record while it is still at N, and the store hands back version N+1. A lost
//! race surfaces as [`StoreError::Conflict`] and the caller re-reads.

mod memory;
#[cfg(feature = "database")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgOnboardingStore;

use async_trait::async_trait;
use uuid::Uuid;

use onboarding_types::Onboarding;

use crate::error::StoreError;

#[async_trait]
pub trait OnboardingStore: Send + Sync {
    /// Persist a new record at version 0.
    async fn insert(&self, onboarding: &Onboarding) -> Result<Onboarding, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Onboarding>, StoreError>;

    async fn get_by_tenant(&self, tenant_id: Uuid) -> Result<Option<Onboarding>, StoreError>;

    /// Look up by the leading characters of the tenant id, as embedded in
    /// resource names.
    async fn find_by_tenant_prefix(&self, prefix: &str) -> Result<Option<Onboarding>, StoreError>;

    /// Newest first, optionally restricted to one tenant.
    async fn list(&self, tenant_id: Option<Uuid>) -> Result<Vec<Onboarding>, StoreError>;

    /// Replace the record if the stored version still equals
    /// `onboarding.version`. Returns the stored record with the bumped
    /// version and a fresh `modified` timestamp.
    async fn update(&self, onboarding: &Onboarding) -> Result<Onboarding, StoreError>;
}
