//! In-memory onboarding store for tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use onboarding_types::Onboarding;

use super::OnboardingStore;
use crate::error::StoreError;

/// Records are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, Onboarding>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OnboardingStore for MemoryStore {
    async fn insert(&self, onboarding: &Onboarding) -> Result<Onboarding, StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&onboarding.id) {
            return Err(StoreError::AlreadyExists(onboarding.id));
        }
        let mut stored = onboarding.clone();
        stored.version = 0;
        records.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Onboarding>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn get_by_tenant(&self, tenant_id: Uuid) -> Result<Option<Onboarding>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.tenant_id == Some(tenant_id))
            .cloned())
    }

    async fn find_by_tenant_prefix(&self, prefix: &str) -> Result<Option<Onboarding>, StoreError> {
        if prefix.is_empty() {
            return Ok(None);
        }
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| {
                r.tenant_id
                    .is_some_and(|t| t.to_string().starts_with(prefix))
            })
            .cloned())
    }

    async fn list(&self, tenant_id: Option<Uuid>) -> Result<Vec<Onboarding>, StoreError> {
        let mut results: Vec<Onboarding> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| tenant_id.is_none() || r.tenant_id == tenant_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(results)
    }

    async fn update(&self, onboarding: &Onboarding) -> Result<Onboarding, StoreError> {
        let mut records = self.records.write().await;
        let current = records
            .get(&onboarding.id)
            .ok_or(StoreError::NotFound(onboarding.id))?;

        if current.version != onboarding.version {
            return Err(StoreError::Conflict {
                id: onboarding.id,
                version: onboarding.version,
            });
        }

        let mut stored = onboarding.clone();
        stored.version += 1;
        stored.modified = Utc::now();
        records.insert(stored.id, stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onboarding_types::{OnboardingRequest, OnboardingStatus};

    fn onboarding() -> Onboarding {
        Onboarding::new(OnboardingRequest {
            name: "Acme".into(),
            subdomain: None,
            tier: None,
            billing_plan: None,
        })
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let store = MemoryStore::new();
        let mut record = store.insert(&onboarding()).await.unwrap();
        record.status = OnboardingStatus::Validating;

        let stored = store.update(&record).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(
            store.get(record.id).await.unwrap().unwrap().status,
            OnboardingStatus::Validating
        );
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let store = MemoryStore::new();
        let record = store.insert(&onboarding()).await.unwrap();

        let mut first = record.clone();
        first.status = OnboardingStatus::Validating;
        store.update(&first).await.unwrap();

        let mut second = record;
        second.status = OnboardingStatus::Failed;
        let err = store.update(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { version: 0, .. }));
    }

    #[tokio::test]
    async fn test_tenant_lookups() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let mut record = store.insert(&onboarding()).await.unwrap();
        record.tenant_id = Some(tenant);
        store.update(&record).await.unwrap();
        store.insert(&onboarding()).await.unwrap();

        let short: String = tenant.to_string().chars().take(8).collect();
        assert_eq!(
            store.find_by_tenant_prefix(&short).await.unwrap().unwrap().id,
            record.id
        );
        assert_eq!(store.get_by_tenant(tenant).await.unwrap().unwrap().id, record.id);
        assert_eq!(store.list(Some(tenant)).await.unwrap().len(), 1);
        assert_eq!(store.list(None).await.unwrap().len(), 2);
        assert!(store.find_by_tenant_prefix("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryStore::new();
        let record = onboarding();
        store.insert(&record).await.unwrap();
        assert!(matches!(
            store.insert(&record).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }
}
