//! Request surface: create, read, replace and delete onboarding records.

use tracing::{info, warn};
use uuid::Uuid;

use onboarding_types::api::CreateOnboardingResponse;
use onboarding_types::{Onboarding, OnboardingRequest};

use super::OnboardingService;
use crate::error::{OnboardingError, OnboardingResult};
use crate::events::{OnboardingDetail, OnboardingEvent};

impl OnboardingService {
    /// Create the record at `created`, presign the archive upload target and
    /// publish Initiated.
    pub async fn create_onboarding(
        &self,
        request: OnboardingRequest,
    ) -> OnboardingResult<CreateOnboardingResponse> {
        if request.name.trim().is_empty() {
            return Err(OnboardingError::invalid_request("Tenant name is required"));
        }

        let mut record = Onboarding::new(request);
        let key = format!("temp/{}.zip", record.id);
        let upload_url = self
            .clients
            .storage
            .presign_upload(&key, self.config.upload_ttl)
            .await?;
        record.zip_file_url = Some(upload_url.clone());

        let record = self.store.insert(&record).await?;
        info!(onboarding_id = %record.id, name = %record_name(&record), "Onboarding created");

        self.publish(
            OnboardingEvent::Initiated,
            &OnboardingDetail {
                onboarding_id: record.id,
            },
            None,
        )
        .await?;

        Ok(CreateOnboardingResponse {
            onboarding: record,
            upload_url,
        })
    }

    pub async fn get_onboarding(&self, id: Uuid) -> OnboardingResult<Onboarding> {
        self.load(id).await
    }

    pub async fn list_onboardings(
        &self,
        tenant_id: Option<Uuid>,
    ) -> OnboardingResult<Vec<Onboarding>> {
        Ok(self.store.list(tenant_id).await?)
    }

    /// Replace a record wholesale.
    ///
    /// The replacement must keep the record's invariants: same tenant once
    /// assigned, a legal status move, and the stack list extended rather
    /// than rewritten. `body.version` must match the stored version.
    pub async fn replace_onboarding(
        &self,
        id: Uuid,
        body: Onboarding,
    ) -> OnboardingResult<Onboarding> {
        if body.id != id {
            return Err(OnboardingError::invalid_request(
                "Request body id does not match resource id",
            ));
        }

        let current = self.load(id).await?;
        if current.tenant_id.is_some() && body.tenant_id != current.tenant_id {
            return Err(OnboardingError::invalid_request("Tenant id cannot be changed"));
        }
        if body.status != current.status && !current.status.can_transition_to(body.status) {
            return Err(OnboardingError::InvalidTransition {
                from: current.status,
                to: body.status,
            });
        }
        let extends = body.stacks.len() >= current.stacks.len()
            && current
                .stacks
                .iter()
                .zip(&body.stacks)
                .all(|(old, new)| old.stack_id == new.stack_id);
        if !extends {
            return Err(OnboardingError::invalid_request(
                "Stacks can only be appended",
            ));
        }

        let stored = self.store.update(&body).await?;
        info!(onboarding_id = %id, status = %stored.status, "Onboarding replaced");
        Ok(stored)
    }

    /// Records are never removed by this system.
    pub async fn delete_onboarding(&self, id: Uuid) -> OnboardingResult<()> {
        warn!(onboarding_id = %id, "Delete requested, onboarding records are retained");
        Ok(())
    }
}

fn record_name(record: &Onboarding) -> &str {
    record.request.as_ref().map(|r| r.name.as_str()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::error::StoreError;
    use onboarding_types::{OnboardingStack, OnboardingStatus};

    #[tokio::test]
    async fn test_create_onboarding() {
        let harness = Harness::new().await;
        let response = harness
            .service
            .create_onboarding(Harness::request("Acme"))
            .await
            .unwrap();

        assert_eq!(response.onboarding.status, OnboardingStatus::Created);
        assert!(response.upload_url.contains(&format!("temp/{}.zip", response.onboarding.id)));
        assert!(response.upload_url.contains("signature="));
        assert_eq!(
            response.onboarding.zip_file_url.as_deref(),
            Some(response.upload_url.as_str())
        );

        let initiated = harness.events.of_type("Onboarding Initiated").await;
        assert_eq!(initiated.len(), 1);
        let detail: OnboardingDetail = initiated[0].payload_as().unwrap();
        assert_eq!(detail.onboarding_id, response.onboarding.id);
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let harness = Harness::new().await;
        let err = harness
            .service
            .create_onboarding(Harness::request("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, OnboardingError::InvalidRequest(_)));
        assert!(harness.events.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_by_tenant() {
        let harness = Harness::new().await;
        let tenant = Uuid::new_v4();
        harness.seed_record(OnboardingStatus::Validated, Some(tenant)).await;
        harness.seed(OnboardingStatus::Created).await;

        assert_eq!(harness.service.list_onboardings(None).await.unwrap().len(), 2);
        let filtered = harness.service.list_onboardings(Some(tenant)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].tenant_id, Some(tenant));
    }

    #[tokio::test]
    async fn test_replace_rejects_mismatched_id() {
        let harness = Harness::new().await;
        let record = harness.seed(OnboardingStatus::Created).await;
        let err = harness
            .service
            .replace_onboarding(Uuid::new_v4(), record)
            .await
            .unwrap_err();
        assert!(matches!(err, OnboardingError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_replace_guards_invariants() {
        let harness = Harness::new().await;
        let record = harness
            .seed_record(OnboardingStatus::Provisioning, Some(Uuid::new_v4()))
            .await;

        let mut changed_tenant = record.clone();
        changed_tenant.tenant_id = Some(Uuid::new_v4());
        assert!(harness
            .service
            .replace_onboarding(record.id, changed_tenant)
            .await
            .is_err());

        let mut backwards = record.clone();
        backwards.status = OnboardingStatus::Created;
        assert!(matches!(
            harness.service.replace_onboarding(record.id, backwards).await,
            Err(OnboardingError::InvalidTransition { .. })
        ));

        let mut grown = record.clone();
        grown.stacks.push(OnboardingStack::new("base", "stack-1", true));
        let stored = harness
            .service
            .replace_onboarding(record.id, grown)
            .await
            .unwrap();
        assert_eq!(stored.stacks.len(), 1);

        let mut shrunk = stored.clone();
        shrunk.stacks.clear();
        assert!(harness.service.replace_onboarding(record.id, shrunk).await.is_err());
    }

    #[tokio::test]
    async fn test_replace_with_stale_version_conflicts() {
        let harness = Harness::new().await;
        let record = harness.seed(OnboardingStatus::Created).await;
        harness
            .service
            .replace_onboarding(record.id, record.clone())
            .await
            .unwrap();

        let err = harness
            .service
            .replace_onboarding(record.id, record)
            .await
            .unwrap_err();
        assert!(matches!(err, OnboardingError::Store(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_delete_keeps_record() {
        let harness = Harness::new().await;
        let record = harness.seed(OnboardingStatus::Created).await;
        harness.service.delete_onboarding(record.id).await.unwrap();
        assert_eq!(harness.record(record.id).await.id, record.id);
    }
}
