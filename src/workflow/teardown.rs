//! Tenant teardown.

use tracing::{info, warn};
use uuid::Uuid;

use onboarding_types::OnboardingStatus;

use super::parameters::base_stack_name;
use super::{set_status, OnboardingService};
use crate::error::{ClientError, OnboardingResult};

impl OnboardingService {
    /// Mark the tenant's onboarding `deleting` and tear its stacks down.
    ///
    /// App stacks go before the base stack. Without a record only the base
    /// stack name derived from the tenant id is known. A stack the engine no
    /// longer has is already gone.
    pub async fn delete_tenant(&self, tenant_id: Uuid) -> OnboardingResult<()> {
        let stacks = match self.store.get_by_tenant(tenant_id).await? {
            Some(record) => {
                let marked = self
                    .modify(record.id, |record| {
                        if !record.status.can_transition_to(OnboardingStatus::Deleting) {
                            return Ok(None);
                        }
                        set_status(record, OnboardingStatus::Deleting)?;
                        Ok(Some(()))
                    })
                    .await?;
                match marked {
                    Some(_) => info!(onboarding_id = %record.id, %tenant_id, "Onboarding deleting"),
                    None => warn!(
                        onboarding_id = %record.id,
                        status = %record.status,
                        "Status left as is for tenant teardown"
                    ),
                }
                let (base, apps): (Vec<_>, Vec<_>) =
                    record.stacks.into_iter().partition(|s| s.base_stack);
                apps.into_iter()
                    .chain(base)
                    .map(|s| s.stack_id)
                    .collect::<Vec<_>>()
            }
            None => {
                let short_id: String = tenant_id.to_string().chars().take(8).collect();
                vec![base_stack_name(&self.config, &short_id)]
            }
        };

        for stack in &stacks {
            match self.clients.provisioning.delete_stack(stack).await {
                Ok(()) => info!(%tenant_id, stack, "Stack deletion requested"),
                Err(ClientError::NotFound(_)) => {
                    warn!(%tenant_id, stack, "Stack does not exist, nothing to delete");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::clients::{CreateStackRequest, ProvisioningEngine};
    use onboarding_types::OnboardingStack;

    async fn create_stack(harness: &Harness, name: &str) -> String {
        let request = CreateStackRequest {
            stack_name: name.to_string(),
            template_url: "https://templates.example/t.yaml".to_string(),
            parameters: Vec::new(),
            notification_target: "onboarding-stack".to_string(),
            capabilities: Vec::new(),
        };
        harness.env.provisioning.create_stack(&request).await.unwrap()
    }

    #[tokio::test]
    async fn test_delete_tenant_marks_deleting_and_removes_stacks() {
        let harness = Harness::new().await;
        let tenant_id = Uuid::new_v4();
        let record = harness
            .seed_record(OnboardingStatus::Succeeded, Some(tenant_id))
            .await;
        let base = create_stack(&harness, "base").await;
        let web = create_stack(&harness, "web").await;
        harness
            .service
            .modify(record.id, |r| {
                r.stacks.push(OnboardingStack::new("base", base.clone(), true));
                r.stacks.push(OnboardingStack::new("web", web.clone(), false));
                Ok(Some(()))
            })
            .await
            .unwrap();

        harness.service.delete_tenant(tenant_id).await.unwrap();

        assert_eq!(harness.record(record.id).await.status, OnboardingStatus::Deleting);
        assert_eq!(harness.env.provisioning.deleted().await, vec![web, base]);
    }

    #[tokio::test]
    async fn test_delete_tenant_without_record_uses_base_stack_name() {
        let harness = Harness::new().await;
        let tenant_id = Uuid::new_v4();
        let short = &tenant_id.to_string()[..8];
        let name = format!("onb-test-tenant-{short}");
        create_stack(&harness, &name).await;

        harness.service.delete_tenant(tenant_id).await.unwrap();

        assert_eq!(harness.env.provisioning.deleted().await, vec![name]);
    }

    #[tokio::test]
    async fn test_missing_stack_is_tolerated() {
        let harness = Harness::new().await;
        let tenant_id = Uuid::new_v4();
        let record = harness
            .seed_record(OnboardingStatus::Provisioned, Some(tenant_id))
            .await;

        harness.service.delete_tenant(tenant_id).await.unwrap();
        harness.service.delete_tenant(Uuid::new_v4()).await.unwrap();

        assert_eq!(harness.record(record.id).await.status, OnboardingStatus::Deleting);
        assert!(harness.env.provisioning.deleted().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_record_keeps_status() {
        let harness = Harness::new().await;
        let tenant_id = Uuid::new_v4();
        let record = harness
            .seed_record(OnboardingStatus::Failed, Some(tenant_id))
            .await;

        harness.service.delete_tenant(tenant_id).await.unwrap();

        assert_eq!(harness.record(record.id).await.status, OnboardingStatus::Failed);
    }

    #[tokio::test]
    async fn test_engine_outage_propagates() {
        let harness = Harness::new().await;
        harness.env.provisioning.set_outage(Some("throttled")).await;

        assert!(harness.service.delete_tenant(Uuid::new_v4()).await.is_err());
    }
}
