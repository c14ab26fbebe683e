//! Deployment triggers and pipeline observation.

use tracing::{debug, info, warn};
use uuid::Uuid;

use onboarding_types::{Onboarding, OnboardingStatus};
#[cfg(test)]
use onboarding_types::OnboardingStack;

use super::OnboardingService;
use crate::error::OnboardingResult;
use crate::events::{PipelineDetail, PipelineState, WorkloadReadyNotice, WORKLOAD_READY};

impl OnboardingService {
    /// Record `provisioned`, then send one workload-ready notification per
    /// configured service.
    ///
    /// A record already `provisioned` is a redelivery after a failed send and
    /// repeats the notifications.
    pub async fn handle_provisioned(
        &self,
        id: Uuid,
        correlation: Option<&str>,
    ) -> OnboardingResult<()> {
        let record = self.load(id).await?;
        let Some(tenant_id) = record.tenant_id else {
            debug!(onboarding_id = %id, "No tenant, skipping deployment trigger");
            return Ok(());
        };
        match record.status {
            OnboardingStatus::Provisioning
                if record.has_app_stacks() && record.stacks_complete() =>
            {
                if self
                    .advance(id, OnboardingStatus::Provisioning, OnboardingStatus::Provisioned)
                    .await?
                    .is_none()
                {
                    return Ok(());
                }
                info!(onboarding_id = %id, %tenant_id, "Onboarding provisioned");
            }
            OnboardingStatus::Provisioned => {
                debug!(onboarding_id = %id, "Already provisioned, repeating notifications");
            }
            status => {
                debug!(onboarding_id = %id, %status, "Not ready for deployment, skipping");
                return Ok(());
            }
        }

        let app_config = self.clients.settings.app_config().await?;
        for (service_name, service) in &app_config.services {
            let Some(repository) = service.repository() else {
                warn!(
                    onboarding_id = %id,
                    service = %service_name,
                    "Service has no repository, nothing to deploy"
                );
                continue;
            };
            let notice = WorkloadReadyNotice {
                tenant_id,
                repository_name: repository.to_string(),
                image_tag: service.image_tag().to_string(),
            };
            self.notify(WORKLOAD_READY, &notice, correlation).await?;
            info!(
                onboarding_id = %id,
                service = %service_name,
                repository,
                "Workload ready for deployment"
            );
        }

        self.notify_status(tenant_id, OnboardingStatus::Provisioned, correlation)
            .await
    }

    /// Track a pipeline run against its tenant's onboarding.
    ///
    /// A failed or cancelled run is reported but does not fail the
    /// onboarding: the first run of a new pipeline has no source artifact yet.
    pub async fn handle_pipeline_changed(
        &self,
        detail: PipelineDetail,
        correlation: Option<&str>,
    ) -> OnboardingResult<()> {
        let Some(record) = self.pipeline_onboarding(&detail).await? else {
            warn!(pipeline = %detail.pipeline, "No onboarding for pipeline, dropping");
            return Ok(());
        };
        let Some(tenant_id) = record.tenant_id else {
            return Ok(());
        };

        match detail.state {
            PipelineState::Started => {
                let advanced = self
                    .advance(record.id, OnboardingStatus::Provisioned, OnboardingStatus::Deploying)
                    .await?;
                if advanced.is_some() {
                    info!(
                        onboarding_id = %record.id,
                        pipeline = %detail.pipeline,
                        "Deployment started"
                    );
                    self.notify_status(tenant_id, OnboardingStatus::Deploying, correlation)
                        .await?;
                }
            }
            PipelineState::Failed | PipelineState::Canceled => {
                warn!(
                    onboarding_id = %record.id,
                    pipeline = %detail.pipeline,
                    state = ?detail.state,
                    "Pipeline run did not succeed"
                );
                self.notify_status(tenant_id, OnboardingStatus::Failed, correlation)
                    .await?;
            }
            PipelineState::Succeeded => {
                info!(
                    onboarding_id = %record.id,
                    pipeline = %detail.pipeline,
                    "Pipeline run succeeded"
                );
                self.notify_status(tenant_id, OnboardingStatus::Succeeded, correlation)
                    .await?;
            }
            PipelineState::Other => {
                debug!(pipeline = %detail.pipeline, "Ignoring pipeline state");
            }
        }
        Ok(())
    }

    pub async fn handle_deployed(&self, id: Uuid) -> OnboardingResult<()> {
        if self
            .advance(id, OnboardingStatus::Deploying, OnboardingStatus::Succeeded)
            .await?
            .is_some()
        {
            info!(onboarding_id = %id, "Onboarding succeeded");
        }
        Ok(())
    }

    /// Explicit tenant id first; otherwise the short tenant id embedded in
    /// the pipeline name.
    async fn pipeline_onboarding(
        &self,
        detail: &PipelineDetail,
    ) -> OnboardingResult<Option<Onboarding>> {
        if let Some(tenant_id) = detail.tenant_id {
            return Ok(self.store.get_by_tenant(tenant_id).await?);
        }
        let head = self.config.tenant_name_head();
        let Some(prefix) = pipeline_tenant_prefix(&head, &detail.pipeline) else {
            return Ok(None);
        };
        Ok(self.store.find_by_tenant_prefix(prefix).await?)
    }
}

/// `{head}{short-id}-{service}` -> `short-id`. Without the trailing
/// delimiter the whole remainder is taken.
fn pipeline_tenant_prefix<'a>(head: &str, pipeline: &'a str) -> Option<&'a str> {
    let rest = pipeline.strip_prefix(head)?;
    let prefix = rest.split('-').next().unwrap_or(rest);
    (!prefix.is_empty()).then_some(prefix)
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::events::{StatusChangedNotice, STATUS_CHANGED};

    fn pipeline(name: String, state: PipelineState, tenant_id: Option<Uuid>) -> PipelineDetail {
        PipelineDetail {
            pipeline: name,
            state,
            tenant_id,
        }
    }

    #[test]
    fn test_pipeline_tenant_prefix() {
        let head = "onb-test-tenant-";
        assert_eq!(pipeline_tenant_prefix(head, "onb-test-tenant-abcd1234-web"), Some("abcd1234"));
        assert_eq!(pipeline_tenant_prefix(head, "onb-test-tenant-abcd1234"), Some("abcd1234"));
        assert_eq!(pipeline_tenant_prefix(head, "other-pipeline"), None);
        assert_eq!(pipeline_tenant_prefix(head, "onb-test-tenant-"), None);
    }

    #[tokio::test]
    async fn test_provisioned_publishes_per_service() {
        let harness = Harness::new().await;
        let tenant_id = Uuid::new_v4();
        let record = harness
            .seed_record(OnboardingStatus::Provisioned, Some(tenant_id))
            .await;

        harness.service.handle_provisioned(record.id, None).await.unwrap();

        let ready = harness.events.of_type(WORKLOAD_READY).await;
        assert_eq!(ready.len(), 1);
        let notice: WorkloadReadyNotice = ready[0].payload_as().unwrap();
        assert_eq!(notice.tenant_id, tenant_id);
        assert_eq!(notice.repository_name, "web");
        assert_eq!(notice.image_tag, "latest");
    }

    #[tokio::test]
    async fn test_complete_stack_set_moves_to_provisioned() {
        let harness = Harness::new().await;
        let tenant_id = Uuid::new_v4();
        let record = harness
            .seed_record(OnboardingStatus::Provisioning, Some(tenant_id))
            .await;
        harness
            .service
            .modify(record.id, |r| {
                for (stack_id, base) in [("base", true), ("web", false)] {
                    let mut stack = OnboardingStack::new(stack_id, stack_id, base);
                    stack.status = "CREATE_COMPLETE".into();
                    r.stacks.push(stack);
                }
                Ok(Some(()))
            })
            .await
            .unwrap();

        harness.service.handle_provisioned(record.id, None).await.unwrap();

        assert_eq!(harness.record(record.id).await.status, OnboardingStatus::Provisioned);
        assert_eq!(harness.published(WORKLOAD_READY).await, 1);
        let notices = harness.events.of_type(STATUS_CHANGED).await;
        let notice: StatusChangedNotice = notices[0].payload_as().unwrap();
        assert_eq!(notice.onboarding_status, "provisioned");
    }

    #[tokio::test]
    async fn test_incomplete_stack_set_is_not_provisioned() {
        let harness = Harness::new().await;
        let record = harness
            .seed_record(OnboardingStatus::Provisioning, Some(Uuid::new_v4()))
            .await;

        harness.service.handle_provisioned(record.id, None).await.unwrap();

        assert_eq!(harness.record(record.id).await.status, OnboardingStatus::Provisioning);
        assert!(harness.events.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_started_by_name() {
        let harness = Harness::new().await;
        let tenant_id = Uuid::new_v4();
        let record = harness
            .seed_record(OnboardingStatus::Provisioned, Some(tenant_id))
            .await;
        let name = format!("onb-test-tenant-{}-web", &tenant_id.to_string()[..8]);

        harness
            .service
            .handle_pipeline_changed(pipeline(name, PipelineState::Started, None), None)
            .await
            .unwrap();

        assert_eq!(harness.record(record.id).await.status, OnboardingStatus::Deploying);
    }

    #[tokio::test]
    async fn test_pipeline_failure_is_informational() {
        let harness = Harness::new().await;
        let tenant_id = Uuid::new_v4();
        let record = harness
            .seed_record(OnboardingStatus::Deploying, Some(tenant_id))
            .await;

        harness
            .service
            .handle_pipeline_changed(
                pipeline("any".into(), PipelineState::Failed, Some(tenant_id)),
                None,
            )
            .await
            .unwrap();

        assert_eq!(harness.record(record.id).await.status, OnboardingStatus::Deploying);
        let notices = harness.events.of_type(STATUS_CHANGED).await;
        let notice: StatusChangedNotice = notices[0].payload_as().unwrap();
        assert_eq!(notice.onboarding_status, "failed");
        assert_eq!(harness.published("Onboarding Failed").await, 0);
    }

    #[tokio::test]
    async fn test_deployed_succeeds_once() {
        let harness = Harness::new().await;
        let record = harness
            .seed_record(OnboardingStatus::Deploying, Some(Uuid::new_v4()))
            .await;

        harness.service.handle_deployed(record.id).await.unwrap();
        harness.service.handle_deployed(record.id).await.unwrap();

        assert_eq!(harness.record(record.id).await.status, OnboardingStatus::Succeeded);
    }
}
