//! Tenant assignment and base stack phase.

use tracing::{debug, info, warn};
use uuid::Uuid;

use onboarding_types::{OnboardingStack, OnboardingStatus};

use super::parameters::{base_parameters, base_stack_name, cidr_prefix};
use super::{set_status, OnboardingService};
use crate::clients::{CreateStackRequest, STACK_CAPABILITIES};
use crate::error::{OnboardingResult, ParameterError};
use crate::events::{OnboardingEvent, TenantAssignedDetail};

impl OnboardingService {
    /// Create the tenant, record its id once and reserve an address block.
    ///
    /// A record that already carries a tenant id but no base stack is a
    /// redelivery after a failed publish: the recorded tenant is reused and
    /// TenantAssigned is published again.
    pub async fn handle_validated(
        &self,
        id: Uuid,
        correlation: Option<&str>,
    ) -> OnboardingResult<()> {
        let record = self.load(id).await?;
        if record.status != OnboardingStatus::Validated || record.has_base_stack() {
            debug!(
                onboarding_id = %id,
                status = %record.status,
                tenant_id = ?record.tenant_id,
                "Tenant phase already done or not validated, skipping"
            );
            return Ok(());
        }

        let tenant = match record.tenant_id {
            Some(tenant_id) => {
                let Some(tenant) = self.clients.tenants.get_tenant(tenant_id).await? else {
                    return self
                        .fail_onboarding(id, format!("Tenant {tenant_id} not found"), correlation)
                        .await;
                };
                debug!(onboarding_id = %id, %tenant_id, "Resuming tenant assignment");
                tenant
            }
            None => {
                let Some(request) = record.request else {
                    return self
                        .fail_onboarding(id, "Onboarding has no request data", correlation)
                        .await;
                };
                let Some(tenant) = self.clients.tenants.create_tenant(&request).await? else {
                    return self
                        .fail_onboarding(id, "Tenant insert API call failed", correlation)
                        .await;
                };
                let assigned = self
                    .modify(id, |record| {
                        if record.tenant_id.is_some() {
                            return Ok(None);
                        }
                        record.tenant_id = Some(tenant.id);
                        Ok(Some(()))
                    })
                    .await?;
                if assigned.is_none() {
                    warn!(
                        onboarding_id = %id,
                        tenant_id = %tenant.id,
                        "Tenant id already set by a concurrent handler"
                    );
                    return Ok(());
                }
                info!(onboarding_id = %id, tenant_id = %tenant.id, "Tenant assigned");
                tenant
            }
        };

        if let Err(e) = self.clients.network.assign_block(tenant.id).await {
            return self
                .fail_onboarding(id, format!("CIDR block assignment failed: {e}"), correlation)
                .await;
        }

        let detail = TenantAssignedDetail {
            onboarding_id: id,
            tenant,
        };
        self.publish(OnboardingEvent::TenantAssigned, &detail, correlation)
            .await
    }

    /// Request the tenant's base stack and move to `provisioning`.
    pub async fn handle_tenant_assigned(
        &self,
        detail: TenantAssignedDetail,
        correlation: Option<&str>,
    ) -> OnboardingResult<()> {
        let id = detail.onboarding_id;
        let tenant = detail.tenant;
        let record = self.load(id).await?;

        if record.status != OnboardingStatus::Validated || record.has_base_stack() {
            debug!(
                onboarding_id = %id,
                status = %record.status,
                "Base stack already requested, skipping"
            );
            return Ok(());
        }
        if record.tenant_id != Some(tenant.id) {
            warn!(
                onboarding_id = %id,
                tenant_id = %tenant.id,
                "Tenant does not match the onboarding record, skipping"
            );
            return Ok(());
        }

        let Some(block) = self.clients.network.get_block(tenant.id).await? else {
            return self
                .fail_onboarding(
                    id,
                    format!("No CIDR block assigned to tenant {}", tenant.id),
                    correlation,
                )
                .await;
        };
        let app_config = self.clients.settings.app_config().await?;

        let assembled = cidr_prefix(&block)
            .ok_or(ParameterError::Missing("CidrPrefix"))
            .and_then(|prefix| base_parameters(&self.config, &app_config, &tenant, &prefix))
            .and_then(|parameters| {
                let short_id = record
                    .tenant_short_id()
                    .ok_or(ParameterError::Missing("TenantId"))?;
                Ok((base_stack_name(&self.config, &short_id), parameters))
            });
        let (stack_name, parameters) = match assembled {
            Ok(assembled) => assembled,
            Err(e) => return self.fail_onboarding(id, e.to_string(), correlation).await,
        };

        let request = CreateStackRequest {
            stack_name: stack_name.clone(),
            template_url: self.config.base_template_url(),
            parameters,
            notification_target: self.config.stack_topic.clone(),
            capabilities: STACK_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        };
        let stack_id = match self.clients.provisioning.create_stack(&request).await {
            Ok(stack_id) => stack_id,
            Err(e) => {
                return self
                    .fail_onboarding(id, format!("Base stack request failed: {e}"), correlation)
                    .await
            }
        };
        info!(
            onboarding_id = %id,
            tenant_id = %tenant.id,
            %stack_id,
            "Base stack requested"
        );

        let stored = self
            .modify(id, |record| {
                if record.status != OnboardingStatus::Validated {
                    return Ok(None);
                }
                record
                    .stacks
                    .push(OnboardingStack::new(stack_name.clone(), stack_id.clone(), true));
                set_status(record, OnboardingStatus::Provisioning)?;
                Ok(Some(()))
            })
            .await?;
        if stored.is_none() {
            warn!(
                onboarding_id = %id,
                %stack_id,
                "Record left validated before the base stack was recorded"
            );
            return Ok(());
        }

        self.notify_status(tenant.id, OnboardingStatus::Provisioning, correlation)
            .await
    }
}
