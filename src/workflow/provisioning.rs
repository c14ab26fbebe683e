//! App stack phase and provisioned-tenant updates.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use onboarding_types::api::{UpdateProvisionedTenantRequest, UpdateProvisionedTenantResponse};
use onboarding_types::{OnboardingStack, OnboardingStatus};

use super::parameters::{
    app_parameters, app_stack_name, discovery_manifest, path_priorities, random_suffix,
    service_resource_name, update_parameters, TenantResources,
};
use super::{set_status, OnboardingService};
use crate::clients::{CreateStackRequest, UpdateOutcome, UpdateStackRequest, STACK_CAPABILITIES};
use crate::error::{OnboardingError, OnboardingResult};

impl OnboardingService {
    /// Request one app stack per configured service.
    ///
    /// Services are processed in config order. The first failure marks the
    /// onboarding failed and stops; stacks already requested stay.
    pub async fn handle_base_provisioned(&self, id: Uuid) -> OnboardingResult<()> {
        let record = self.load(id).await?;
        if record.status != OnboardingStatus::Provisioning || record.has_app_stacks() {
            debug!(
                onboarding_id = %id,
                status = %record.status,
                "App stacks already requested, skipping"
            );
            return Ok(());
        }
        let (Some(tenant_id), Some(short_id)) = (record.tenant_id, record.tenant_short_id()) else {
            return self.fail_onboarding(id, "Onboarding has no tenant", None).await;
        };

        let Some(tenant) = self.clients.tenants.get_tenant(tenant_id).await? else {
            return self
                .fail_onboarding(id, format!("Tenant {tenant_id} not found"), None)
                .await;
        };
        let app_config = self.clients.settings.app_config().await?;

        let resources = match TenantResources::from_tenant(&tenant) {
            Ok(resources) => resources,
            Err(e) => return self.fail_onboarding(id, e.to_string(), None).await,
        };
        let priorities = path_priorities(&app_config.services);

        for (service_name, service) in &app_config.services {
            let priority = priorities.get(service_name).copied().unwrap_or(0);
            let assembled = app_parameters(
                &self.config,
                &tenant,
                service_name,
                service,
                &resources,
                priority,
            );
            let parameters = match assembled {
                Ok(parameters) => parameters,
                Err(e) => return self.fail_onboarding(id, e.to_string(), None).await,
            };

            let stack_name = app_stack_name(
                &self.config,
                &short_id,
                &service_resource_name(service_name),
                &random_suffix(),
            );
            let request = CreateStackRequest {
                stack_name: stack_name.clone(),
                template_url: self.config.app_template_url(),
                parameters,
                notification_target: self.config.app_stack_topic.clone(),
                capabilities: STACK_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            };

            let stack_id = match self.clients.provisioning.create_stack(&request).await {
                Ok(stack_id) => stack_id,
                Err(e) => {
                    return self
                        .fail_onboarding(
                            id,
                            format!("App stack request for service {service_name} failed: {e}"),
                            None,
                        )
                        .await
                }
            };
            info!(onboarding_id = %id, service = %service_name, %stack_id, "App stack requested");

            let appended = self
                .modify(id, |record| {
                    if record.status != OnboardingStatus::Provisioning {
                        return Ok(None);
                    }
                    record
                        .stacks
                        .push(OnboardingStack::new(stack_name.clone(), stack_id.clone(), false));
                    Ok(Some(()))
                })
                .await?;
            if appended.is_none() {
                warn!(
                    onboarding_id = %id,
                    %stack_id,
                    "Record left provisioning, stopping app stack requests"
                );
                return Ok(());
            }
        }

        if let Some(manifest) = discovery_manifest(&app_config) {
            let key = format!("tenants/{tenant_id}/ServiceDiscovery.env");
            if let Err(e) = self
                .clients
                .storage
                .put_object(&key, manifest.into_bytes())
                .await
            {
                error!(
                    onboarding_id = %id,
                    error = %e,
                    "Service discovery manifest write failed"
                );
                return self
                    .fail_onboarding(
                        id,
                        format!("Service discovery manifest write failed: {e}"),
                        None,
                    )
                    .await;
            }
            debug!(onboarding_id = %id, %key, "Service discovery manifest written");
        }

        Ok(())
    }

    /// Push sizing, billing or subdomain changes to a provisioned tenant's
    /// base stack. Unset fields keep their previous values.
    pub async fn update_provisioned_tenant(
        &self,
        tenant_id: Uuid,
        request: UpdateProvisionedTenantRequest,
    ) -> OnboardingResult<UpdateProvisionedTenantResponse> {
        let record = self
            .store
            .get_by_tenant(tenant_id)
            .await?
            .ok_or(OnboardingError::NotFound(tenant_id))?;
        if !record.status.can_transition_to(OnboardingStatus::Updating) {
            return Err(OnboardingError::InvalidTransition {
                from: record.status,
                to: OnboardingStatus::Updating,
            });
        }
        let base_stack = record
            .stacks
            .iter()
            .find(|s| s.base_stack)
            .ok_or_else(|| OnboardingError::invalid_request("Tenant has no base stack"))?;

        let subdomain = match request.subdomain.clone() {
            Some(subdomain) => subdomain,
            None => self
                .clients
                .tenants
                .get_tenant(tenant_id)
                .await?
                .map(|tenant| tenant.subdomain().to_string())
                .unwrap_or_default(),
        };

        let update = UpdateStackRequest {
            stack_id: base_stack.stack_id.clone(),
            use_previous_template: true,
            parameters: update_parameters(&request, &subdomain),
            capabilities: STACK_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        };

        match self.clients.provisioning.update_stack(&update).await {
            Ok(UpdateOutcome::Updating { stack_id }) => {
                self.modify(record.id, |record| {
                    if !record.status.can_transition_to(OnboardingStatus::Updating) {
                        return Ok(None);
                    }
                    set_status(record, OnboardingStatus::Updating)?;
                    Ok(Some(()))
                })
                .await?;
                info!(onboarding_id = %record.id, %tenant_id, %stack_id, "Tenant update started");
                Ok(UpdateProvisionedTenantResponse { stack_id })
            }
            Ok(UpdateOutcome::NoChanges) => {
                warn!(onboarding_id = %record.id, %tenant_id, "No updates are to be performed");
                Ok(UpdateProvisionedTenantResponse {
                    stack_id: update.stack_id,
                })
            }
            Err(e) => {
                self.fail_onboarding(record.id, format!("Tenant update failed: {e}"), None)
                    .await?;
                Err(e.into())
            }
        }
    }
}
