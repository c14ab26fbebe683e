//! Platform stack updates.
//!
//! The platform stack is shared by every tenant. Both updates reuse its
//! current template and keep every parameter they do not name.

use tracing::{info, warn};

use onboarding_types::PlatformStackResponse;

use super::OnboardingService;
use crate::clients::{StackParameter, UpdateOutcome, UpdateStackRequest, STACK_CAPABILITIES};
use crate::error::{OnboardingError, OnboardingResult};

const DOMAIN_NAME: &str = "DomainName";
const APPLICATION_SERVICES: &str = "ApplicationServices";

/// Platform stack parameters left untouched by both updates.
const KEPT_PARAMETERS: &[&str] = &[
    "ArtifactBucket",
    "SourceFolder",
    "Environment",
    "AdminEmailAddress",
    "SslCertificate",
    "PublicApiStage",
    "PrivateApiStage",
    "Version",
];

impl OnboardingService {
    /// Push the configured domain name to the platform stack.
    pub async fn reset_domain_name(&self) -> OnboardingResult<PlatformStackResponse> {
        let platform = self.clients.settings.platform_settings().await?;
        let domain_name = platform
            .domain_name
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| OnboardingError::invalid_request("No domain name configured"))?;

        let parameters = platform_parameters(
            StackParameter::value(DOMAIN_NAME, domain_name),
            &[APPLICATION_SERVICES],
        );
        self.update_platform(platform.stack_name, parameters).await
    }

    /// Push the current service names to the platform stack.
    pub async fn update_app_config(&self) -> OnboardingResult<PlatformStackResponse> {
        let platform = self.clients.settings.platform_settings().await?;
        let app_config = self.clients.settings.app_config().await?;
        let services = app_config
            .services
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let parameters = platform_parameters(
            StackParameter::value(APPLICATION_SERVICES, services),
            &[DOMAIN_NAME],
        );
        self.update_platform(platform.stack_name, parameters).await
    }

    async fn update_platform(
        &self,
        stack_name: String,
        parameters: Vec<StackParameter>,
    ) -> OnboardingResult<PlatformStackResponse> {
        let update = UpdateStackRequest {
            stack_id: stack_name,
            use_previous_template: true,
            parameters,
            capabilities: STACK_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        };
        match self.clients.provisioning.update_stack(&update).await? {
            UpdateOutcome::Updating { stack_id } => {
                info!(%stack_id, "Platform stack update started");
                Ok(PlatformStackResponse {
                    stack_id: Some(stack_id),
                })
            }
            UpdateOutcome::NoChanges => {
                warn!(stack = %update.stack_id, "No updates are to be performed");
                Ok(PlatformStackResponse { stack_id: None })
            }
        }
    }
}

/// `changed` first, then every other known parameter kept as it is.
fn platform_parameters(changed: StackParameter, also_kept: &[&str]) -> Vec<StackParameter> {
    std::iter::once(changed)
        .chain(
            KEPT_PARAMETERS
                .iter()
                .chain(also_kept)
                .map(|key| StackParameter::use_previous(*key)),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::clients::PlatformSettings;
    use crate::local::sample_app_config;

    #[tokio::test]
    async fn test_reset_domain_name() {
        let harness = Harness::new().await;
        harness
            .env
            .settings
            .set_platform(PlatformSettings {
                stack_name: "platform".into(),
                domain_name: Some("saas.example.com".into()),
            })
            .await;

        let response = harness.service.reset_domain_name().await.unwrap();

        assert_eq!(response.stack_id.as_deref(), Some("platform"));
        let updates = harness.env.provisioning.updates().await;
        assert_eq!(updates.len(), 1);
        assert!(updates[0].use_previous_template);
        let params = &updates[0].parameters;
        assert_eq!(params[0].key, DOMAIN_NAME);
        assert_eq!(params[0].literal(), Some("saas.example.com"));
        assert!(params[1..].iter().all(|p| p.literal().is_none()));
        assert!(params.iter().any(|p| p.key == APPLICATION_SERVICES));
    }

    #[tokio::test]
    async fn test_reset_without_domain_is_rejected() {
        let harness = Harness::new().await;

        let err = harness.service.reset_domain_name().await.unwrap_err();

        assert!(matches!(err, OnboardingError::InvalidRequest(_)));
        assert!(harness.env.provisioning.updates().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_app_config_joins_service_names() {
        let harness = Harness::new().await;
        let mut app_config = sample_app_config();
        let api = app_config.services["web"].clone();
        app_config.services.insert("api".into(), api);
        harness.env.settings.set_app_config(app_config).await;

        harness.service.update_app_config().await.unwrap();

        let updates = harness.env.provisioning.updates().await;
        assert_eq!(updates[0].stack_id, "onboarding-platform");
        let params = &updates[0].parameters;
        assert_eq!(params[0].key, APPLICATION_SERVICES);
        assert_eq!(params[0].literal(), Some("api,web"));
        assert!(params
            .iter()
            .any(|p| p.key == DOMAIN_NAME && p.literal().is_none()));
    }

    #[tokio::test]
    async fn test_no_changes_is_tolerated() {
        let harness = Harness::new().await;
        harness.env.provisioning.set_no_changes().await;

        let response = harness.service.update_app_config().await.unwrap();

        assert_eq!(response.stack_id, None);
    }

    #[tokio::test]
    async fn test_engine_error_propagates() {
        let harness = Harness::new().await;
        harness.env.provisioning.set_update_error("template invalid").await;

        assert!(harness.service.update_app_config().await.is_err());
    }
}
