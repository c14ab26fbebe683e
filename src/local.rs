//! In-process wiring.
//!
//! Builds an [`OnboardingService`] on the memory store, queue and
//! collaborators while keeping typed handles to each of them, so local runs
//! can seed state and tests can inspect it.

use std::collections::BTreeMap;
use std::sync::Arc;

use url::Url;

use onboarding_types::{AppConfig, ServiceConfig, TierConfig, DEFAULT_TIER};

use crate::clients::{
    MemoryContainerRegistry, MemoryDnsRegistry, MemoryNetworkAllocator, MemoryObjectStorage,
    MemoryProvisioningEngine, MemorySettingsService, MemoryTenantDirectory, UrlSigner,
};
use crate::config::OnboardingConfig;
use crate::error::ClientError;
use crate::events::EventPublisher;
use crate::queue::MemoryQueue;
use crate::store::MemoryStore;
use crate::workflow::{Collaborators, OnboardingService};

const LOCAL_OBJECT_BASE: &str = "http://objects.local/";

pub struct LocalEnvironment {
    pub config: Arc<OnboardingConfig>,
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryQueue>,
    pub tenants: Arc<MemoryTenantDirectory>,
    pub settings: Arc<MemorySettingsService>,
    pub network: Arc<MemoryNetworkAllocator>,
    pub registry: Arc<MemoryContainerRegistry>,
    pub dns: Arc<MemoryDnsRegistry>,
    pub provisioning: Arc<MemoryProvisioningEngine>,
    pub storage: Arc<MemoryObjectStorage>,
}

impl LocalEnvironment {
    pub fn new(config: OnboardingConfig, app_config: AppConfig) -> Result<Self, ClientError> {
        let signer = UrlSigner::new(config.object_store_secret.clone());
        let queue = MemoryQueue::with_retry_delay(config.queue.retry_delay);
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(MemoryStore::new()),
            queue: Arc::new(queue),
            tenants: Arc::new(MemoryTenantDirectory::with_standard_inventory()),
            settings: Arc::new(MemorySettingsService::new(app_config)),
            network: Arc::new(MemoryNetworkAllocator::with_blocks(u8::MAX)),
            registry: Arc::new(MemoryContainerRegistry::new()),
            dns: Arc::new(MemoryDnsRegistry::new()),
            provisioning: Arc::new(MemoryProvisioningEngine::new()),
            storage: Arc::new(MemoryObjectStorage::new(Url::parse(LOCAL_OBJECT_BASE)?, signer)),
        })
    }

    /// Like [`LocalEnvironment::new`], with every configured image already
    /// pushed so validation passes.
    pub async fn seeded(
        config: OnboardingConfig,
        app_config: AppConfig,
    ) -> Result<Self, ClientError> {
        let environment = Self::new(config, app_config.clone())?;
        for service in app_config.services.values() {
            if let Some(repository) = service.repository() {
                environment
                    .registry
                    .push_image(repository, service.image_tag())
                    .await;
            }
        }
        Ok(environment)
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            tenants: self.tenants.clone(),
            settings: self.settings.clone(),
            network: self.network.clone(),
            registry: self.registry.clone(),
            dns: self.dns.clone(),
            provisioning: self.provisioning.clone(),
            storage: self.storage.clone(),
        }
    }

    pub fn service(&self, publisher: Arc<dyn EventPublisher>) -> OnboardingService {
        OnboardingService::new(
            self.config.clone(),
            self.store.clone(),
            self.queue.clone(),
            publisher,
            self.collaborators(),
        )
    }
}

/// One public `web` service on the default tier.
pub fn sample_app_config() -> AppConfig {
    let tier = TierConfig {
        min: 1,
        max: 2,
        cpu: 512,
        memory: 1024,
        instance_type: Some("t3.medium".to_string()),
        ..TierConfig::default()
    };
    let web = ServiceConfig {
        public: true,
        path: Some("/*".to_string()),
        container_port: 8080,
        container_repo: Some("web".to_string()),
        container_tag: None,
        health_check_url: Some("/health".to_string()),
        operating_system: Some("LINUX".to_string()),
        tiers: BTreeMap::from([(DEFAULT_TIER.to_string(), tier)]),
    };

    AppConfig {
        name: "sample".to_string(),
        domain_name: None,
        hosted_zone: None,
        ssl_certificate: None,
        services: BTreeMap::from([("web".to_string(), web)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ContainerRegistry;

    #[tokio::test]
    async fn test_seeded_registry_has_configured_images() {
        let environment = LocalEnvironment::seeded(
            OnboardingConfig::for_environment("test"),
            sample_app_config(),
        )
        .await
        .unwrap();
        assert!(environment.registry.image_exists("web", "latest").await.unwrap());
    }
}
