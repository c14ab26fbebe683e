//! Shared fixtures for workflow unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use onboarding_types::{Onboarding, OnboardingRequest, OnboardingStatus};

use super::OnboardingService;
use crate::config::OnboardingConfig;
use crate::error::ClientError;
use crate::events::{EventEnvelope, EventPublisher, RecordingPublisher};
use crate::local::{sample_app_config, LocalEnvironment};
use crate::store::OnboardingStore;

pub(crate) struct Harness {
    pub env: LocalEnvironment,
    pub events: Arc<RecordingPublisher>,
    pub service: Arc<OnboardingService>,
}

impl Harness {
    /// Memory wiring with the sample app config and its images pushed.
    /// Released queue messages are visible again at once.
    pub async fn new() -> Self {
        let mut config = OnboardingConfig::for_environment("test");
        config.queue.retry_delay = Duration::ZERO;
        let env = LocalEnvironment::seeded(config, sample_app_config())
            .await
            .unwrap();
        let events = Arc::new(RecordingPublisher::new());
        let service = Arc::new(env.service(events.clone()));
        Self {
            env,
            events,
            service,
        }
    }

    /// Like [`Harness::new`], but the first publish of `detail_type` fails.
    pub async fn failing_once(detail_type: &str) -> Self {
        let mut harness = Self::new().await;
        let publisher = FailOncePublisher {
            inner: harness.events.clone(),
            detail_type: Mutex::new(Some(detail_type.to_string())),
        };
        harness.service = Arc::new(harness.env.service(Arc::new(publisher)));
        harness
    }

    pub fn request(name: &str) -> OnboardingRequest {
        OnboardingRequest {
            name: name.to_string(),
            subdomain: None,
            tier: None,
            billing_plan: None,
        }
    }

    /// Insert a record already at `status`.
    pub async fn seed(&self, status: OnboardingStatus) -> Onboarding {
        self.seed_record(status, None).await
    }

    pub async fn seed_record(
        &self,
        status: OnboardingStatus,
        tenant_id: Option<Uuid>,
    ) -> Onboarding {
        let mut record = Onboarding::new(Self::request("Acme"));
        record.status = status;
        record.tenant_id = tenant_id;
        self.env.store.insert(&record).await.unwrap()
    }

    pub async fn record(&self, id: Uuid) -> Onboarding {
        self.env.store.get(id).await.unwrap().unwrap()
    }

    pub async fn published(&self, detail_type: &str) -> usize {
        self.events.of_type(detail_type).await.len()
    }
}

/// Records like [`RecordingPublisher`] after rejecting one event type once.
struct FailOncePublisher {
    inner: Arc<RecordingPublisher>,
    detail_type: Mutex<Option<String>>,
}

#[async_trait]
impl EventPublisher for FailOncePublisher {
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), ClientError> {
        let mut pending = self.detail_type.lock().await;
        if pending.as_deref() == Some(envelope.detail_type.as_str()) {
            *pending = None;
            return Err(ClientError::unavailable("event bus", "throttled"));
        }
        drop(pending);
        self.inner.publish(envelope).await
    }
}
