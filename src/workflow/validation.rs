//! Validation gate.
//!
//! The Initiated handler enqueues one validation message per onboarding. The
//! queue worker then runs an ordered, short-circuiting set of checks against
//! each message and classifies it:
//!
//! | Check                                   | Failure                 |
//! |-----------------------------------------|-------------------------|
//! | record exists with request data         | fatal                   |
//! | status is `validating`                  | fatal (record untouched)|
//!
//! A record already `validated` with no tenant yet means an earlier delivery
//! advanced it but could not publish; the message publishes Validated again.
//! After those two checks:
//!
//! | Check                                   | Failure                 |
//! |-----------------------------------------|-------------------------|
//! | every service image is published        | retry                   |
//! | a free address block exists             | fatal                   |
//! | requested subdomain is unused           | fatal                   |
//! | quota check passes                      | fatal (retry on error)  |
//!
//! Collaborator errors are always retry. Fatal outcomes that concern a live
//! onboarding mark it failed; all fatal messages of a batch are moved to the
//! dead-letter destination in one call at the end of the batch.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use onboarding_types::{AppConfig, OnboardingRequest, OnboardingStatus};

use super::OnboardingService;
use crate::events::{OnboardingDetail, OnboardingEvent};
use crate::queue::{MessageId, QueueMessage, ValidationRequest};

/// Classification of one validation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Success,
    /// Leave for redelivery; status unchanged.
    Retry(String),
    /// Dead-letter; no redelivery.
    Fatal(String),
}

/// What happened to each message of a batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<MessageId>,
    pub retry: Vec<MessageId>,
    pub dead_lettered: Vec<MessageId>,
}

impl OnboardingService {
    // ========================================================================
    // INITIATED
    // ========================================================================

    /// Enqueue validation and move `created -> validating`.
    ///
    /// The message is sent before the status write so a crash in between
    /// leaves a redeliverable event rather than a record stuck at
    /// `validating` with nothing queued. A replay on a record past `created`
    /// is a no-op.
    pub async fn handle_initiated(&self, id: Uuid) -> crate::OnboardingResult<()> {
        let record = self.load(id).await?;
        if record.status != OnboardingStatus::Created {
            debug!(onboarding_id = %id, status = %record.status, "Already initiated, skipping");
            return Ok(());
        }

        let message_id = self
            .queue
            .send(&ValidationRequest { onboarding_id: id })
            .await?;
        self.advance(id, OnboardingStatus::Created, OnboardingStatus::Validating)
            .await?;

        info!(onboarding_id = %id, message_id, "Queued for validation");
        Ok(())
    }

    // ========================================================================
    // QUEUE WORKER
    // ========================================================================

    /// Classify every message of a batch independently, then dead-letter the
    /// fatal ones in a single call.
    pub async fn validate_batch(&self, messages: Vec<QueueMessage>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut fatal = Vec::new();

        for message in messages {
            match self.validate_message(&message).await {
                ValidationOutcome::Success => report.succeeded.push(message.id),
                ValidationOutcome::Retry(reason) => {
                    warn!(
                        message_id = message.id,
                        receive_count = message.receive_count,
                        reason = %reason,
                        "Validation deferred"
                    );
                    report.retry.push(message.id);
                }
                ValidationOutcome::Fatal(reason) => {
                    error!(message_id = message.id, reason = %reason, "Validation rejected");
                    fatal.push(message);
                }
            }
        }

        if !fatal.is_empty() {
            let ids: Vec<MessageId> = fatal.iter().map(|m| m.id).collect();
            match self.queue.dead_letter(&fatal).await {
                Ok(()) => report.dead_lettered = ids,
                Err(e) => {
                    error!(error = %e, count = ids.len(), "Dead-letter write failed, releasing");
                    report.retry.extend(ids);
                }
            }
        }

        report
    }

    /// Run the gate for one message.
    pub async fn validate_message(&self, message: &QueueMessage) -> ValidationOutcome {
        let request = match message.request() {
            Ok(request) => request,
            Err(e) => return ValidationOutcome::Fatal(format!("Malformed validation message: {e}")),
        };
        let id = request.onboarding_id;

        let record = match self.store.get(id).await {
            Ok(Some(record)) => record,
            Ok(None) => return ValidationOutcome::Fatal(format!("No onboarding record for {id}")),
            Err(e) => return ValidationOutcome::Retry(e.to_string()),
        };

        let Some(onboarding_request) = record.request.as_ref() else {
            return self.reject(id, "Onboarding has no request data".to_string()).await;
        };

        if record.status == OnboardingStatus::Validated && record.tenant_id.is_none() {
            // An earlier delivery advanced the record but its publish failed.
            debug!(onboarding_id = %id, "Already validated, publishing again");
            return self.announce_validated(id).await;
        }
        if record.status != OnboardingStatus::Validating {
            // Stale or duplicate message; the record belongs to a later phase.
            return ValidationOutcome::Fatal(format!(
                "Onboarding {id} is {}, expected validating",
                record.status
            ));
        }

        match self.run_checks(onboarding_request).await {
            ValidationOutcome::Success => {}
            ValidationOutcome::Retry(reason) => return ValidationOutcome::Retry(reason),
            ValidationOutcome::Fatal(reason) => return self.reject(id, reason).await,
        }

        match self
            .advance(id, OnboardingStatus::Validating, OnboardingStatus::Validated)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                let reason = format!("Onboarding {id} moved on during validation");
                return ValidationOutcome::Fatal(reason);
            }
            Err(e) => return ValidationOutcome::Retry(e.to_string()),
        }

        self.announce_validated(id).await
    }

    /// Publish Validated. A failed publish is retried; the redelivered
    /// message finds the record `validated` and lands here again.
    async fn announce_validated(&self, id: Uuid) -> ValidationOutcome {
        if let Err(e) = self
            .publish(OnboardingEvent::Validated, &OnboardingDetail { onboarding_id: id }, None)
            .await
        {
            return ValidationOutcome::Retry(e.to_string());
        }

        info!(onboarding_id = %id, "Onboarding validated");
        ValidationOutcome::Success
    }

    /// Mark failed and classify fatal. If the mark itself fails the message
    /// is retried so the record is not left behind a dead letter.
    async fn reject(&self, id: Uuid, reason: String) -> ValidationOutcome {
        match self.fail_onboarding(id, reason.clone(), None).await {
            Ok(()) => ValidationOutcome::Fatal(reason),
            Err(e) => ValidationOutcome::Retry(format!("Could not mark {id} failed: {e}")),
        }
    }

    async fn run_checks(&self, request: &OnboardingRequest) -> ValidationOutcome {
        let app_config = match self.clients.settings.app_config().await {
            Ok(config) => config,
            Err(e) => return ValidationOutcome::Retry(e.to_string()),
        };

        let outcome = self.check_images(&app_config).await;
        if outcome != ValidationOutcome::Success {
            return outcome;
        }

        match self.clients.network.has_available_block().await {
            Ok(true) => {}
            Ok(false) => return ValidationOutcome::Fatal("No CIDR blocks available".to_string()),
            Err(e) => return ValidationOutcome::Retry(e.to_string()),
        }

        if let Some(subdomain) = request.requested_subdomain() {
            let outcome = self.check_subdomain(&app_config, subdomain).await;
            if outcome != ValidationOutcome::Success {
                return outcome;
            }
        }

        match self.clients.settings.check_quotas().await {
            Ok(quota) if quota.passed => ValidationOutcome::Success,
            Ok(quota) => ValidationOutcome::Fatal(
                quota
                    .message
                    .unwrap_or_else(|| "Quota check failed".to_string()),
            ),
            Err(e) => ValidationOutcome::Retry(e.to_string()),
        }
    }

    /// Images are pushed by the tenant's pipeline; absence means not yet.
    async fn check_images(&self, app_config: &AppConfig) -> ValidationOutcome {
        if app_config.services.is_empty() {
            return ValidationOutcome::Retry("No services configured yet".to_string());
        }

        for (name, service) in &app_config.services {
            let Some(repository) = service.repository() else {
                let reason = format!("Service {name} has no container repository");
                return ValidationOutcome::Retry(reason);
            };
            let tag = service.image_tag();
            match self.clients.registry.image_exists(repository, tag).await {
                Ok(true) => {}
                Ok(false) => {
                    return ValidationOutcome::Retry(format!(
                        "Service {name} has no image {repository}:{tag}"
                    ))
                }
                Err(e) => return ValidationOutcome::Retry(e.to_string()),
            }
        }

        ValidationOutcome::Success
    }

    async fn check_subdomain(&self, app_config: &AppConfig, subdomain: &str) -> ValidationOutcome {
        let (Some(domain), Some(zone)) = (app_config.domain(), app_config.zone()) else {
            return ValidationOutcome::Fatal(format!(
                "Subdomain {subdomain} requested but no domain or hosted zone is configured"
            ));
        };

        let records = match self.clients.dns.a_records(zone).await {
            Ok(records) => records,
            Err(e) => return ValidationOutcome::Retry(e.to_string()),
        };

        if records
            .iter()
            .any(|record| record_label(record, domain).eq_ignore_ascii_case(subdomain))
        {
            return ValidationOutcome::Fatal(format!("Subdomain {subdomain} already exists"));
        }
        ValidationOutcome::Success
    }
}

/// Leading label(s) of an A record name relative to `domain`:
/// `Acme.example.com.` under `example.com` is `acme`.
fn record_label(record: &str, domain: &str) -> String {
    let name = record.trim_end_matches('.').to_ascii_lowercase();
    let suffix = format!(".{}", domain.trim_end_matches('.').to_ascii_lowercase());
    match name.strip_suffix(&suffix) {
        Some(label) => label.to_string(),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::clients::QuotaCheck;
    use crate::queue::ValidationQueue;

    async fn validating(harness: &Harness) -> Uuid {
        harness.seed(OnboardingStatus::Validating).await.id
    }

    async fn enqueue(harness: &Harness, id: Uuid) {
        harness
            .env
            .queue
            .send(&ValidationRequest { onboarding_id: id })
            .await
            .unwrap();
    }

    async fn run_batch(harness: &Harness) -> BatchReport {
        let messages = harness.env.queue.receive(10).await.unwrap();
        harness.service.validate_batch(messages).await
    }

    #[test]
    fn test_record_label() {
        assert_eq!(record_label("Acme.Example.com.", "example.com"), "acme");
        assert_eq!(record_label("other.net.", "example.com"), "other.net");
    }

    #[tokio::test]
    async fn test_initiated_enqueues_once() {
        let harness = Harness::new().await;
        let record = harness.seed(OnboardingStatus::Created).await;

        harness.service.handle_initiated(record.id).await.unwrap();
        harness.service.handle_initiated(record.id).await.unwrap();

        assert_eq!(harness.record(record.id).await.status, OnboardingStatus::Validating);
        assert_eq!(harness.env.queue.pending().await, 1);
    }

    #[tokio::test]
    async fn test_successful_validation() {
        let harness = Harness::new().await;
        let id = validating(&harness).await;
        enqueue(&harness, id).await;

        let report = run_batch(&harness).await;
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(harness.record(id).await.status, OnboardingStatus::Validated);
        assert_eq!(harness.published("Onboarding Validated").await, 1);
    }

    #[tokio::test]
    async fn test_missing_image_is_retried() {
        let harness = Harness::new().await;
        let mut app_config = crate::local::sample_app_config();
        if let Some(web) = app_config.services.get_mut("web") {
            web.container_repo = Some("unpublished".to_string());
        }
        harness.env.settings.set_app_config(app_config).await;

        let id = validating(&harness).await;
        enqueue(&harness, id).await;

        let report = run_batch(&harness).await;
        assert_eq!(report.retry.len(), 1);
        assert!(report.dead_lettered.is_empty());
        assert_eq!(harness.record(id).await.status, OnboardingStatus::Validating);
    }

    #[tokio::test]
    async fn test_missing_record_and_quota_failure_dead_letter_together() {
        let harness = Harness::new().await;
        harness
            .env
            .settings
            .set_quota(QuotaCheck {
                passed: false,
                message: Some("Tenant quota exceeded".to_string()),
            })
            .await;

        let id = validating(&harness).await;
        enqueue(&harness, Uuid::new_v4()).await;
        enqueue(&harness, id).await;

        let report = run_batch(&harness).await;
        assert_eq!(report.dead_lettered.len(), 2);

        let dead = harness.env.queue.dead_letters().await;
        assert_eq!(dead.len(), 2);
        assert_eq!(harness.env.queue.dead_letter_calls().await, 1);
        assert_eq!(harness.record(id).await.status, OnboardingStatus::Failed);
        assert_eq!(harness.published("Onboarding Failed").await, 1);
    }

    #[tokio::test]
    async fn test_stale_message_does_not_fail_record() {
        let harness = Harness::new().await;
        let record = harness.seed(OnboardingStatus::Provisioning).await;
        enqueue(&harness, record.id).await;

        let report = run_batch(&harness).await;
        assert_eq!(report.dead_lettered.len(), 1);
        assert_eq!(harness.record(record.id).await.status, OnboardingStatus::Provisioning);
    }

    #[tokio::test]
    async fn test_failed_publish_is_redelivered_and_published() {
        let harness = Harness::failing_once("Onboarding Validated").await;
        let id = validating(&harness).await;
        enqueue(&harness, id).await;

        let first = run_batch(&harness).await;
        assert_eq!(first.retry.len(), 1);
        assert_eq!(harness.record(id).await.status, OnboardingStatus::Validated);
        assert_eq!(harness.published("Onboarding Validated").await, 0);
        harness.env.queue.release(&first.retry).await.unwrap();

        let second = run_batch(&harness).await;
        assert_eq!(second.succeeded.len(), 1);
        assert!(harness.env.queue.dead_letters().await.is_empty());
        assert_eq!(harness.record(id).await.status, OnboardingStatus::Validated);
        assert_eq!(harness.published("Onboarding Validated").await, 1);
    }

    #[tokio::test]
    async fn test_missing_request_data_fails_before_status_check() {
        let harness = Harness::new().await;
        let mut record = onboarding_types::Onboarding::new(Harness::request("Acme"));
        record.request = None;
        record.status = OnboardingStatus::Validated;
        let record = crate::store::OnboardingStore::insert(&*harness.env.store, &record)
            .await
            .unwrap();
        enqueue(&harness, record.id).await;

        let report = run_batch(&harness).await;
        assert_eq!(report.dead_lettered.len(), 1);
        assert_eq!(harness.record(record.id).await.status, OnboardingStatus::Failed);
        assert_eq!(harness.published("Onboarding Validated").await, 0);
    }

    #[tokio::test]
    async fn test_no_free_block_is_fatal() {
        let harness = Harness::new().await;
        let id = validating(&harness).await;
        let message = QueueMessage {
            id: 1,
            body: serde_json::to_string(&ValidationRequest { onboarding_id: id }).unwrap(),
            receive_count: 1,
        };

        let empty = crate::clients::MemoryNetworkAllocator::with_blocks(0);
        let mut clients = harness.env.collaborators();
        clients.network = std::sync::Arc::new(empty);
        let service = super::super::OnboardingService::new(
            harness.env.config.clone(),
            harness.env.store.clone(),
            harness.env.queue.clone(),
            harness.events.clone(),
            clients,
        );

        assert!(matches!(
            service.validate_message(&message).await,
            ValidationOutcome::Fatal(_)
        ));
        assert_eq!(harness.record(id).await.status, OnboardingStatus::Failed);
    }

    #[tokio::test]
    async fn test_duplicate_subdomain_is_fatal() {
        let harness = Harness::new().await;
        let mut app_config = crate::local::sample_app_config();
        app_config.domain_name = Some("example.com".to_string());
        app_config.hosted_zone = Some("Z123".to_string());
        harness.env.settings.set_app_config(app_config).await;
        harness.env.dns.add_a_record("Z123", "Acme.example.com.").await;

        let mut record = onboarding_types::Onboarding::new(OnboardingRequest {
            name: "Acme".into(),
            subdomain: Some("acme".into()),
            tier: None,
            billing_plan: None,
        });
        record.status = OnboardingStatus::Validating;
        let record = crate::store::OnboardingStore::insert(&*harness.env.store, &record)
            .await
            .unwrap();
        enqueue(&harness, record.id).await;

        let report = run_batch(&harness).await;
        assert_eq!(report.dead_lettered.len(), 1);
        assert_eq!(harness.record(record.id).await.status, OnboardingStatus::Failed);
    }

    #[tokio::test]
    async fn test_quota_outage_is_retried() {
        let harness = Harness::new().await;
        harness.env.settings.set_quota_outage(Some("timeout")).await;
        let id = validating(&harness).await;
        enqueue(&harness, id).await;

        let report = run_batch(&harness).await;
        assert_eq!(report.retry.len(), 1);
        assert_eq!(harness.record(id).await.status, OnboardingStatus::Validating);
    }

    #[tokio::test]
    async fn test_malformed_body_is_dead_lettered() {
        let harness = Harness::new().await;
        harness.env.queue.send_raw("{not json").await;

        let report = run_batch(&harness).await;
        assert_eq!(report.dead_lettered.len(), 1);
        assert!(harness.events.published().await.is_empty());
    }
}
