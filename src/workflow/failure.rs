//! Failure sink.

use tracing::{error, info};
use uuid::Uuid;

use onboarding_types::OnboardingStatus;

use super::{set_status, OnboardingService};
use crate::error::OnboardingResult;
use crate::events::{FailedDetail, OnboardingEvent};

impl OnboardingService {
    /// Mark the onboarding `failed` and publish Failed.
    ///
    /// Every component routes failures through here. A record that is
    /// already terminal is left alone and nothing is published, so a replayed
    /// failure stays a single Failed event.
    pub async fn fail_onboarding(
        &self,
        id: Uuid,
        message: impl Into<String>,
        correlation: Option<&str>,
    ) -> OnboardingResult<()> {
        let message = message.into();
        error!(onboarding_id = %id, message = %message, "Failing onboarding");

        let failed = self
            .modify(id, |record| {
                if !record.status.can_transition_to(OnboardingStatus::Failed) {
                    return Ok(None);
                }
                set_status(record, OnboardingStatus::Failed)?;
                Ok(Some(()))
            })
            .await?;

        if failed.is_none() {
            info!(onboarding_id = %id, "Onboarding already terminal, not failing again");
            return Ok(());
        }

        let detail = FailedDetail {
            onboarding_id: id,
            message,
        };
        self.publish(OnboardingEvent::Failed, &detail, correlation).await
    }
}
