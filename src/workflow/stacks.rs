//! Stack status notifications.
//!
//! The stack list is append-only; each notification rewrites one stack's
//! status text and the onboarding status is recomputed from the whole set.
//! A complete set in `provisioning` is announced with Provisioned; the
//! Provisioned handler records the status.

use tracing::{debug, info, warn};

use onboarding_types::{Onboarding, OnboardingStack, OnboardingStatus};

use super::{set_status, OnboardingService};
use crate::error::OnboardingResult;
use crate::events::{OnboardingDetail, OnboardingEvent, StackStatusDetail};

/// Combined state of an onboarding's stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackAggregate {
    /// No stacks yet, or at least one still moving.
    InProgress,
    Complete,
    /// At least one stack failed or rolled back.
    Failed,
}

pub fn aggregate_status(stacks: &[OnboardingStack]) -> StackAggregate {
    if stacks.iter().any(OnboardingStack::is_failed) {
        StackAggregate::Failed
    } else if !stacks.is_empty() && stacks.iter().all(OnboardingStack::is_complete) {
        StackAggregate::Complete
    } else {
        StackAggregate::InProgress
    }
}

/// What one applied notification changed.
struct StackChange {
    phase: OnboardingStatus,
}

impl OnboardingService {
    /// Apply a stack lifecycle notification, correlated by tenant and stack id.
    ///
    /// The status write is skipped when the stored text already matches, but
    /// the phase event is still decided from the stored record: a
    /// redelivered completion whose earlier publish failed publishes again
    /// until the next phase has left its mark (app stacks requested, status
    /// `provisioned`).
    pub async fn handle_stack_status_changed(
        &self,
        detail: StackStatusDetail,
        correlation: Option<&str>,
    ) -> OnboardingResult<()> {
        let Some(record) = self.store.get_by_tenant(detail.tenant_id).await? else {
            warn!(
                tenant_id = %detail.tenant_id,
                stack_id = %detail.stack_id,
                "No onboarding for tenant, dropping stack notification"
            );
            return Ok(());
        };
        let id = record.id;
        if record.stack(&detail.stack_id).is_none() {
            warn!(
                onboarding_id = %id,
                stack_id = %detail.stack_id,
                "Unknown stack, dropping notification"
            );
            return Ok(());
        }

        let applied = self
            .modify(id, |record| {
                let phase = record.status;
                let Some(stack) = record
                    .stacks
                    .iter_mut()
                    .find(|s| s.stack_id == detail.stack_id)
                else {
                    return Ok(None);
                };
                if stack.status == detail.stack_status {
                    return Ok(None);
                }
                stack.status = detail.stack_status.clone();

                if phase == OnboardingStatus::Updating
                    && aggregate_status(&record.stacks) == StackAggregate::Complete
                {
                    set_status(record, OnboardingStatus::Updated)?;
                }
                Ok(Some(StackChange { phase }))
            })
            .await?;

        let (stored, change) = match applied {
            Some((stored, change)) => {
                info!(
                    onboarding_id = %id,
                    stack_id = %detail.stack_id,
                    stack_status = %detail.stack_status,
                    status = %stored.status,
                    "Stack status recorded"
                );
                (stored, Some(change))
            }
            None => {
                debug!(
                    onboarding_id = %id,
                    stack_id = %detail.stack_id,
                    "Stack status unchanged"
                );
                (self.load(id).await?, None)
            }
        };

        if aggregate_status(&stored.stacks) == StackAggregate::Failed {
            return self
                .fail_onboarding(
                    id,
                    format!("Stack {} reported {}", detail.stack_id, detail.stack_status),
                    correlation,
                )
                .await;
        }

        if let Some(event) = phase_event(&stored, &detail.stack_id) {
            self.publish(event, &OnboardingDetail { onboarding_id: id }, correlation)
                .await?;
        }

        if let Some(change) = change.filter(|c| c.phase != stored.status) {
            debug!(
                onboarding_id = %id,
                from = %change.phase,
                to = %stored.status,
                "Stack set moved the onboarding"
            );
            self.notify_status(detail.tenant_id, stored.status, correlation)
                .await?;
        }
        Ok(())
    }
}

/// The phase event a completed stack calls for, if its phase is not done yet.
///
/// BaseProvisioned while no app stack exists; Provisioned once every stack,
/// app stacks included, is complete and the record is still `provisioning`.
fn phase_event(record: &Onboarding, stack_id: &str) -> Option<OnboardingEvent> {
    let stack = record.stack(stack_id)?;
    if record.status != OnboardingStatus::Provisioning || !stack.is_complete() {
        return None;
    }
    if stack.base_stack && record.base_stacks_complete() && !record.has_app_stacks() {
        Some(OnboardingEvent::BaseProvisioned)
    } else if record.has_app_stacks() && record.stacks_complete() {
        Some(OnboardingEvent::Provisioned)
    } else {
        None
    }
}
