//! Error types for tenant-onboarding.

use onboarding_types::OnboardingStatus;
use uuid::Uuid;

/// Result type alias using [`OnboardingError`].
pub type OnboardingResult<T> = Result<T, OnboardingError>;

/// Errors surfaced by workflow handlers and the request surface.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("onboarding not found: {0}")]
    NotFound(Uuid),

    #[error("invalid status transition: cannot transition from {from} to {to}")]
    InvalidTransition {
        from: OnboardingStatus,
        to: OnboardingStatus,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl OnboardingError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}

/// Record store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("onboarding not found: {0}")]
    NotFound(Uuid),

    #[error("onboarding already exists: {0}")]
    AlreadyExists(Uuid),

    /// Conditional write lost against a concurrent writer.
    #[error("optimistic concurrency conflict: onboarding {id} version {version} stale")]
    Conflict { id: Uuid, version: i64 },

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

/// Validation queue failures.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("queue closed")]
    Closed,
}

/// Synchronous collaborator call failures.
///
/// Everything here is transient from the workflow's point of view unless a
/// handler decides otherwise.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl ClientError {
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

/// Startup configuration failures. Fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// A provisioning parameter could not be resolved. Fatal for the onboarding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    #[error("template parameter {0} is missing")]
    Missing(&'static str),

    #[error("missing required tenant environment resource {0}")]
    MissingResource(&'static str),

    #[error("tenant {0} has no tier")]
    NoTier(Uuid),

    #[error("missing tier '{tier}' definition for service {service}")]
    MissingTier { service: String, tier: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_problem() {
        let err = OnboardingError::from(ParameterError::Missing("CidrPrefix"));
        assert_eq!(err.to_string(), "template parameter CidrPrefix is missing");

        let err = OnboardingError::InvalidTransition {
            from: OnboardingStatus::Failed,
            to: OnboardingStatus::Validating,
        };
        assert!(err.to_string().contains("from failed to validating"));
    }
}
