//! Tenant Onboarding - event-driven control-plane workflow
//!
//! Takes a tenant from an inbound creation request through validation,
//! infrastructure provisioning and application deployment, tracking status on
//! a durable onboarding record throughout.
//!
//! ## Flow
//!
//! ```text
//! create ─▶ Initiated ─▶ validation queue ─▶ Validated ─▶ TenantAssigned
//!        ─▶ base stack ─▶ BaseProvisioned ─▶ app stacks ─▶ Provisioned
//!        ─▶ deployment-ready ─▶ pipeline changes ─▶ Deployed
//! ```
//!
//! Every arrow is an at-least-once hop. Handlers guard on the record's current
//! status and write through [`store::OnboardingStore`] with optimistic
//! concurrency, so replays and races resolve on the record rather than in
//! process memory.

// Core error handling
pub mod error;

// Immutable startup configuration
pub mod config;

// Durable onboarding records
pub mod store;

// Validation queue + listener loop
pub mod queue;

// Synchronous collaborators (tenant directory, settings, registry, ...)
pub mod clients;

// Event envelopes, publisher, router
pub mod events;

// Phase handlers
pub mod workflow;

// In-process wiring for local runs and tests
pub mod local;

pub use config::{Backend, OnboardingConfig};
pub use error::{
    ClientError, ConfigError, OnboardingError, OnboardingResult, ParameterError, QueueError,
    StoreError,
};
pub use local::LocalEnvironment;
pub use events::{EventEnvelope, EventPublisher, EventRouter, OnboardingEvent};
pub use queue::{ValidationQueue, ValidationQueueListener};
pub use store::{MemoryStore, OnboardingStore};
pub use workflow::{Collaborators, OnboardingService};

pub use onboarding_types as types;
