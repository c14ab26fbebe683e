//! Shared application state
//!
//! One workflow service and the router that feeds events into it. Both are
//! cheap `Arc` clones per request.

use std::sync::Arc;

use tenant_onboarding::{EventRouter, OnboardingService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OnboardingService>,
    pub events: Arc<EventRouter>,
}

impl AppState {
    pub fn new(service: Arc<OnboardingService>) -> Self {
        let events = Arc::new(EventRouter::new(service.clone()));
        Self { service, events }
    }
}
