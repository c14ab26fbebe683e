//! Startup configuration.
//!
//! Built once from the environment (optionally seeded from a `.env` file) and
//! shared read-only as `Arc<OnboardingConfig>`. Blank required values fail at
//! startup, never inside a handler.

use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

/// Where records, queue and collaborators live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Everything in process. Local development and tests.
    Memory,
    /// Postgres records and queue, HTTP collaborators.
    Postgres,
}

impl std::str::FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            other => Err(ConfigError::Invalid {
                key: "ONBOARDING_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

/// Base URLs of the synchronous collaborators.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Tenant directory, settings and network allocator.
    pub api: Url,
    pub provisioning: Url,
    pub registry: Url,
    pub dns: Url,
    pub object_store: Url,
}

/// Validation queue polling.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub batch_size: usize,
    pub poll_interval: Duration,
    /// How long a released message stays hidden before redelivery.
    pub retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_millis(1000),
            retry_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Deployment environment name, part of every stack name.
    pub environment: String,
    /// Leading segment of every stack and pipeline name.
    pub name_prefix: String,
    /// Folder holding `tenant-onboarding.yaml` and `tenant-onboarding-app.yaml`.
    pub template_base_url: String,
    /// Notification target for base stack lifecycle changes.
    pub stack_topic: String,
    /// Notification target for app stack lifecycle changes.
    pub app_stack_topic: String,
    /// Key for upload URL signatures.
    pub object_store_secret: String,
    pub upload_ttl: Duration,
    pub bind_addr: String,
    pub queue: QueueConfig,
    pub backend: Backend,
    /// Present for the postgres backend.
    pub endpoints: Option<Endpoints>,
    pub database_url: Option<String>,
}

impl OnboardingConfig {
    /// In-memory configuration for an environment. Used by tests and local runs.
    pub fn for_environment(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            name_prefix: "onb".to_string(),
            template_base_url: "http://templates.local".to_string(),
            stack_topic: "onboarding-stack".to_string(),
            app_stack_topic: "onboarding-app-stack".to_string(),
            object_store_secret: "local-secret".to_string(),
            upload_ttl: Duration::from_secs(900),
            bind_addr: "0.0.0.0:3100".to_string(),
            queue: QueueConfig::default(),
            backend: Backend::Memory,
            endpoints: None,
            database_url: None,
        }
    }

    /// Load from process environment, after merging a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| optional(key).ok_or(ConfigError::Missing(key));

        let backend = match optional("ONBOARDING_BACKEND") {
            Some(value) => value.parse()?,
            None => Backend::Memory,
        };

        let mut config = Self::for_environment(required("ONBOARDING_ENV")?);
        config.backend = backend;

        if let Some(prefix) = optional("ONBOARDING_NAME_PREFIX") {
            config.name_prefix = prefix;
        }
        if let Some(ttl) = optional("ONBOARDING_UPLOAD_TTL_SECS") {
            let secs = parse_number("ONBOARDING_UPLOAD_TTL_SECS", &ttl)?;
            config.upload_ttl = Duration::from_secs(secs);
        }
        if let Some(addr) = optional("ONBOARDING_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(size) = optional("ONBOARDING_QUEUE_BATCH_SIZE") {
            config.queue.batch_size = match parse_number("ONBOARDING_QUEUE_BATCH_SIZE", &size)? {
                0 => {
                    return Err(ConfigError::Invalid {
                        key: "ONBOARDING_QUEUE_BATCH_SIZE",
                        value: size,
                    })
                }
                n => n as usize,
            };
        }
        if let Some(poll) = optional("ONBOARDING_QUEUE_POLL_MS") {
            config.queue.poll_interval =
                Duration::from_millis(parse_number("ONBOARDING_QUEUE_POLL_MS", &poll)?);
        }
        if let Some(delay) = optional("ONBOARDING_QUEUE_RETRY_SECS") {
            config.queue.retry_delay =
                Duration::from_secs(parse_number("ONBOARDING_QUEUE_RETRY_SECS", &delay)?);
        }

        if backend == Backend::Memory {
            return Ok(config);
        }

        config.template_base_url =
            parse_url("ONBOARDING_TEMPLATE_BASE_URL", &required("ONBOARDING_TEMPLATE_BASE_URL")?)?
                .to_string();
        config.stack_topic = required("ONBOARDING_STACK_TOPIC")?;
        config.app_stack_topic = required("ONBOARDING_APP_STACK_TOPIC")?;
        config.object_store_secret = required("ONBOARDING_OBJECT_STORE_SECRET")?;
        config.endpoints = Some(Endpoints {
            api: parse_url("ONBOARDING_API_URL", &required("ONBOARDING_API_URL")?)?,
            provisioning: parse_url(
                "ONBOARDING_PROVISIONING_URL",
                &required("ONBOARDING_PROVISIONING_URL")?,
            )?,
            registry: parse_url("ONBOARDING_REGISTRY_URL", &required("ONBOARDING_REGISTRY_URL")?)?,
            dns: parse_url("ONBOARDING_DNS_URL", &required("ONBOARDING_DNS_URL")?)?,
            object_store: parse_url(
                "ONBOARDING_OBJECT_STORE_URL",
                &required("ONBOARDING_OBJECT_STORE_URL")?,
            )?,
        });
        config.database_url = Some(required("DATABASE_URL")?);

        Ok(config)
    }

    /// `{prefix}-{env}-tenant-`, the shared head of stack and pipeline names.
    pub fn tenant_name_head(&self) -> String {
        format!("{}-{}-tenant-", self.name_prefix, self.environment)
    }

    pub fn base_template_url(&self) -> String {
        self.template_url("tenant-onboarding.yaml")
    }

    pub fn app_template_url(&self) -> String {
        self.template_url("tenant-onboarding-app.yaml")
    }

    fn template_url(&self, file: &str) -> String {
        let base = self.template_base_url.trim_end_matches('/');
        format!("{base}/{file}")
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
