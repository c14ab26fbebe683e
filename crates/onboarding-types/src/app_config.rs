//! Application configuration and tenant directory shapes.
//!
//! The settings service owns the application config; the tenant directory
//! owns tenant records and their provisioned resource inventory. Both are
//! read-only from the onboarding workflow's point of view.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default image tag when a service does not pin one.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Default tier key when a tenant has none.
pub const DEFAULT_TIER: &str = "default";

// ============================================================================
// APPLICATION CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosted_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_certificate: Option<String>,
    /// Keyed by service name. Ordered so every phase walks services the same way.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

impl AppConfig {
    pub fn domain(&self) -> Option<&str> {
        non_blank(self.domain_name.as_deref())
    }

    pub fn zone(&self) -> Option<&str> {
        non_blank(self.hosted_zone.as_deref())
    }

    pub fn has_private_services(&self) -> bool {
        self.services.values().any(|s| !s.public)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default)]
    pub public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub container_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_system: Option<String>,
    #[serde(default)]
    pub tiers: BTreeMap<String, TierConfig>,
}

impl ServiceConfig {
    pub fn image_tag(&self) -> &str {
        non_blank(self.container_tag.as_deref()).unwrap_or(DEFAULT_IMAGE_TAG)
    }

    pub fn repository(&self) -> Option<&str> {
        non_blank(self.container_repo.as_deref())
    }

    /// Public path, or empty for private services.
    pub fn public_path(&self) -> &str {
        if self.public {
            self.path.as_deref().unwrap_or("")
        } else {
            ""
        }
    }
}

/// Per-tier sizing for one service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierConfig {
    #[serde(default)]
    pub min: u32,
    #[serde(default)]
    pub max: u32,
    #[serde(default)]
    pub cpu: u32,
    #[serde(default)]
    pub memory: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<FilesystemConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,
}

/// Shared filesystem attached to a service. EFS and FSx are exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fileSystemType")]
pub enum FilesystemConfig {
    #[serde(rename = "EFS", rename_all = "camelCase")]
    Efs {
        mount_point: String,
        #[serde(default)]
        encrypt_at_rest: bool,
        #[serde(default = "default_efs_lifecycle")]
        filesystem_lifecycle: String,
    },
    #[serde(rename = "FSX", rename_all = "camelCase")]
    Fsx {
        mount_point: String,
        storage_gb: u32,
        throughput_mbs: u32,
        #[serde(default = "default_backup_retention")]
        backup_retention_days: u32,
        #[serde(default)]
        daily_backup_time: String,
        #[serde(default)]
        weekly_maintenance_time: String,
        #[serde(default)]
        windows_mount_drive: String,
    },
}

fn default_efs_lifecycle() -> String {
    "NEVER".to_string()
}

fn default_backup_retention() -> u32 {
    7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub engine: String,
    pub version: String,
    pub family: String,
    pub instance_class: String,
    pub username: String,
    pub port: u16,
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_filename: Option<String>,
}

// ============================================================================
// TENANT DIRECTORY
// ============================================================================

/// A provisioned resource reference in the tenant inventory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantResource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    /// Inventory keyed by resource kind, e.g. `VPC`, `ECS_CLUSTER`.
    #[serde(default)]
    pub resources: BTreeMap<String, TenantResource>,
}

impl TenantRecord {
    pub fn tier(&self) -> &str {
        non_blank(self.tier.as_deref()).unwrap_or(DEFAULT_TIER)
    }

    pub fn subdomain(&self) -> &str {
        self.subdomain.as_deref().unwrap_or("")
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
