//! Stack parameter assembly.
//!
//! Pure functions from configuration, tenant data and app config to the flat
//! parameter lists the provisioning engine takes. A required value that does
//! not resolve is a [`ParameterError`] and no request is issued.

use std::collections::BTreeMap;

use rand::distributions::Alphanumeric;
use rand::Rng;

use onboarding_types::api::UpdateProvisionedTenantRequest;
use onboarding_types::{AppConfig, FilesystemConfig, ServiceConfig, TenantRecord};

use crate::clients::StackParameter;
use crate::config::OnboardingConfig;
use crate::error::ParameterError;

/// Provisioning engine limit on stack names.
pub const MAX_STACK_NAME_LEN: usize = 128;

const STACK_SUFFIX_LEN: usize = 12;

// ============================================================================
// TENANT RESOURCES
// ============================================================================

/// Network and runtime references from the tenant's resource inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantResources {
    pub vpc: String,
    pub private_subnet_a: String,
    pub private_subnet_b: String,
    pub ecs_cluster: String,
    pub ecs_security_group: String,
    pub load_balancer: String,
    pub http_listener: String,
    /// Blank when the tenant has no certificate.
    pub https_listener: String,
}

impl TenantResources {
    pub fn from_tenant(tenant: &TenantRecord) -> Result<Self, ParameterError> {
        let name = |key: &'static str| {
            tenant
                .resources
                .get(key)
                .map(|r| r.name.clone())
                .filter(|v| !v.trim().is_empty())
                .ok_or(ParameterError::MissingResource(key))
        };
        let arn = |key: &'static str| {
            tenant
                .resources
                .get(key)
                .map(|r| r.arn.clone())
                .filter(|v| !v.trim().is_empty())
                .ok_or(ParameterError::MissingResource(key))
        };

        Ok(Self {
            vpc: name("VPC")?,
            private_subnet_a: name("PRIVATE_SUBNET_A")?,
            private_subnet_b: name("PRIVATE_SUBNET_B")?,
            ecs_cluster: name("ECS_CLUSTER")?,
            ecs_security_group: name("ECS_SECURITY_GROUP")?,
            load_balancer: arn("LOAD_BALANCER")?,
            http_listener: arn("HTTP_LISTENER")?,
            https_listener: arn("HTTPS_LISTENER").unwrap_or_default(),
        })
    }
}

// ============================================================================
// NAMING
// ============================================================================

/// Keep `[0-9A-Za-z-]`, lower-cased.
pub fn service_resource_name(service_name: &str) -> String {
    service_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// `orderService` and `order-service` both become `ORDER_SERVICE`.
pub(crate) fn upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && previous_lower {
                out.push('_');
            }
            out.push(c.to_ascii_uppercase());
            previous_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            previous_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

pub(crate) fn base_stack_name(config: &OnboardingConfig, tenant_short_id: &str) -> String {
    format!("{}{}", config.tenant_name_head(), tenant_short_id)
}

pub(crate) fn app_stack_name(
    config: &OnboardingConfig,
    tenant_short_id: &str,
    resource_name: &str,
    suffix: &str,
) -> String {
    let mut name = format!(
        "{}{}-app-{}-{}",
        config.tenant_name_head(),
        tenant_short_id,
        resource_name,
        suffix
    );
    name.truncate(MAX_STACK_NAME_LEN);
    name
}

pub(crate) fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STACK_SUFFIX_LEN)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect()
}

/// `10.12.0.0/16` -> `10.12`.
pub(crate) fn cidr_prefix(block: &str) -> Option<String> {
    let mut octets = block.split('/').next()?.split('.');
    let first = octets.next().filter(|o| !o.is_empty())?;
    let second = octets.next().filter(|o| !o.is_empty())?;
    Some(format!("{first}.{second}"))
}

/// Listener rule priority per public service: longest path first.
///
/// Ties keep the services' map order, so the assignment is stable.
pub fn path_priorities(services: &BTreeMap<String, ServiceConfig>) -> BTreeMap<String, u32> {
    let mut public: Vec<(&String, usize)> = services
        .iter()
        .filter(|(_, s)| s.public)
        .map(|(name, s)| (name, s.path.as_deref().unwrap_or("").len()))
        .collect();
    public.sort_by(|a, b| b.1.cmp(&a.1));

    public
        .into_iter()
        .zip(1..)
        .map(|((name, _), priority)| (name.clone(), priority))
        .collect()
}

// ============================================================================
// PARAMETER SETS
// ============================================================================

pub(crate) fn base_parameters(
    config: &OnboardingConfig,
    app_config: &AppConfig,
    tenant: &TenantRecord,
    cidr_prefix: &str,
) -> Result<Vec<StackParameter>, ParameterError> {
    let parameters = vec![
        required("Environment", &config.environment)?,
        StackParameter::value("DomainName", app_config.domain().unwrap_or("")),
        StackParameter::value("HostedZoneId", app_config.zone().unwrap_or("")),
        StackParameter::value(
            "SSLCertificateArn",
            app_config.ssl_certificate.as_deref().unwrap_or(""),
        ),
        StackParameter::value("TenantId", tenant.id.to_string()),
        StackParameter::value("TenantSubDomain", tenant.subdomain()),
        required("CidrPrefix", cidr_prefix)?,
        StackParameter::value("Tier", tenant.tier()),
    ];
    Ok(parameters)
}

/// Everything one app stack needs for `service` at the tenant's tier.
pub(crate) fn app_parameters(
    config: &OnboardingConfig,
    tenant: &TenantRecord,
    service_name: &str,
    service: &ServiceConfig,
    resources: &TenantResources,
    priority: u32,
) -> Result<Vec<StackParameter>, ParameterError> {
    let tier_name = tenant
        .tier
        .as_deref()
        .map(str::trim)
        .filter(|tier| !tier.is_empty())
        .ok_or(ParameterError::NoTier(tenant.id))?;
    let tier = service
        .tiers
        .get(tier_name)
        .ok_or_else(|| ParameterError::MissingTier {
            service: service_name.to_string(),
            tier: tier_name.to_string(),
        })?;
    let repository = service
        .repository()
        .ok_or(ParameterError::Missing("ContainerRepository"))?;

    let mut parameters = vec![
        required("Environment", &config.environment)?,
        StackParameter::value("TenantId", tenant.id.to_string()),
        StackParameter::value("ServiceName", service_name),
        StackParameter::value("ServiceResourceName", service_resource_name(service_name)),
        StackParameter::value("ContainerRepository", repository),
        StackParameter::value("ContainerRepositoryTag", service.image_tag()),
        StackParameter::value("ECSCluster", &resources.ecs_cluster),
        StackParameter::value("PubliclyAddressable", service.public.to_string()),
        StackParameter::value("PublicPathRoute", service.public_path()),
        StackParameter::value(
            "PublicPathRulePriority",
            (if service.public { priority } else { 0 }).to_string(),
        ),
        StackParameter::value("VPC", &resources.vpc),
        StackParameter::value("SubnetPrivateA", &resources.private_subnet_a),
        StackParameter::value("SubnetPrivateB", &resources.private_subnet_b),
        StackParameter::value("ECSLoadBalancer", &resources.load_balancer),
        StackParameter::value("ECSLoadBalancerHttpListener", &resources.http_listener),
        StackParameter::value("ECSLoadBalancerHttpsListener", &resources.https_listener),
        StackParameter::value("ECSSecurityGroup", &resources.ecs_security_group),
        StackParameter::value(
            "ContainerOS",
            service.operating_system.as_deref().unwrap_or("").replace('_', ""),
        ),
        StackParameter::value(
            "ClusterInstanceType",
            tier.instance_type.as_deref().unwrap_or(""),
        ),
        StackParameter::value("TaskMemory", tier.memory.to_string()),
        StackParameter::value("TaskCPU", tier.cpu.to_string()),
        StackParameter::value("MinTaskCount", tier.min.to_string()),
        StackParameter::value("MaxTaskCount", tier.max.to_string()),
        StackParameter::value("ContainerPort", service.container_port.to_string()),
        StackParameter::value(
            "ContainerHealthCheckPath",
            service.health_check_url.as_deref().unwrap_or(""),
        ),
    ];

    parameters.extend(filesystem_parameters(tier.filesystem.as_ref()));
    parameters.extend(database_parameters(config, tier.database.as_ref()));
    Ok(parameters)
}

fn filesystem_parameters(filesystem: Option<&FilesystemConfig>) -> Vec<StackParameter> {
    let (use_efs, use_fsx, mount_point) = match filesystem {
        Some(FilesystemConfig::Efs { mount_point, .. }) => (true, false, mount_point.as_str()),
        Some(FilesystemConfig::Fsx { mount_point, .. }) => (false, true, mount_point.as_str()),
        None => (false, false, ""),
    };

    let (encrypt, lifecycle) = match filesystem {
        Some(FilesystemConfig::Efs {
            encrypt_at_rest,
            filesystem_lifecycle,
            ..
        }) => (*encrypt_at_rest, filesystem_lifecycle.as_str()),
        _ => (false, "NEVER"),
    };

    let mut parameters = vec![
        StackParameter::value("UseEFS", use_efs.to_string()),
        StackParameter::value("MountPoint", mount_point),
        StackParameter::value("EncryptEFS", encrypt.to_string()),
        StackParameter::value("EFSLifecyclePolicy", lifecycle),
        StackParameter::value("UseFSx", use_fsx.to_string()),
    ];

    match filesystem {
        Some(FilesystemConfig::Fsx {
            storage_gb,
            throughput_mbs,
            backup_retention_days,
            daily_backup_time,
            weekly_maintenance_time,
            windows_mount_drive,
            ..
        }) => parameters.extend([
            StackParameter::value("FSxWindowsMountDrive", windows_mount_drive),
            StackParameter::value("FSxDailyBackupTime", daily_backup_time),
            StackParameter::value("FSxBackupRetention", backup_retention_days.to_string()),
            StackParameter::value("FSxThroughputCapacity", throughput_mbs.to_string()),
            StackParameter::value("FSxStorageCapacity", storage_gb.to_string()),
            StackParameter::value("FSxWeeklyMaintenanceTime", weekly_maintenance_time),
        ]),
        _ => parameters.extend([
            StackParameter::value("FSxWindowsMountDrive", ""),
            StackParameter::value("FSxDailyBackupTime", ""),
            StackParameter::value("FSxBackupRetention", "7"),
            StackParameter::value("FSxThroughputCapacity", "0"),
            StackParameter::value("FSxStorageCapacity", "0"),
            StackParameter::value("FSxWeeklyMaintenanceTime", ""),
        ]),
    }
    parameters
}

fn database_parameters(
    config: &OnboardingConfig,
    database: Option<&onboarding_types::DatabaseConfig>,
) -> Vec<StackParameter> {
    match database {
        Some(db) => vec![
            StackParameter::value("UseRDS", "true"),
            StackParameter::value("RDSInstanceClass", &db.instance_class),
            StackParameter::value("RDSEngine", &db.engine),
            StackParameter::value("RDSEngineVersion", &db.version),
            StackParameter::value("RDSParameterGroupFamily", &db.family),
            StackParameter::value("RDSMasterUsername", &db.username),
            StackParameter::value(
                "RDSMasterPasswordParam",
                format!("/{}/{}/DB_MASTER_PASSWORD", config.name_prefix, config.environment),
            ),
            StackParameter::value("RDSPort", db.port.to_string()),
            StackParameter::value("RDSDatabase", &db.database),
            StackParameter::value("RDSBootstrap", db.bootstrap_filename.as_deref().unwrap_or("")),
        ],
        None => vec![
            StackParameter::value("UseRDS", "false"),
            StackParameter::value("RDSInstanceClass", ""),
            StackParameter::value("RDSEngine", ""),
            StackParameter::value("RDSEngineVersion", ""),
            StackParameter::value("RDSParameterGroupFamily", ""),
            StackParameter::value("RDSMasterUsername", ""),
            StackParameter::value("RDSMasterPasswordParam", ""),
            StackParameter::value("RDSPort", "-1"),
            StackParameter::value("RDSDatabase", ""),
            StackParameter::value("RDSBootstrap", ""),
        ],
    }
}

/// Base stack parameters that an update never touches.
const UPDATE_KEEP_PREVIOUS: [&str; 7] = [
    "Environment",
    "DomainName",
    "HostedZoneId",
    "SSLCertificateArn",
    "TenantId",
    "CidrPrefix",
    "Tier",
];

/// Overrides where given, keep-previous everywhere else. The subdomain is
/// always sent because a blank value removes the DNS record.
pub(crate) fn update_parameters(
    request: &UpdateProvisionedTenantRequest,
    subdomain: &str,
) -> Vec<StackParameter> {
    let overridable = |key: &str, value: Option<String>| match value {
        Some(value) => StackParameter::value(key, value),
        None => StackParameter::use_previous(key),
    };

    let mut parameters: Vec<StackParameter> = UPDATE_KEEP_PREVIOUS
        .iter()
        .map(|key| StackParameter::use_previous(*key))
        .collect();
    parameters.extend([
        overridable("TaskMemory", request.memory.map(|v| v.to_string())),
        overridable("TaskCPU", request.cpu.map(|v| v.to_string())),
        overridable("TaskCount", request.min.map(|v| v.to_string())),
        overridable("MaxTaskCount", request.max.map(|v| v.to_string())),
        overridable("BillingPlan", request.billing_plan.clone()),
        StackParameter::value("TenantSubDomain", subdomain),
    ]);
    parameters
}

fn required(key: &'static str, value: &str) -> Result<StackParameter, ParameterError> {
    if value.trim().is_empty() {
        return Err(ParameterError::Missing(key));
    }
    Ok(StackParameter::value(key, value))
}

// ============================================================================
// SERVICE DISCOVERY
// ============================================================================

/// Host and port lines for every private service, `None` when all services
/// are public.
pub(crate) fn discovery_manifest(app_config: &AppConfig) -> Option<String> {
    let lines: Vec<String> = app_config
        .services
        .iter()
        .filter(|(_, s)| !s.public)
        .flat_map(|(name, s)| {
            let env = upper_snake(name);
            [
                format!("SERVICE_{env}_HOST={}.local", service_resource_name(name)),
                format!("SERVICE_{env}_PORT={}", s.container_port),
            ]
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n") + "\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ParameterValue;
    use crate::local::sample_app_config;
    use onboarding_types::{DatabaseConfig, TierConfig};
    use uuid::Uuid;

    fn public_service(path: &str) -> ServiceConfig {
        let mut service = sample_app_config().services["web"].clone();
        service.path = Some(path.to_string());
        service
    }

    fn tenant() -> TenantRecord {
        TenantRecord {
            id: Uuid::new_v4(),
            name: "Acme".into(),
            subdomain: None,
            tier: Some("default".into()),
            resources: crate::clients::standard_inventory(),
        }
    }

    fn literal<'a>(parameters: &'a [StackParameter], key: &str) -> Option<&'a str> {
        parameters.iter().find(|p| p.key == key).and_then(|p| p.literal())
    }

    #[test]
    fn test_path_priority_longest_first() {
        let services = BTreeMap::from([
            ("alpha".to_string(), public_service("/a")),
            ("beta".to_string(), public_service("/app/b")),
            ("gamma".to_string(), public_service("/*")),
        ]);
        let priorities = path_priorities(&services);
        assert_eq!(priorities["beta"], 1);
        assert_eq!(priorities["alpha"], 2);
        assert_eq!(priorities["gamma"], 3);
    }

    #[test]
    fn test_private_services_get_no_priority() {
        let mut private = public_service("/internal");
        private.public = false;
        let services = BTreeMap::from([("svc".to_string(), private)]);
        assert!(path_priorities(&services).is_empty());
    }

    #[test]
    fn test_names() {
        assert_eq!(service_resource_name("Order_Service 2"), "orderservice2");
        assert_eq!(upper_snake("orderService"), "ORDER_SERVICE");
        assert_eq!(upper_snake("order-service"), "ORDER_SERVICE");
        assert_eq!(cidr_prefix("10.12.0.0/16").as_deref(), Some("10.12"));
        assert_eq!(cidr_prefix("garbage"), None);

        let suffix = random_suffix();
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_app_stack_name_truncated() {
        let config = OnboardingConfig::for_environment("test");
        let long = "x".repeat(200);
        let name = app_stack_name(&config, "abcd1234", &long, "SUFFIX");
        assert_eq!(name.len(), MAX_STACK_NAME_LEN);
        assert!(name.starts_with("onb-test-tenant-abcd1234-app-xxx"));
    }

    #[test]
    fn test_base_parameters_defaults() {
        let config = OnboardingConfig::for_environment("test");
        let mut tenant = tenant();
        tenant.tier = None;
        let parameters = base_parameters(&config, &sample_app_config(), &tenant, "10.3").unwrap();
        assert_eq!(literal(&parameters, "DomainName"), Some(""));
        assert_eq!(literal(&parameters, "Tier"), Some("default"));
        assert_eq!(literal(&parameters, "CidrPrefix"), Some("10.3"));

        let err = base_parameters(&config, &sample_app_config(), &tenant, "").unwrap_err();
        assert_eq!(err, ParameterError::Missing("CidrPrefix"));
    }

    #[test]
    fn test_app_parameters_blank_tenant_tier() {
        let config = OnboardingConfig::for_environment("test");
        let mut tenant = tenant();
        tenant.tier = Some("  ".into());
        let resources = TenantResources::from_tenant(&tenant).unwrap();
        let err = app_parameters(&config, &tenant, "web", &public_service("/*"), &resources, 1)
            .unwrap_err();
        assert_eq!(err, ParameterError::NoTier(tenant.id));
    }

    #[test]
    fn test_app_parameters_missing_tier() {
        let config = OnboardingConfig::for_environment("test");
        let mut tenant = tenant();
        tenant.tier = Some("platinum".into());
        let resources = TenantResources::from_tenant(&tenant).unwrap();
        let err = app_parameters(&config, &tenant, "web", &public_service("/*"), &resources, 1)
            .unwrap_err();
        assert!(matches!(err, ParameterError::MissingTier { .. }));
    }

    #[test]
    fn test_app_parameters_with_database() {
        let config = OnboardingConfig::for_environment("test");
        let tenant = tenant();
        let resources = TenantResources::from_tenant(&tenant).unwrap();
        let mut service = public_service("/api");
        service.operating_system = Some("WINDOWS_2019".into());
        service.tiers.insert(
            "default".into(),
            TierConfig {
                database: Some(DatabaseConfig {
                    engine: "postgres".into(),
                    version: "15".into(),
                    family: "postgres15".into(),
                    instance_class: "db.t3.micro".into(),
                    username: "admin".into(),
                    port: 5432,
                    database: "app".into(),
                    bootstrap_filename: None,
                }),
                ..TierConfig::default()
            },
        );

        let parameters = app_parameters(&config, &tenant, "web", &service, &resources, 2).unwrap();
        assert_eq!(literal(&parameters, "UseRDS"), Some("true"));
        assert_eq!(
            literal(&parameters, "RDSMasterPasswordParam"),
            Some("/onb/test/DB_MASTER_PASSWORD")
        );
        assert_eq!(literal(&parameters, "ContainerOS"), Some("WINDOWS2019"));
        assert_eq!(literal(&parameters, "PublicPathRulePriority"), Some("2"));
        assert_eq!(literal(&parameters, "UseEFS"), Some("false"));
    }

    #[test]
    fn test_missing_inventory_entry() {
        let mut tenant = tenant();
        tenant.resources.remove("HTTP_LISTENER");
        assert_eq!(
            TenantResources::from_tenant(&tenant).unwrap_err(),
            ParameterError::MissingResource("HTTP_LISTENER")
        );

        let mut tenant = self::tenant();
        tenant.resources.remove("HTTPS_LISTENER");
        assert_eq!(TenantResources::from_tenant(&tenant).unwrap().https_listener, "");
    }

    #[test]
    fn test_update_parameters_keep_previous() {
        let request = UpdateProvisionedTenantRequest {
            memory: Some(2048),
            ..Default::default()
        };
        let parameters = update_parameters(&request, "");
        assert_eq!(literal(&parameters, "TaskMemory"), Some("2048"));
        assert_eq!(literal(&parameters, "TenantSubDomain"), Some(""));
        let cpu = parameters.iter().find(|p| p.key == "TaskCPU").unwrap();
        assert_eq!(cpu.value, ParameterValue::UsePrevious { use_previous: true });
    }

    #[test]
    fn test_discovery_manifest_lists_private_services() {
        let mut app_config = sample_app_config();
        assert!(discovery_manifest(&app_config).is_none());

        let mut private = public_service("");
        private.public = false;
        private.container_port = 9000;
        app_config.services.insert("orderService".into(), private);

        let manifest = discovery_manifest(&app_config).unwrap();
        assert!(manifest.contains("SERVICE_ORDER_SERVICE_HOST=orderservice.local\n"));
        assert!(manifest.contains("SERVICE_ORDER_SERVICE_PORT=9000\n"));
    }
}
