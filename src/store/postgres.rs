//! Postgres onboarding store.
//!
//! NOTE: All queries use runtime-checked sqlx::query() instead of compile-time
//! sqlx::query!() macros because the tables are created by migrations that may
//! not exist at compile time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use onboarding_types::{Onboarding, OnboardingStatus};

use super::OnboardingStore;
use crate::error::StoreError;

const SELECT_COLUMNS: &str = r#"
    SELECT id, status, request, tenant_id, stacks, zip_file_url,
           created_at, modified_at, version
    FROM onboarding.onboardings
"#;

pub struct PgOnboardingStore {
    pool: PgPool,
}

impl PgOnboardingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<Onboarding, StoreError> {
        let status: String = row.try_get("status")?;
        let status: OnboardingStatus = status.parse().map_err(|e: String| {
            StoreError::Serialisation(serde::de::Error::custom(e))
        })?;
        let request: Option<serde_json::Value> = row.try_get("request")?;
        let stacks: serde_json::Value = row.try_get("stacks")?;
        let created: DateTime<Utc> = row.try_get("created_at")?;
        let modified: DateTime<Utc> = row.try_get("modified_at")?;

        Ok(Onboarding {
            id: row.try_get("id")?,
            status,
            request: request.map(serde_json::from_value).transpose()?,
            tenant_id: row.try_get("tenant_id")?,
            stacks: serde_json::from_value(stacks)?,
            zip_file_url: row.try_get("zip_file_url")?,
            created,
            modified,
            version: row.try_get("version")?,
        })
    }
}

#[async_trait]
impl OnboardingStore for PgOnboardingStore {
    async fn insert(&self, onboarding: &Onboarding) -> Result<Onboarding, StoreError> {
        let request = onboarding
            .request
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let stacks = serde_json::to_value(&onboarding.stacks)?;

        let rows = sqlx::query(
            r#"
            INSERT INTO onboarding.onboardings
                (id, status, request, tenant_id, stacks, zip_file_url,
                 created_at, modified_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(onboarding.id)
        .bind(onboarding.status.as_str())
        .bind(request)
        .bind(onboarding.tenant_id)
        .bind(stacks)
        .bind(&onboarding.zip_file_url)
        .bind(onboarding.created)
        .bind(onboarding.modified)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(StoreError::AlreadyExists(onboarding.id));
        }

        let mut stored = onboarding.clone();
        stored.version = 0;
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Onboarding>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn get_by_tenant(&self, tenant_id: Uuid) -> Result<Option<Onboarding>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE tenant_id = $1 LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn find_by_tenant_prefix(&self, prefix: &str) -> Result<Option<Onboarding>, StoreError> {
        if prefix.is_empty() {
            return Ok(None);
        }
        let pattern = format!("{}%", prefix.replace('%', "").replace('_', ""));
        let sql = format!("{SELECT_COLUMNS} WHERE tenant_id::text LIKE $1 LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(pattern)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list(&self, tenant_id: Option<Uuid>) -> Result<Vec<Onboarding>, StoreError> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE ($1::uuid IS NULL OR tenant_id = $1) ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn update(&self, onboarding: &Onboarding) -> Result<Onboarding, StoreError> {
        let request = onboarding
            .request
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let stacks = serde_json::to_value(&onboarding.stacks)?;
        let new_version = onboarding.version + 1;
        let modified = Utc::now();

        let rows = sqlx::query(
            r#"
            UPDATE onboarding.onboardings
            SET status = $2,
                request = $3,
                tenant_id = $4,
                stacks = $5,
                zip_file_url = $6,
                modified_at = $7,
                version = $8
            WHERE id = $1 AND version = $9
            "#,
        )
        .bind(onboarding.id)
        .bind(onboarding.status.as_str())
        .bind(request)
        .bind(onboarding.tenant_id)
        .bind(stacks)
        .bind(&onboarding.zip_file_url)
        .bind(modified)
        .bind(new_version)
        .bind(onboarding.version)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            let exists = sqlx::query("SELECT 1 FROM onboarding.onboardings WHERE id = $1")
                .bind(onboarding.id)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            return Err(if exists {
                StoreError::Conflict {
                    id: onboarding.id,
                    version: onboarding.version,
                }
            } else {
                StoreError::NotFound(onboarding.id)
            });
        }

        let mut stored = onboarding.clone();
        stored.version = new_version;
        stored.modified = modified;
        Ok(stored)
    }
}
