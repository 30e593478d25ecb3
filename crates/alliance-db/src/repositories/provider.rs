//! Provider repository implementation

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use alliance_core::{
    AllianceError, Provider, ProviderConfig, ProviderId, ProviderRepository, ProviderType, Result,
};

/// PostgreSQL implementation of ProviderRepository
pub struct PgProviderRepository {
    pool: PgPool,
}

impl PgProviderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_provider(row: &sqlx::postgres::PgRow) -> Result<Provider> {
    let type_str: String = row.get("provider_type");
    let provider_type: ProviderType = type_str
        .parse()
        .map_err(|_| AllianceError::database_error(format!("Bad provider_type: {}", type_str)))?;

    let config_json: serde_json::Value = row.get("config");
    let config: ProviderConfig = serde_json::from_value(config_json)
        .map_err(|e| AllianceError::database_error(format!("Bad provider config: {}", e)))?;

    Ok(Provider {
        id: ProviderId::from_uuid(row.get("id")),
        name: row.get("name"),
        provider_type,
        enabled: row.get("enabled"),
        is_managed: row.get("is_managed"),
        container_ref: row.get("container_ref"),
        config,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const PROVIDER_COLUMNS: &str =
    "id, name, provider_type, enabled, is_managed, container_ref, config, created_at, updated_at";

#[async_trait]
impl ProviderRepository for PgProviderRepository {
    #[instrument(skip(self, provider), fields(provider_id = %provider.id))]
    async fn create(&self, provider: &Provider) -> Result<Provider> {
        let config_json = serde_json::to_value(&provider.config)
            .map_err(|e| AllianceError::internal_error(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO providers (id, name, provider_type, enabled, is_managed, container_ref, config, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(provider.id.as_uuid())
        .bind(&provider.name)
        .bind(provider.provider_type.to_string())
        .bind(provider.enabled)
        .bind(provider.is_managed)
        .bind(&provider.container_ref)
        .bind(&config_json)
        .bind(provider.created_at)
        .bind(provider.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        Ok(provider.clone())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: ProviderId) -> Result<Option<Provider>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM providers WHERE id = $1",
            PROVIDER_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        row.as_ref().map(row_to_provider).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_name(&self, name: &str) -> Result<Option<Provider>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM providers WHERE name = $1",
            PROVIDER_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        row.as_ref().map(row_to_provider).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Provider>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM providers ORDER BY created_at",
            PROVIDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        rows.iter().map(row_to_provider).collect()
    }

    #[instrument(skip(self))]
    async fn list_enabled(&self) -> Result<Vec<Provider>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM providers WHERE enabled ORDER BY created_at",
            PROVIDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        rows.iter().map(row_to_provider).collect()
    }

    #[instrument(skip(self, provider), fields(provider_id = %provider.id))]
    async fn update(&self, provider: &Provider) -> Result<Provider> {
        let config_json = serde_json::to_value(&provider.config)
            .map_err(|e| AllianceError::internal_error(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE providers
            SET name = $2, enabled = $3, is_managed = $4, container_ref = $5, config = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(provider.id.as_uuid())
        .bind(&provider.name)
        .bind(provider.enabled)
        .bind(provider.is_managed)
        .bind(&provider.container_ref)
        .bind(&config_json)
        .bind(provider.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AllianceError::not_found("provider", provider.id.to_string()));
        }

        Ok(provider.clone())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: ProviderId) -> Result<()> {
        // Dependent rows are removed in the same transaction. The schema
        // carries ON DELETE CASCADE as well, but the engine does not rely
        // on it: a partial delete must never be observable.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AllianceError::database_error(e.to_string()))?;

        for table in ["clients", "alliance_users", "alliance_groups"] {
            sqlx::query(&format!("DELETE FROM {} WHERE provider_id = $1", table))
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| AllianceError::database_error(e.to_string()))?;
        }

        let result = sqlx::query("DELETE FROM providers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| AllianceError::database_error(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AllianceError::not_found("provider", id.to_string()));
        }

        tx.commit()
            .await
            .map_err(|e| AllianceError::database_error(e.to_string()))?;
        Ok(())
    }
}
