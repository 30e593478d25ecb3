//! Relying-party client repository implementation

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use alliance_core::{
    AllianceError, Client, ClientId, ClientRepository, ProviderId, Result, SsoTier,
};

/// PostgreSQL implementation of ClientRepository
pub struct PgClientRepository {
    pool: PgPool,
}

impl PgClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CLIENT_COLUMNS: &str = "id, provider_id, container_ref, app_name, client_id, \
     client_secret_enc, redirect_uris, scopes, sso_tier, config, created_at, updated_at";

fn row_to_client(row: &sqlx::postgres::PgRow) -> Result<Client> {
    let tier: i16 = row.get("sso_tier");
    let sso_tier = SsoTier::from_u8(tier as u8)?;

    let redirect_uris: serde_json::Value = row.get("redirect_uris");
    let redirect_uris: Vec<String> = serde_json::from_value(redirect_uris)
        .map_err(|e| AllianceError::database_error(format!("Bad redirect_uris: {}", e)))?;

    let scopes: serde_json::Value = row.get("scopes");
    let scopes: Vec<String> = serde_json::from_value(scopes)
        .map_err(|e| AllianceError::database_error(format!("Bad scopes: {}", e)))?;

    Ok(Client {
        id: ClientId::from_uuid(row.get("id")),
        provider_id: ProviderId::from_uuid(row.get("provider_id")),
        container_ref: row.get("container_ref"),
        app_name: row.get("app_name"),
        client_id: row.get("client_id"),
        client_secret_enc: row.get("client_secret_enc"),
        redirect_uris,
        scopes,
        sso_tier,
        config: row.get("config"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl ClientRepository for PgClientRepository {
    #[instrument(skip(self, client), fields(client_id = %client.id))]
    async fn create(&self, client: &Client) -> Result<Client> {
        let redirect_uris = serde_json::to_value(&client.redirect_uris)
            .map_err(|e| AllianceError::internal_error(e.to_string()))?;
        let scopes = serde_json::to_value(&client.scopes)
            .map_err(|e| AllianceError::internal_error(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO clients (id, provider_id, container_ref, app_name, client_id,
                client_secret_enc, redirect_uris, scopes, sso_tier, config, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(client.id.as_uuid())
        .bind(client.provider_id.as_uuid())
        .bind(&client.container_ref)
        .bind(&client.app_name)
        .bind(&client.client_id)
        .bind(&client.client_secret_enc)
        .bind(&redirect_uris)
        .bind(&scopes)
        .bind(client.sso_tier.as_u8() as i16)
        .bind(&client.config)
        .bind(client.created_at)
        .bind(client.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        Ok(client.clone())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: ClientId) -> Result<Option<Client>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM clients WHERE id = $1",
            CLIENT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        row.as_ref().map(row_to_client).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_app(
        &self,
        provider_id: ProviderId,
        app_name: &str,
    ) -> Result<Option<Client>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM clients WHERE provider_id = $1 AND app_name = $2",
            CLIENT_COLUMNS
        ))
        .bind(provider_id.as_uuid())
        .bind(app_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        row.as_ref().map(row_to_client).transpose()
    }

    #[instrument(skip(self))]
    async fn list_by_provider(&self, provider_id: ProviderId) -> Result<Vec<Client>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM clients WHERE provider_id = $1 ORDER BY created_at",
            CLIENT_COLUMNS
        ))
        .bind(provider_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        rows.iter().map(row_to_client).collect()
    }

    #[instrument(skip(self))]
    async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM clients")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AllianceError::database_error(e.to_string()))?;

        let n: i64 = row.get("n");
        Ok(n as u64)
    }

    #[instrument(skip(self, client), fields(client_id = %client.id))]
    async fn update(&self, client: &Client) -> Result<Client> {
        let redirect_uris = serde_json::to_value(&client.redirect_uris)
            .map_err(|e| AllianceError::internal_error(e.to_string()))?;
        let scopes = serde_json::to_value(&client.scopes)
            .map_err(|e| AllianceError::internal_error(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE clients
            SET container_ref = $2, app_name = $3, client_secret_enc = $4,
                redirect_uris = $5, scopes = $6, sso_tier = $7, config = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(client.id.as_uuid())
        .bind(&client.container_ref)
        .bind(&client.app_name)
        .bind(&client.client_secret_enc)
        .bind(&redirect_uris)
        .bind(&scopes)
        .bind(client.sso_tier.as_u8() as i16)
        .bind(&client.config)
        .bind(client.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AllianceError::ClientNotFound {
                id: client.id.to_string(),
            });
        }

        Ok(client.clone())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: ClientId) -> Result<()> {
        sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| AllianceError::database_error(e.to_string()))?;

        Ok(())
    }
}
