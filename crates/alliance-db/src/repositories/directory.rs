//! Directory cache repository implementation

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use alliance_core::{
    AllianceError, DirectoryRepository, ExternalGroup, ExternalGroupId, ExternalUser,
    ExternalUserId, LocalGroupId, LocalUserId, ProviderId, Result,
};

/// PostgreSQL implementation of DirectoryRepository
pub struct PgDirectoryRepository {
    pool: PgPool,
}

impl PgDirectoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, provider_id, external_id, username, email, display_name, \
     groups, local_user_ref, last_sync, created_at";

const GROUP_COLUMNS: &str =
    "id, provider_id, external_id, name, description, local_group_ref, last_sync, created_at";

fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<ExternalUser> {
    let groups: serde_json::Value = row.get("groups");
    let groups: Vec<String> = serde_json::from_value(groups)
        .map_err(|e| AllianceError::database_error(format!("Bad groups: {}", e)))?;

    let local_user_ref: Option<uuid::Uuid> = row.get("local_user_ref");

    Ok(ExternalUser {
        id: ExternalUserId::from_uuid(row.get("id")),
        provider_id: ProviderId::from_uuid(row.get("provider_id")),
        external_id: row.get("external_id"),
        username: row.get("username"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        groups,
        local_user_ref: local_user_ref.map(LocalUserId::from_uuid),
        last_sync: row.get("last_sync"),
        created_at: row.get("created_at"),
    })
}

fn row_to_group(row: &sqlx::postgres::PgRow) -> Result<ExternalGroup> {
    let local_group_ref: Option<uuid::Uuid> = row.get("local_group_ref");

    Ok(ExternalGroup {
        id: ExternalGroupId::from_uuid(row.get("id")),
        provider_id: ProviderId::from_uuid(row.get("provider_id")),
        external_id: row.get("external_id"),
        name: row.get("name"),
        description: row.get("description"),
        local_group_ref: local_group_ref.map(LocalGroupId::from_uuid),
        last_sync: row.get("last_sync"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl DirectoryRepository for PgDirectoryRepository {
    #[instrument(skip(self))]
    async fn list_users(&self, provider_id: ProviderId) -> Result<Vec<ExternalUser>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM alliance_users WHERE provider_id = $1 ORDER BY username",
            USER_COLUMNS
        ))
        .bind(provider_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        rows.iter().map(row_to_user).collect()
    }

    #[instrument(skip(self))]
    async fn list_all_users(&self) -> Result<Vec<ExternalUser>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM alliance_users ORDER BY username",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        rows.iter().map(row_to_user).collect()
    }

    #[instrument(skip(self))]
    async fn get_user(&self, id: ExternalUserId) -> Result<Option<ExternalUser>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM alliance_users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        row.as_ref().map(row_to_user).transpose()
    }

    #[instrument(skip(self))]
    async fn get_user_by_external_id(
        &self,
        provider_id: ProviderId,
        external_id: &str,
    ) -> Result<Option<ExternalUser>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM alliance_users WHERE provider_id = $1 AND external_id = $2",
            USER_COLUMNS
        ))
        .bind(provider_id.as_uuid())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        row.as_ref().map(row_to_user).transpose()
    }

    #[instrument(skip(self, user), fields(external_id = %user.external_id))]
    async fn insert_user(&self, user: &ExternalUser) -> Result<ExternalUser> {
        let groups = serde_json::to_value(&user.groups)
            .map_err(|e| AllianceError::internal_error(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO alliance_users (id, provider_id, external_id, username, email,
                display_name, groups, local_user_ref, last_sync, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(user.provider_id.as_uuid())
        .bind(&user.external_id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&groups)
        .bind(user.local_user_ref.map(|r| *r.as_uuid()))
        .bind(user.last_sync)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        Ok(user.clone())
    }

    #[instrument(skip(self, user), fields(external_id = %user.external_id))]
    async fn update_user(&self, user: &ExternalUser) -> Result<ExternalUser> {
        let groups = serde_json::to_value(&user.groups)
            .map_err(|e| AllianceError::internal_error(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE alliance_users
            SET username = $2, email = $3, display_name = $4, groups = $5,
                local_user_ref = $6, last_sync = $7
            WHERE id = $1
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&groups)
        .bind(user.local_user_ref.map(|r| *r.as_uuid()))
        .bind(user.last_sync)
        .execute(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AllianceError::not_found("external user", user.id.to_string()));
        }

        Ok(user.clone())
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, id: ExternalUserId) -> Result<()> {
        sqlx::query("DELETE FROM alliance_users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| AllianceError::database_error(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn count_users(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM alliance_users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AllianceError::database_error(e.to_string()))?;

        let n: i64 = row.get("n");
        Ok(n as u64)
    }

    #[instrument(skip(self))]
    async fn list_groups(&self, provider_id: ProviderId) -> Result<Vec<ExternalGroup>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM alliance_groups WHERE provider_id = $1 ORDER BY name",
            GROUP_COLUMNS
        ))
        .bind(provider_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        rows.iter().map(row_to_group).collect()
    }

    #[instrument(skip(self))]
    async fn get_group(&self, id: ExternalGroupId) -> Result<Option<ExternalGroup>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM alliance_groups WHERE id = $1",
            GROUP_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        row.as_ref().map(row_to_group).transpose()
    }

    #[instrument(skip(self))]
    async fn get_group_by_external_id(
        &self,
        provider_id: ProviderId,
        external_id: &str,
    ) -> Result<Option<ExternalGroup>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM alliance_groups WHERE provider_id = $1 AND external_id = $2",
            GROUP_COLUMNS
        ))
        .bind(provider_id.as_uuid())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        row.as_ref().map(row_to_group).transpose()
    }

    #[instrument(skip(self, group), fields(external_id = %group.external_id))]
    async fn insert_group(&self, group: &ExternalGroup) -> Result<ExternalGroup> {
        sqlx::query(
            r#"
            INSERT INTO alliance_groups (id, provider_id, external_id, name, description,
                local_group_ref, last_sync, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(group.id.as_uuid())
        .bind(group.provider_id.as_uuid())
        .bind(&group.external_id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.local_group_ref.map(|r| *r.as_uuid()))
        .bind(group.last_sync)
        .bind(group.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        Ok(group.clone())
    }

    #[instrument(skip(self, group), fields(external_id = %group.external_id))]
    async fn update_group(&self, group: &ExternalGroup) -> Result<ExternalGroup> {
        let result = sqlx::query(
            r#"
            UPDATE alliance_groups
            SET name = $2, description = $3, local_group_ref = $4, last_sync = $5
            WHERE id = $1
            "#,
        )
        .bind(group.id.as_uuid())
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.local_group_ref.map(|r| *r.as_uuid()))
        .bind(group.last_sync)
        .execute(&self.pool)
        .await
        .map_err(|e| AllianceError::database_error(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AllianceError::not_found(
                "external group",
                group.id.to_string(),
            ));
        }

        Ok(group.clone())
    }

    #[instrument(skip(self))]
    async fn delete_group(&self, id: ExternalGroupId) -> Result<()> {
        sqlx::query("DELETE FROM alliance_groups WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| AllianceError::database_error(e.to_string()))?;

        Ok(())
    }
}
