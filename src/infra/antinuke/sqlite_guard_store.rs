// SQLite-backed settings store for the antinuke.
//
// Tables:
// - guild_settings: Per-guild log channel and thresholds (JSON)
// - whitelist_members: Members exempt from mitigation
// - whitelist_roles: Roles whose holders are exempt from mitigation

use crate::core::antinuke::{GuardError, GuardSettingsStore, ThresholdConfig};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteGuardStore {
    pool: Pool<Sqlite>,
}

impl SqliteGuardStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), GuardError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guild_settings (
                guild_id INTEGER PRIMARY KEY,
                log_channel_id INTEGER,
                thresholds_json TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| GuardError::StorageError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS whitelist_members (
                guild_id INTEGER NOT NULL,
                member_id INTEGER NOT NULL,
                PRIMARY KEY (guild_id, member_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| GuardError::StorageError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS whitelist_roles (
                guild_id INTEGER NOT NULL,
                role_id INTEGER NOT NULL,
                PRIMARY KEY (guild_id, role_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| GuardError::StorageError(e.to_string()))?;

        Ok(())
    }

    async fn execute_pair(&self, sql: &str, guild_id: u64, id: u64) -> Result<bool, GuardError> {
        let result = sqlx::query(sql)
            .bind(guild_id as i64)
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| GuardError::StorageError(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_ids(&self, sql: &str, column: &str, guild_id: u64) -> Result<Vec<u64>, GuardError> {
        let rows = sqlx::query(sql)
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| GuardError::StorageError(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| row.get::<i64, _>(column) as u64)
            .collect())
    }
}

#[async_trait]
impl GuardSettingsStore for SqliteGuardStore {
    async fn get_thresholds(&self, guild_id: u64) -> Result<Option<ThresholdConfig>, GuardError> {
        let row = sqlx::query("SELECT thresholds_json FROM guild_settings WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GuardError::StorageError(e.to_string()))?;

        let json = match row.and_then(|r| r.get::<Option<String>, _>("thresholds_json")) {
            Some(json) => json,
            None => return Ok(None),
        };

        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| GuardError::ConfigError(format!("corrupt thresholds: {}", e)))
    }

    async fn save_thresholds(
        &self,
        guild_id: u64,
        config: ThresholdConfig,
    ) -> Result<(), GuardError> {
        let json =
            serde_json::to_string(&config).map_err(|e| GuardError::ConfigError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO guild_settings (guild_id, thresholds_json)
            VALUES (?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
                thresholds_json = excluded.thresholds_json
            "#,
        )
        .bind(guild_id as i64)
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(|e| GuardError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn clear_thresholds(&self, guild_id: u64) -> Result<(), GuardError> {
        sqlx::query("UPDATE guild_settings SET thresholds_json = NULL WHERE guild_id = ?")
            .bind(guild_id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| GuardError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn get_log_channel(&self, guild_id: u64) -> Result<Option<u64>, GuardError> {
        let row = sqlx::query("SELECT log_channel_id FROM guild_settings WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GuardError::StorageError(e.to_string()))?;

        Ok(row
            .and_then(|r| r.get::<Option<i64>, _>("log_channel_id"))
            .map(|id| id as u64))
    }

    async fn set_log_channel(&self, guild_id: u64, channel_id: u64) -> Result<(), GuardError> {
        sqlx::query(
            r#"
            INSERT INTO guild_settings (guild_id, log_channel_id)
            VALUES (?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
                log_channel_id = excluded.log_channel_id
            "#,
        )
        .bind(guild_id as i64)
        .bind(channel_id as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| GuardError::StorageError(e.to_string()))?;
        Ok(())
    }

    async fn add_whitelisted_member(
        &self,
        guild_id: u64,
        member_id: u64,
    ) -> Result<bool, GuardError> {
        self.execute_pair(
            "INSERT OR IGNORE INTO whitelist_members (guild_id, member_id) VALUES (?, ?)",
            guild_id,
            member_id,
        )
        .await
    }

    async fn remove_whitelisted_member(
        &self,
        guild_id: u64,
        member_id: u64,
    ) -> Result<bool, GuardError> {
        self.execute_pair(
            "DELETE FROM whitelist_members WHERE guild_id = ? AND member_id = ?",
            guild_id,
            member_id,
        )
        .await
    }

    async fn list_whitelisted_members(&self, guild_id: u64) -> Result<Vec<u64>, GuardError> {
        self.list_ids(
            "SELECT member_id FROM whitelist_members WHERE guild_id = ? ORDER BY member_id",
            "member_id",
            guild_id,
        )
        .await
    }

    async fn add_whitelisted_role(&self, guild_id: u64, role_id: u64) -> Result<bool, GuardError> {
        self.execute_pair(
            "INSERT OR IGNORE INTO whitelist_roles (guild_id, role_id) VALUES (?, ?)",
            guild_id,
            role_id,
        )
        .await
    }

    async fn remove_whitelisted_role(
        &self,
        guild_id: u64,
        role_id: u64,
    ) -> Result<bool, GuardError> {
        self.execute_pair(
            "DELETE FROM whitelist_roles WHERE guild_id = ? AND role_id = ?",
            guild_id,
            role_id,
        )
        .await
    }

    async fn list_whitelisted_roles(&self, guild_id: u64) -> Result<Vec<u64>, GuardError> {
        self.list_ids(
            "SELECT role_id FROM whitelist_roles WHERE guild_id = ? ORDER BY role_id",
            "role_id",
            guild_id,
        )
        .await
    }

    async fn is_whitelisted(
        &self,
        guild_id: u64,
        member_id: u64,
        role_ids: &[u64],
    ) -> Result<bool, GuardError> {
        let member = sqlx::query("SELECT 1 FROM whitelist_members WHERE guild_id = ? AND member_id = ?")
            .bind(guild_id as i64)
            .bind(member_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GuardError::StorageError(e.to_string()))?;

        if member.is_some() {
            return Ok(true);
        }

        if role_ids.is_empty() {
            return Ok(false);
        }

        let roles = self.list_whitelisted_roles(guild_id).await?;
        Ok(role_ids.iter().any(|id| roles.contains(id)))
    }
}
