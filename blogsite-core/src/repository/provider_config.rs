//! OAuth2 provider configuration repository (Postgres)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oauth2::ClientSecret;
use sqlx::{FromRow, PgPool};

use super::ProviderConfigStore;
use crate::models::ProviderConfig;
use crate::Result;

const COLUMNS: &str =
    "code, display_name, client_id, client_secret, callback_url, enabled, created_at, updated_at";

#[derive(Clone)]
pub struct PgProviderConfigStore {
    pool: PgPool,
}

impl PgProviderConfigStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderConfigStore for PgProviderConfigStore {
    async fn list_enabled(&self) -> Result<Vec<ProviderConfig>> {
        let rows = sqlx::query_as::<_, ProviderConfigRow>(&format!(
            "SELECT {COLUMNS} FROM oauth_provider_configs WHERE enabled ORDER BY code"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert(&self, config: &ProviderConfig) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO oauth_provider_configs
                (code, display_name, client_id, client_secret, callback_url, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            ON CONFLICT (code)
            DO UPDATE SET
                display_name = EXCLUDED.display_name,
                client_id = EXCLUDED.client_id,
                client_secret = EXCLUDED.client_secret,
                callback_url = EXCLUDED.callback_url,
                enabled = EXCLUDED.enabled,
                updated_at = NOW()
            ",
        )
        .bind(&config.code)
        .bind(&config.display_name)
        .bind(&config.client_id)
        .bind(config.client_secret.secret())
        .bind(&config.callback_url)
        .bind(config.enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(FromRow)]
struct ProviderConfigRow {
    code: String,
    display_name: String,
    client_id: String,
    client_secret: String,
    callback_url: String,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProviderConfigRow> for ProviderConfig {
    fn from(row: ProviderConfigRow) -> Self {
        Self {
            code: row.code,
            display_name: row.display_name,
            client_id: row.client_id,
            client_secret: ClientSecret::new(row.client_secret),
            callback_url: row.callback_url,
            enabled: row.enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
