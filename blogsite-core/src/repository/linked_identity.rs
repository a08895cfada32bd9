//! Linked identity repository (Postgres)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oauth2::{AccessToken, RefreshToken};
use sqlx::{FromRow, PgPool};

use super::LinkedIdentityStore;
use crate::models::{AccountId, LinkedIdentity, LinkedIdentityId};
use crate::oauth2::ExternalIdentity;
use crate::{Error, Result};

const COLUMNS: &str = "id, provider_code, external_id, display_name, avatar_url, email, \
                       access_token, refresh_token, raw_profile, linked_account_id, created_at, updated_at";

/// Stores one row per `(provider_code, external_id)`
#[derive(Clone)]
pub struct PgLinkedIdentityStore {
    pool: PgPool,
}

impl PgLinkedIdentityStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkedIdentityStore for PgLinkedIdentityStore {
    async fn upsert(&self, identity: &ExternalIdentity) -> Result<LinkedIdentity> {
        let row = sqlx::query_as::<_, LinkedIdentityRow>(&format!(
            r"
            INSERT INTO linked_identities
                (id, provider_code, external_id, display_name, avatar_url, email,
                 access_token, refresh_token, raw_profile, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (provider_code, external_id)
            DO UPDATE SET
                display_name = EXCLUDED.display_name,
                avatar_url = EXCLUDED.avatar_url,
                email = COALESCE(EXCLUDED.email, linked_identities.email),
                access_token = EXCLUDED.access_token,
                refresh_token = COALESCE(EXCLUDED.refresh_token, linked_identities.refresh_token),
                raw_profile = EXCLUDED.raw_profile,
                updated_at = NOW()
            RETURNING {COLUMNS}
            "
        ))
        .bind(LinkedIdentityId::new())
        .bind(&identity.provider_code)
        .bind(&identity.external_id)
        .bind(&identity.display_name)
        .bind(&identity.avatar_url)
        .bind(&identity.email)
        .bind(identity.access_token.secret())
        .bind(identity.refresh_token.as_ref().map(|t| t.secret().as_str()))
        .bind(&identity.raw_profile)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: &LinkedIdentityId) -> Result<Option<LinkedIdentity>> {
        let row = sqlx::query_as::<_, LinkedIdentityRow>(&format!(
            "SELECT {COLUMNS} FROM linked_identities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn claim_email(&self, id: &LinkedIdentityId, email: &str) -> Result<Option<LinkedIdentity>> {
        let row = sqlx::query_as::<_, LinkedIdentityRow>(&format!(
            r"
            UPDATE linked_identities
            SET email = $2, updated_at = NOW()
            WHERE id = $1
              AND linked_account_id IS NULL
              AND (email IS NULL OR email = $2)
            RETURNING {COLUMNS}
            "
        ))
        .bind(id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn link_account(&self, id: &LinkedIdentityId, account_id: &AccountId) -> Result<LinkedIdentity> {
        let row = sqlx::query_as::<_, LinkedIdentityRow>(&format!(
            r"
            UPDATE linked_identities
            SET linked_account_id = COALESCE(linked_account_id, $2), updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "
        ))
        .bind(id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Into::into)
            .ok_or_else(|| Error::NotFound(format!("Linked identity {id} not found")))
    }
}

#[derive(FromRow)]
struct LinkedIdentityRow {
    id: String,
    provider_code: String,
    external_id: String,
    display_name: String,
    avatar_url: String,
    email: Option<String>,
    access_token: String,
    refresh_token: Option<String>,
    raw_profile: String,
    linked_account_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LinkedIdentityRow> for LinkedIdentity {
    fn from(row: LinkedIdentityRow) -> Self {
        Self {
            id: LinkedIdentityId(row.id),
            provider_code: row.provider_code,
            external_id: row.external_id,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            email: row.email,
            access_token: AccessToken::new(row.access_token),
            refresh_token: row.refresh_token.map(RefreshToken::new),
            raw_profile: row.raw_profile,
            linked_account_id: row.linked_account_id.map(AccountId),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
