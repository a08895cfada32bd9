//! Account repository (Postgres)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, info};

use super::{AccountStore, MAX_RESOLVE_ATTEMPTS};
use crate::models::{Account, AccountId, AccountRequest};
use crate::service::email::mask_email;
use crate::{Error, Result};

const ACCOUNT_COLUMNS: &str = "id, username, email, is_active, source, created_at, updated_at";

#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn username_taken(tx: &mut Transaction<'_, Postgres>, username: &str) -> Result<bool> {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM accounts WHERE username = $1)")
            .bind(username)
            .fetch_one(&mut **tx)
            .await?;
        Ok(taken)
    }

    async fn choose_username(tx: &mut Transaction<'_, Postgres>, request: &AccountRequest) -> Result<String> {
        for candidate in request.username_candidates() {
            if !candidate.is_empty() && !Self::username_taken(tx, candidate).await? {
                return Ok(candidate.to_string());
            }
        }
        Ok(request.suffixed_fallback())
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn resolve_or_create(&self, request: &AccountRequest) -> Result<Account> {
        for attempt in 1..=MAX_RESOLVE_ATTEMPTS {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
                .execute(&mut *tx)
                .await?;

            let existing = sqlx::query_as::<_, AccountRow>(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"
            ))
            .bind(&request.email)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = existing {
                tx.commit().await?;
                return Ok(row.into());
            }

            let username = Self::choose_username(&mut tx, request).await?;

            // Conflicts on email or username both mean another writer got there first
            let inserted = sqlx::query_as::<_, AccountRow>(&format!(
                r"
                INSERT INTO accounts (id, username, email, is_active, source, created_at, updated_at)
                VALUES ($1, $2, $3, TRUE, $4, NOW(), NOW())
                ON CONFLICT DO NOTHING
                RETURNING {ACCOUNT_COLUMNS}
                "
            ))
            .bind(AccountId::new())
            .bind(&username)
            .bind(&request.email)
            .bind(&request.source)
            .fetch_optional(&mut *tx)
            .await?;

            match inserted {
                Some(row) => {
                    tx.commit().await?;
                    info!(
                        account_id = %row.id,
                        username = %row.username,
                        email = %mask_email(&row.email),
                        source = %row.source,
                        "Account created"
                    );
                    return Ok(row.into());
                }
                None => {
                    tx.rollback().await?;
                    debug!(attempt, email = %mask_email(&request.email), "Account insert conflicted, re-reading");
                }
            }
        }

        Err(Error::DuplicateAccountRace)
    }
}

#[derive(FromRow)]
struct AccountRow {
    id: String,
    username: String,
    email: String,
    is_active: bool,
    source: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: AccountId(row.id),
            username: row.username,
            email: row.email,
            is_active: row.is_active,
            source: row.source,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::USERNAME_MAX_CHARS;
    use crate::repository::test_db::{self, unique};

    fn request(email: &str, name: &str) -> AccountRequest {
        AccountRequest::for_provider(email, name, format!("{name}_placeholder"), "github")
    }

    async fn rows_with_email(pool: &PgPool, email: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE email = $1")
            .bind(email)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "Requires database"]
    async fn test_concurrent_resolve_same_email_creates_one_account() {
        let pool = test_db::pool().await;
        let store = PgAccountStore::new(pool.clone());
        let email = format!("{}@race.test", unique("ann"));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let request = request(&email, &unique("Ann"));
                tokio::spawn(async move { store.resolve_or_create(&request).await })
            })
            .collect();

        let mut ids = Vec::new();
        for result in futures::future::join_all(tasks).await {
            ids.push(result.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(rows_with_email(&pool, &email).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "Requires database"]
    async fn test_concurrent_username_conflict_retries_with_placeholder() {
        let pool = test_db::pool().await;
        let store = PgAccountStore::new(pool);
        let name = unique("Bob");

        let tasks: Vec<_> = ["one", "two"]
            .into_iter()
            .map(|tag| {
                let store = store.clone();
                let request = request(&format!("{}@{tag}.test", unique("bob")), &name);
                tokio::spawn(async move { store.resolve_or_create(&request).await })
            })
            .collect();

        let mut usernames = Vec::new();
        for result in futures::future::join_all(tasks).await {
            usernames.push(result.unwrap().unwrap().username);
        }
        usernames.sort();
        assert_eq!(usernames, vec![name.clone(), format!("{name}_placeholder")]);
    }

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_taken_usernames_fall_back_in_order() {
        let pool = test_db::pool().await;
        let store = PgAccountStore::new(pool);
        let name = unique("Carol");

        let first = store
            .resolve_or_create(&request(&format!("{}@x.test", unique("c")), &name))
            .await
            .unwrap();
        assert_eq!(first.username, name);

        let second = store
            .resolve_or_create(&request(&format!("{}@x.test", unique("c")), &name))
            .await
            .unwrap();
        assert_eq!(second.username, format!("{name}_placeholder"));

        let third = store
            .resolve_or_create(&request(&format!("{}@x.test", unique("c")), &name))
            .await
            .unwrap();
        assert!(third.username.starts_with(&format!("{name}_placeholder_")));
        assert_eq!(store.find_by_id(&third.id).await.unwrap().unwrap().email, third.email);
    }

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_long_provider_name_fits_the_column() {
        let pool = test_db::pool().await;
        let store = PgAccountStore::new(pool);
        let name = format!("{}{}", unique("D"), "名".repeat(300));

        let account = store
            .resolve_or_create(&request(&format!("{}@x.test", unique("d")), &name))
            .await
            .unwrap();
        assert_eq!(account.username.chars().count(), USERNAME_MAX_CHARS);
    }

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_existing_email_is_returned_unchanged() {
        let pool = test_db::pool().await;
        let store = PgAccountStore::new(pool.clone());
        let email = format!("{}@x.test", unique("e"));

        let created = store.resolve_or_create(&request(&email, &unique("Eve"))).await.unwrap();
        let again = store.resolve_or_create(&request(&email, &unique("Other"))).await.unwrap();
        assert_eq!(again.id, created.id);
        assert_eq!(again.username, created.username);
        assert_eq!(rows_with_email(&pool, &email).await, 1);
    }
}
