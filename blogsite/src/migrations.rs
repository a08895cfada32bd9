use anyhow::Result;
use sqlx::PgPool;
use tracing::{error, info};

/// Apply pending schema migrations from `migrations/`
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    let migrator = sqlx::migrate!("../migrations");
    let pending = pending_count(pool, &migrator).await;
    if pending == 0 {
        info!("Database schema is up to date");
        return Ok(());
    }

    migrator.run(pool).await.map_err(|e| {
        error!("Failed to run migrations: {}", e);
        anyhow::anyhow!("Migration failed: {e}")
    })?;

    info!(applied = pending, "Migrations completed");
    Ok(())
}

/// Migrations the `_sqlx_migrations` table does not list yet
async fn pending_count(pool: &PgPool, migrator: &sqlx::migrate::Migrator) -> usize {
    let applied: Vec<(i64,)> = match sqlx::query_as("SELECT version FROM _sqlx_migrations ORDER BY version")
        .fetch_all(pool)
        .await
    {
        Ok(rows) => rows,
        // table does not exist before the first run
        Err(_) => return migrator.migrations.len(),
    };

    let applied: std::collections::HashSet<i64> = applied.into_iter().map(|(v,)| v).collect();
    migrator
        .migrations
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .count()
}
