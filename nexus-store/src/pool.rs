//! Postgres connection pool bootstrap and migration runner.

use sqlx::postgres::{PgPool, PgPoolOptions};

pub const MIGRATIONS: &[(&str, &str)] = &[("0001_init", include_str!("../migrations/0001_init.sql"))];

/// Connects to Postgres and applies migrations (spec §5: migrations must be
/// applied before serving).
pub async fn connect_and_migrate(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new().max_connections(20).connect(database_url).await?;
    apply_migrations(&pool).await?;
    Ok(pool)
}

async fn apply_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "create table if not exists _nexus_migrations (name text primary key, applied_at timestamptz not null default now())",
    )
    .execute(pool)
    .await?;

    for (name, sql) in MIGRATIONS {
        let applied: Option<(String,)> =
            sqlx::query_as("select name from _nexus_migrations where name = $1")
                .bind(name)
                .fetch_optional(pool)
                .await?;
        if applied.is_some() {
            continue;
        }
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql).execute(&mut *tx).await?;
        sqlx::query("insert into _nexus_migrations(name) values ($1)").bind(name).execute(&mut *tx).await?;
        tx.commit().await?;
        tracing::info!(migration = name, "applied migration");
    }
    Ok(())
}
