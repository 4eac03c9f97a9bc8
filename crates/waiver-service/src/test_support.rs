//! Test harness utilities for integration & unit tests.
//! Centralizes pool initialization, migrations and table cleanup. Tests that
//! need Postgres skip themselves when DATABASE_URL is not set.
use crate::AppState;
use sqlx::{Pool, Postgres};

/// Shared test pool, or None when DATABASE_URL is not set.
pub async fn test_pool() -> Option<Pool<Postgres>> {
    let url = std::env::var("DATABASE_URL").ok()?;
    use tokio::sync::OnceCell;
    static POOL: OnceCell<Pool<Postgres>> = OnceCell::const_new();
    Some(
        POOL.get_or_init(|| async {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(std::time::Duration::from_secs(8))
                .connect(&url)
                .await
                .expect("db connect");
            sqlx::migrate!().run(&pool).await.expect("migrations");
            pool
        })
        .await
        .clone(),
    )
}

/// Fresh `AppState` for a test: in-process collaborator backends, mutable
/// tables cleaned. None when DATABASE_URL is not set.
pub async fn test_state() -> Option<AppState> {
    std::env::set_var("WAIVER_STORAGE_MODE", "memory");
    std::env::set_var("WAIVER_EMAIL_MODE", "mock");
    std::env::set_var("WAIVER_RENDER_MODE", "html");
    let pool = test_pool().await?;
    let _ = sqlx::query("DELETE FROM submission_events").execute(&pool).await;
    let _ = sqlx::query("DELETE FROM documents").execute(&pool).await;
    let _ = sqlx::query("DELETE FROM submissions").execute(&pool).await;
    Some(AppState { db: pool })
}
