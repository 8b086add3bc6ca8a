use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;

/// Schema statements, applied in order on every open.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        session_id      INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        user_id         TEXT NOT NULL,
        additional_meta TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_messages (
        message_id   INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id   INTEGER NOT NULL REFERENCES sessions(session_id),
        message_text TEXT NOT NULL CHECK (length(message_text) > 0),
        sent_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bot_responses (
        response_id     INTEGER PRIMARY KEY AUTOINCREMENT,
        message_id      INTEGER NOT NULL REFERENCES user_messages(message_id),
        response_text   TEXT NOT NULL,
        trigger_name    TEXT NOT NULL DEFAULT 'model_response',
        trigger_details TEXT,
        sent_at         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_user_messages_session ON user_messages(session_id)",
    "CREATE INDEX IF NOT EXISTS idx_bot_responses_message ON bot_responses(message_id)",
    "CREATE INDEX IF NOT EXISTS idx_bot_responses_trigger ON bot_responses(trigger_name)",
];

/// Open (creating if missing) the chat log at `path`.
///
/// The pool holds a single connection: SQLite does not tolerate unsynchronized
/// concurrent writers, so every caller queues on that connection.
pub async fn create_pool(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true);

    single_connection_pool(options).await
}

/// Private in-memory database with the same settings.
pub async fn create_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    single_connection_pool(options).await
}

async fn single_connection_pool(options: SqliteConnectOptions) -> Result<SqlitePool, sqlx::Error> {
    // An in-memory database lives exactly as long as its connection.
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

/// Create tables and indexes if absent. Safe to run against an existing log.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn health_check(pool: &SqlitePool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT sqlite_version()").fetch_one(pool).await?;
    Ok(row.0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn count_objects(pool: &SqlitePool, kind: &str) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name NOT LIKE 'sqlite_%'",
        )
        .bind(kind)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_schema_creates_three_tables_and_four_indexes() {
        let pool = create_memory_pool().await.unwrap();
        init_schema(&pool).await.unwrap();

        assert_eq!(count_objects(&pool, "table").await, 3);
        assert_eq!(count_objects(&pool, "index").await, 4);
    }

    #[tokio::test]
    async fn test_init_schema_twice_is_a_no_op() {
        let pool = create_memory_pool().await.unwrap();
        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();

        assert_eq!(count_objects(&pool, "table").await, 3);
        assert_eq!(count_objects(&pool, "index").await, 4);
    }

    #[tokio::test]
    async fn test_foreign_keys_are_enforced() {
        let pool = create_memory_pool().await.unwrap();
        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn test_health_check_reports_version() {
        let pool = create_memory_pool().await.unwrap();
        let version = health_check(&pool).await.unwrap();
        assert!(version.starts_with('3'), "unexpected version: {version}");
    }
}
