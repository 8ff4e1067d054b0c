use log::{debug, info};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

/// Shared handle to the SQLite store. Cheap to clone, safe to share
/// between connection handlers.
#[derive(Debug, Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        info!("[DB] Connecting to {}", database_url);

        // Strip the scheme and query string to locate the on-disk file, so
        // its parent directory can be created before SQLite opens it.
        let file_path = if let Some(rest) = database_url.strip_prefix("sqlite://") {
            rest.split('?').next().unwrap_or(rest)
        } else if let Some(rest) = database_url.strip_prefix("sqlite:") {
            rest.split('?').next().unwrap_or(rest)
        } else {
            database_url
        };

        if let Some(parent) = std::path::Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("[DB] Creating database directory {:?}", parent);
                std::fs::create_dir_all(parent)
                    .map_err(|e| sqlx::Error::Configuration(Box::new(e)))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        info!("[DB] Connection pool ready");
        Ok(Self { pool })
    }

    /// Creates every table the services rely on. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        // Registered user profiles, looked up by id or by unique email
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Projects; collaborators and stats are JSON columns
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                visibility TEXT NOT NULL DEFAULT 'private',
                owner_id TEXT NOT NULL,
                collaborators TEXT NOT NULL DEFAULT '[]',
                stats TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Tasks; subtasks is a JSON column, due_date a date-only string
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                priority TEXT NOT NULL DEFAULT 'medium',
                due_date TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                completed_by TEXT,
                subtasks TEXT NOT NULL DEFAULT '[]',
                created_by TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                project_updated_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Per-project chat messages
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Notifications; recipients is a JSON column, null when addressed
        // to a single user
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                user_id TEXT,
                recipients TEXT,
                project_id TEXT,
                project_name TEXT,
                task_id TEXT,
                task_name TEXT,
                message_id TEXT,
                sender_id TEXT,
                read INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("[DB] Migrations complete");
        Ok(())
    }
}
