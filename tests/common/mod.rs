use cantiere::common::models::User;
use cantiere::server::database::Database;
use cantiere::server::users;
use tempfile::TempDir;

/// Throwaway file-backed database. A file is used instead of `:memory:`
/// because every pooled connection to an in-memory SQLite gets its own
/// empty store.
pub struct TestDb {
    pub db: Database,
    _dir: TempDir,
}

pub async fn setup() -> TestDb {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("cantiere_test.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let db = Database::connect(&url).await.expect("connect test database");
    db.migrate().await.expect("run migrations");
    TestDb { db, _dir: dir }
}

pub async fn register(db: &Database, id: &str, email: &str, name: &str) -> User {
    users::register_user(db, id, email, name)
        .await
        .expect("register user")
}
