use crate::common::models::User;
use crate::server::database::Database;
use crate::server::error::{ServiceError, ServiceResult};
use log::info;
use sqlx::Row;

/// Mirrors a verified identity into the store. Safe to repeat on every
/// sign-in: an existing row for the same id gets its email and display name
/// refreshed while `created_at` is preserved.
pub async fn register_user(
    db: &Database,
    user_id: &str,
    email: &str,
    display_name: &str,
) -> ServiceResult<User> {
    let user_id = user_id.trim();
    let email = email.trim().to_lowercase();
    let display_name = display_name.trim();
    if user_id.is_empty() {
        return Err(ServiceError::invalid("User id must not be empty"));
    }
    if email.is_empty() {
        return Err(ServiceError::invalid("Email must not be empty"));
    }

    // The email may already belong to this id (re-registration), never to
    // another one.
    if let Some(existing) = find_user_by_email(db, &email).await? {
        if existing.id != user_id {
            return Err(ServiceError::already_exists(format!(
                "Email {} is already registered",
                email
            )));
        }
    }

    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        "INSERT INTO users (id, email, display_name, created_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET email = excluded.email, display_name = excluded.display_name",
    )
    .bind(user_id)
    .bind(&email)
    .bind(display_name)
    .bind(now)
    .execute(&db.pool)
    .await?;

    info!("[USERS] Registered profile {} ({})", user_id, email);
    get_user_profile(db, user_id).await
}

pub async fn get_user_profile(db: &Database, user_id: &str) -> ServiceResult<User> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(ServiceError::invalid("User id must not be empty"));
    }
    match fetch_user(db, user_id).await? {
        Some(user) => Ok(user),
        None => Err(ServiceError::not_found(format!("User {} not found", user_id))),
    }
}

pub async fn update_display_name(
    db: &Database,
    user_id: &str,
    display_name: &str,
) -> ServiceResult<User> {
    let user_id = user_id.trim();
    let display_name = display_name.trim();
    if user_id.is_empty() {
        return Err(ServiceError::invalid("User id must not be empty"));
    }
    if display_name.is_empty() {
        return Err(ServiceError::invalid("Display name must not be empty"));
    }

    let res = sqlx::query("UPDATE users SET display_name = ? WHERE id = ?")
        .bind(display_name)
        .bind(user_id)
        .execute(&db.pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(ServiceError::not_found(format!("User {} not found", user_id)));
    }

    info!("[USERS] Display name updated for {}", user_id);
    get_user_profile(db, user_id).await
}

/// Email lookup used when inviting collaborators. Emails are stored
/// trimmed and lowercased, so the probe is normalized the same way.
pub async fn find_user_by_email(db: &Database, email: &str) -> ServiceResult<Option<User>> {
    let email = email.trim().to_lowercase();
    let row = sqlx::query("SELECT id, email, display_name, created_at FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&db.pool)
        .await?;
    match row {
        Some(row) => Ok(Some(user_from_row(&row)?)),
        None => Ok(None),
    }
}

pub(crate) async fn fetch_user(db: &Database, user_id: &str) -> ServiceResult<Option<User>> {
    let row = sqlx::query("SELECT id, email, display_name, created_at FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&db.pool)
        .await?;
    match row {
        Some(row) => Ok(Some(user_from_row(&row)?)),
        None => Ok(None),
    }
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> ServiceResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        created_at: row.try_get("created_at")?,
    })
}
