use crate::common::models::Message;
use crate::server::access;
use crate::server::database::Database;
use crate::server::error::{ServiceError, ServiceResult};
use crate::server::{notifications, projects};
use log::info;
use sqlx::Row;

/// Posting requires edit access; public visibility alone is not enough to
/// write into a project's board. Does not bump the project's `updated_at`.
pub async fn post_message(db: &Database, project_id: &str, user_id: &str, text: &str) -> ServiceResult<Message> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ServiceError::invalid("Message text must not be empty"));
    }
    let project = projects::require_project(db, project_id).await?;
    let access = access::evaluate(Some(&project), user_id);
    if !access.can_edit {
        return Err(ServiceError::denied(
            "Only the owner or a collaborator can post messages",
        ));
    }

    let message = Message {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        user_id: user_id.to_string(),
        text: text.to_string(),
        created_at: chrono::Utc::now().timestamp(),
    };
    sqlx::query("INSERT INTO messages (id, project_id, user_id, text, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&message.id)
        .bind(&message.project_id)
        .bind(&message.user_id)
        .bind(&message.text)
        .bind(message.created_at)
        .execute(&db.pool)
        .await?;

    notifications::message_created(db, &message).await?;
    info!("[MSG] Message {} posted to project {} by {}", message.id, project_id, user_id);
    Ok(message)
}

/// Board history, newest first. View access is enough to read.
pub async fn list_messages(db: &Database, project_id: &str, user_id: &str) -> ServiceResult<Vec<Message>> {
    let project = projects::require_project(db, project_id).await?;
    let access = access::evaluate(Some(&project), user_id);
    if !access.can_view {
        return Err(ServiceError::denied("You do not have access to this project"));
    }

    let rows = sqlx::query(
        "SELECT id, project_id, user_id, text, created_at FROM messages WHERE project_id = ? ORDER BY created_at DESC",
    )
    .bind(project_id)
    .fetch_all(&db.pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Message {
                id: row.try_get("id")?,
                project_id: row.try_get("project_id")?,
                user_id: row.try_get("user_id")?,
                text: row.try_get("text")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}
