use crate::common::models::{Collaborator, Message, Notification, NotificationKind, Project, ProjectStats, Task};
use crate::server::database::Database;
use crate::server::error::{ServiceError, ServiceResult};
use log::{debug, info};
use sqlx::Row;
use std::collections::HashSet;

const NOTIFICATION_COLUMNS: &str = "id, kind, user_id, recipients, project_id, project_name, \
                                    task_id, task_name, message_id, sender_id, read, created_at";

// ---------------------------------------------------------------------------
// Consistency maintenance
// ---------------------------------------------------------------------------

/// Recomputes a project's aggregate counters from its live tasks and writes
/// them back. The recount is idempotent: replaying it after any task
/// mutation converges on the same numbers.
pub async fn recompute_project_stats(db: &Database, project_id: &str) -> ServiceResult<ProjectStats> {
    let rows = sqlx::query("SELECT priority, due_date, completed FROM tasks WHERE project_id = ?")
        .bind(project_id)
        .fetch_all(&db.pool)
        .await?;

    let today = chrono::Utc::now().date_naive();
    let mut stats = ProjectStats::default();
    for row in &rows {
        stats.total_tasks += 1;
        let completed: bool = row.try_get("completed")?;
        if completed {
            stats.completed_tasks += 1;
        }
        let priority: String = row.try_get("priority")?;
        if priority == "high" {
            stats.high_priority_tasks += 1;
        }
        let due: Option<String> = row.try_get("due_date")?;
        if let Some(raw) = due {
            if let Ok(date) = chrono::NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                if date < today && !completed {
                    stats.overdue_tasks += 1;
                }
            }
        }
    }

    let raw = serde_json::to_string(&stats)?;
    let now = chrono::Utc::now().timestamp();
    let res = sqlx::query("UPDATE projects SET stats = ?, updated_at = ? WHERE id = ?")
        .bind(&raw)
        .bind(now)
        .bind(project_id)
        .execute(&db.pool)
        .await?;
    if res.rows_affected() == 0 {
        // The project was deleted while its tasks were mutating; there is
        // nothing left to maintain.
        debug!("[NOTIFY] Skipped stats write for vanished project {}", project_id);
    }
    Ok(stats)
}

/// Side effects of one observed pending -> completed flip: refresh the
/// aggregates and tell the completing user. Callers detect the flip; this
/// only records it.
pub async fn task_completed(db: &Database, task: &Task) -> ServiceResult<()> {
    recompute_project_stats(db, &task.project_id).await?;

    let recipient = task
        .completed_by
        .clone()
        .unwrap_or_else(|| task.created_by.clone());
    let mut n = Notification::new(NotificationKind::TaskCompleted);
    n.user_id = Some(recipient.clone());
    n.project_id = Some(task.project_id.clone());
    n.task_id = Some(task.id.clone());
    n.task_name = Some(task.name.clone());
    insert_notification(db, &n).await?;

    info!("[NOTIFY] TASK_COMPLETED {} for user {}", task.id, recipient);
    Ok(())
}

/// One ADDED_TO_PROJECT notification per user present in the new roster but
/// not the old one, diffed by user id so legacy and object entries compare
/// the same.
pub async fn collaborators_added(
    db: &Database,
    project_id: &str,
    project_name: &str,
    old_roster: &[Collaborator],
    new_roster: &[Collaborator],
) -> ServiceResult<()> {
    let known: HashSet<&str> = old_roster.iter().map(|c| c.user_id.as_str()).collect();
    for collab in new_roster {
        if known.contains(collab.user_id.as_str()) {
            continue;
        }
        let mut n = Notification::new(NotificationKind::AddedToProject);
        n.user_id = Some(collab.user_id.clone());
        n.project_id = Some(project_id.to_string());
        n.project_name = Some(project_name.to_string());
        insert_notification(db, &n).await?;
        info!("[NOTIFY] ADDED_TO_PROJECT {} for user {}", project_id, collab.user_id);
    }
    Ok(())
}

pub async fn project_created(db: &Database, project: &Project) -> ServiceResult<()> {
    let mut n = Notification::new(NotificationKind::NewProject);
    n.project_id = Some(project.id.clone());
    n.project_name = Some(project.name.clone());
    n.recipients = project.collaborators.iter().map(|c| c.user_id.clone()).collect();
    insert_notification(db, &n).await
}

pub async fn task_created(db: &Database, task: &Task) -> ServiceResult<()> {
    let mut n = Notification::new(NotificationKind::NewTask);
    n.project_id = Some(task.project_id.clone());
    n.task_id = Some(task.id.clone());
    n.task_name = Some(task.name.clone());
    insert_notification(db, &n).await
}

pub async fn message_created(db: &Database, message: &Message) -> ServiceResult<()> {
    let mut n = Notification::new(NotificationKind::NewMessage);
    n.project_id = Some(message.project_id.clone());
    n.message_id = Some(message.id.clone());
    n.sender_id = Some(message.user_id.clone());
    insert_notification(db, &n).await
}

/// Mirrors a refreshed project `updated_at` onto all of the project's
/// tasks. Invoked from project metadata updates only, never from the task
/// side, so the mirror cannot feed back into itself.
pub async fn project_timestamp_changed(db: &Database, project_id: &str, updated_at: i64) -> ServiceResult<()> {
    let res = sqlx::query("UPDATE tasks SET project_updated_at = ? WHERE project_id = ?")
        .bind(updated_at)
        .bind(project_id)
        .execute(&db.pool)
        .await?;
    debug!(
        "[NOTIFY] Mirrored timestamp of project {} onto {} tasks",
        project_id,
        res.rows_affected()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Read side
// ---------------------------------------------------------------------------

/// Notifications addressed to the user, newest first. A notification
/// matches either through its single `user_id` or through membership in
/// its `recipients` list.
pub async fn list_notifications(db: &Database, user_id: &str) -> ServiceResult<Vec<Notification>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM notifications ORDER BY created_at DESC",
        NOTIFICATION_COLUMNS
    ))
    .fetch_all(&db.pool)
    .await?;

    let mut out = Vec::new();
    for row in &rows {
        let n = notification_from_row(row)?;
        if addressed_to(&n, user_id) {
            out.push(n);
        }
    }
    Ok(out)
}

/// Idempotent: marking an already read notification is a no-op success.
pub async fn mark_notification_read(db: &Database, notification_id: &str, user_id: &str) -> ServiceResult<()> {
    let n = require_notification(db, notification_id).await?;
    if !addressed_to(&n, user_id) {
        return Err(ServiceError::denied("This notification is not addressed to you"));
    }
    sqlx::query("UPDATE notifications SET read = 1 WHERE id = ?")
        .bind(notification_id)
        .execute(&db.pool)
        .await?;
    Ok(())
}

pub async fn delete_notification(db: &Database, notification_id: &str, user_id: &str) -> ServiceResult<()> {
    let n = require_notification(db, notification_id).await?;
    if !addressed_to(&n, user_id) {
        return Err(ServiceError::denied("This notification is not addressed to you"));
    }
    sqlx::query("DELETE FROM notifications WHERE id = ?")
        .bind(notification_id)
        .execute(&db.pool)
        .await?;
    info!("[NOTIFY] Notification {} deleted by {}", notification_id, user_id);
    Ok(())
}

fn addressed_to(n: &Notification, user_id: &str) -> bool {
    n.user_id.as_deref() == Some(user_id) || n.recipients.iter().any(|r| r == user_id)
}

async fn insert_notification(db: &Database, n: &Notification) -> ServiceResult<()> {
    let recipients = if n.recipients.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&n.recipients)?)
    };
    sqlx::query(
        "INSERT INTO notifications (id, kind, user_id, recipients, project_id, project_name, task_id, task_name, message_id, sender_id, read, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&n.id)
    .bind(n.kind.as_str())
    .bind(&n.user_id)
    .bind(&recipients)
    .bind(&n.project_id)
    .bind(&n.project_name)
    .bind(&n.task_id)
    .bind(&n.task_name)
    .bind(&n.message_id)
    .bind(&n.sender_id)
    .bind(n.read)
    .bind(n.created_at)
    .execute(&db.pool)
    .await?;
    Ok(())
}

async fn require_notification(db: &Database, notification_id: &str) -> ServiceResult<Notification> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM notifications WHERE id = ?",
        NOTIFICATION_COLUMNS
    ))
    .bind(notification_id)
    .fetch_optional(&db.pool)
    .await?;
    match row {
        Some(row) => notification_from_row(&row),
        None => Err(ServiceError::not_found(format!(
            "Notification {} not found",
            notification_id
        ))),
    }
}

fn notification_from_row(row: &sqlx::sqlite::SqliteRow) -> ServiceResult<Notification> {
    let kind_raw: String = row.try_get("kind")?;
    let kind = NotificationKind::parse(&kind_raw)
        .ok_or_else(|| ServiceError::internal(format!("unknown notification kind '{}'", kind_raw)))?;
    let recipients_raw: Option<String> = row.try_get("recipients")?;
    let recipients = match recipients_raw {
        Some(raw) => serde_json::from_str(&raw)?,
        None => Vec::new(),
    };

    Ok(Notification {
        id: row.try_get("id")?,
        kind,
        user_id: row.try_get("user_id")?,
        recipients,
        project_id: row.try_get("project_id")?,
        project_name: row.try_get("project_name")?,
        task_id: row.try_get("task_id")?,
        task_name: row.try_get("task_name")?,
        message_id: row.try_get("message_id")?,
        sender_id: row.try_get("sender_id")?,
        read: row.try_get("read")?,
        created_at: row.try_get("created_at")?,
    })
}
