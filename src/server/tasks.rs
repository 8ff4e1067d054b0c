use crate::common::models::{Priority, Subtask, Task, TaskView};
use crate::server::access;
use crate::server::database::Database;
use crate::server::error::{ServiceError, ServiceResult};
use crate::server::{notifications, projects};
use chrono::NaiveDate;
use log::info;
use serde_json::Value;
use sqlx::Row;

const TASK_COLUMNS: &str = "id, project_id, name, description, priority, due_date, completed, \
                            completed_by, subtasks, created_by, created_at, updated_at, project_updated_at";

pub async fn create_task(
    db: &Database,
    project_id: &str,
    name: &str,
    description: &str,
    priority: Option<Priority>,
    due_date: Option<&str>,
    user_id: &str,
) -> ServiceResult<Task> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::invalid("Task name must not be empty"));
    }
    let project = projects::require_project(db, project_id).await?;
    let access = access::evaluate(Some(&project), user_id);
    if !access.can_edit {
        return Err(ServiceError::denied(
            "Only the owner or a collaborator can create tasks",
        ));
    }

    let due = match due_date {
        Some(raw) if !raw.trim().is_empty() => Some(parse_due_date(raw)?),
        _ => None,
    };
    let priority = priority.unwrap_or_default();
    let task_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO tasks (id, project_id, name, description, priority, due_date, completed, subtasks, created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, 0, '[]', ?, ?, ?)",
    )
    .bind(&task_id)
    .bind(project_id)
    .bind(name)
    .bind(description.trim())
    .bind(priority.as_str())
    .bind(due.map(|d| d.to_string()))
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(&db.pool)
    .await?;

    projects::touch_project(db, project_id, now).await?;
    let task = require_task(db, &task_id).await?;
    notifications::recompute_project_stats(db, project_id).await?;
    notifications::task_created(db, &task).await?;

    info!("[TASKS] Task '{}' ({}) created in project {} by {}", name, task_id, project_id, user_id);
    Ok(task)
}

/// One task plus the caller's edit rights, gated on view access to the
/// parent project.
pub async fn get_task_details(db: &Database, task_id: &str, user_id: &str) -> ServiceResult<TaskView> {
    let task = require_task(db, task_id).await?;
    let project = projects::require_project(db, &task.project_id).await?;
    let access = access::evaluate(Some(&project), user_id);
    if !access.can_view {
        return Err(ServiceError::denied("You do not have access to this task"));
    }
    Ok(TaskView {
        task,
        can_edit: access.can_edit,
    })
}

pub async fn list_project_tasks(db: &Database, project_id: &str, user_id: &str) -> ServiceResult<Vec<Task>> {
    let project = projects::require_project(db, project_id).await?;
    let access = access::evaluate(Some(&project), user_id);
    if !access.can_view {
        return Err(ServiceError::denied("You do not have access to this project"));
    }

    let rows = sqlx::query(&format!(
        "SELECT {} FROM tasks WHERE project_id = ? ORDER BY created_at DESC",
        TASK_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(&db.pool)
    .await?;
    rows.iter().map(task_from_row).collect()
}

/// Applies a partial update. Recognized fields are `name`, `description`,
/// `priority`, `dueDate` and `completed`; anything else is ignored. The
/// permission check runs here no matter what the caller already verified.
pub async fn update_task(
    db: &Database,
    task_id: &str,
    user_id: &str,
    updates: &serde_json::Map<String, Value>,
) -> ServiceResult<Task> {
    let task = editable_task(db, task_id, user_id).await?;

    let mut name = task.name.clone();
    let mut description = task.description.clone();
    let mut priority = task.priority;
    let mut due_date = task.due_date;
    let mut completed = task.completed;

    for (key, value) in updates {
        match key.as_str() {
            "name" => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| ServiceError::invalid("Field 'name' must be a string"))?;
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(ServiceError::invalid("Task name must not be empty"));
                }
                name = trimmed.to_string();
            }
            "description" => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| ServiceError::invalid("Field 'description' must be a string"))?;
                description = raw.trim().to_string();
            }
            "priority" => {
                let raw = value
                    .as_str()
                    .ok_or_else(|| ServiceError::invalid("Field 'priority' must be a string"))?;
                priority = Priority::parse(raw)
                    .ok_or_else(|| ServiceError::invalid(format!("Unknown priority '{}'", raw)))?;
            }
            "dueDate" => {
                due_date = match value {
                    Value::Null => None,
                    Value::String(raw) if raw.trim().is_empty() => None,
                    Value::String(raw) => Some(parse_due_date(raw)?),
                    _ => {
                        return Err(ServiceError::invalid(
                            "Field 'dueDate' must be a date string or null",
                        ))
                    }
                };
            }
            "completed" => {
                completed = value
                    .as_bool()
                    .ok_or_else(|| ServiceError::invalid("Field 'completed' must be a boolean"))?;
            }
            _ => {}
        }
    }

    // Only a discrete pending -> completed flip counts as completing the
    // task; re-saving an already completed one must not fire again.
    let completing = completed && !task.completed;
    let completed_by = if completing {
        Some(user_id.to_string())
    } else {
        task.completed_by.clone()
    };
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "UPDATE tasks SET name = ?, description = ?, priority = ?, due_date = ?, completed = ?, completed_by = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&name)
    .bind(&description)
    .bind(priority.as_str())
    .bind(due_date.map(|d| d.to_string()))
    .bind(completed)
    .bind(&completed_by)
    .bind(now)
    .bind(task_id)
    .execute(&db.pool)
    .await?;

    projects::touch_project(db, &task.project_id, now).await?;
    let updated = require_task(db, task_id).await?;
    if completing {
        notifications::task_completed(db, &updated).await?;
    } else {
        notifications::recompute_project_stats(db, &task.project_id).await?;
    }

    info!("[TASKS] Task {} updated by {}", task_id, user_id);
    Ok(updated)
}

pub async fn delete_task(db: &Database, task_id: &str, user_id: &str) -> ServiceResult<()> {
    let task = editable_task(db, task_id, user_id).await?;

    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task_id)
        .execute(&db.pool)
        .await?;

    let now = chrono::Utc::now().timestamp();
    projects::touch_project(db, &task.project_id, now).await?;
    notifications::recompute_project_stats(db, &task.project_id).await?;

    info!("[TASKS] Task {} deleted by {}", task_id, user_id);
    Ok(())
}

pub async fn add_subtask(db: &Database, task_id: &str, name: &str, user_id: &str) -> ServiceResult<Task> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::invalid("Subtask name must not be empty"));
    }
    let task = editable_task(db, task_id, user_id).await?;

    let mut subtasks = task.subtasks.clone();
    let now = chrono::Utc::now().timestamp();
    subtasks.push(Subtask {
        name: name.to_string(),
        completed: false,
        created_at: now,
    });
    write_subtasks(db, &task, subtasks, now).await
}

pub async fn toggle_subtask(db: &Database, task_id: &str, index: usize, user_id: &str) -> ServiceResult<Task> {
    let task = editable_task(db, task_id, user_id).await?;

    let mut subtasks = task.subtasks.clone();
    let entry = subtasks
        .get_mut(index)
        .ok_or_else(|| ServiceError::invalid(format!("Subtask index {} is out of range", index)))?;
    entry.completed = !entry.completed;
    let now = chrono::Utc::now().timestamp();
    write_subtasks(db, &task, subtasks, now).await
}

pub async fn remove_subtask(db: &Database, task_id: &str, index: usize, user_id: &str) -> ServiceResult<Task> {
    let task = editable_task(db, task_id, user_id).await?;

    let mut subtasks = task.subtasks.clone();
    if index >= subtasks.len() {
        return Err(ServiceError::invalid(format!("Subtask index {} is out of range", index)));
    }
    subtasks.remove(index);
    let now = chrono::Utc::now().timestamp();
    write_subtasks(db, &task, subtasks, now).await
}

/// Loads a task and verifies the caller may modify its project.
async fn editable_task(db: &Database, task_id: &str, user_id: &str) -> ServiceResult<Task> {
    let task = require_task(db, task_id).await?;
    let project = projects::require_project(db, &task.project_id).await?;
    let access = access::evaluate(Some(&project), user_id);
    if !access.can_edit {
        return Err(ServiceError::denied(
            "Only the owner or a collaborator can modify tasks",
        ));
    }
    Ok(task)
}

async fn write_subtasks(db: &Database, task: &Task, subtasks: Vec<Subtask>, now: i64) -> ServiceResult<Task> {
    let raw = serde_json::to_string(&subtasks)?;
    sqlx::query("UPDATE tasks SET subtasks = ?, updated_at = ? WHERE id = ?")
        .bind(&raw)
        .bind(now)
        .bind(&task.id)
        .execute(&db.pool)
        .await?;

    projects::touch_project(db, &task.project_id, now).await?;
    notifications::recompute_project_stats(db, &task.project_id).await?;
    require_task(db, &task.id).await
}

/// Accepts a date-only string or a full RFC 3339 timestamp, keeping the
/// date part.
fn parse_due_date(raw: &str) -> ServiceResult<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.date_naive());
    }
    Err(ServiceError::invalid(format!("Unrecognized due date '{}'", raw)))
}

pub(crate) async fn require_task(db: &Database, task_id: &str) -> ServiceResult<Task> {
    match fetch_task(db, task_id).await? {
        Some(task) => Ok(task),
        None => Err(ServiceError::not_found(format!("Task {} not found", task_id))),
    }
}

pub(crate) async fn fetch_task(db: &Database, task_id: &str) -> ServiceResult<Option<Task>> {
    let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
        .bind(task_id)
        .fetch_optional(&db.pool)
        .await?;
    match row {
        Some(row) => Ok(Some(task_from_row(&row)?)),
        None => Ok(None),
    }
}

fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> ServiceResult<Task> {
    let priority_raw: String = row.try_get("priority")?;
    let priority = Priority::parse(&priority_raw)
        .ok_or_else(|| ServiceError::internal(format!("unknown priority '{}'", priority_raw)))?;
    let due_raw: Option<String> = row.try_get("due_date")?;
    let due_date = match due_raw {
        Some(raw) => Some(
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|e| ServiceError::internal(format!("bad stored due date '{}': {}", raw, e)))?,
        ),
        None => None,
    };
    let subtasks_raw: String = row.try_get("subtasks")?;
    let subtasks: Vec<Subtask> = serde_json::from_str(&subtasks_raw)?;

    Ok(Task {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        priority,
        due_date,
        completed: row.try_get("completed")?,
        completed_by: row.try_get("completed_by")?,
        subtasks,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        project_updated_at: row.try_get("project_updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::parse_due_date;
    use chrono::NaiveDate;

    #[test]
    fn due_dates_accept_plain_dates_and_timestamps() {
        assert_eq!(
            parse_due_date("2024-03-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        );
        assert_eq!(
            parse_due_date("2024-03-15T09:30:00Z").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        );
        assert!(parse_due_date("15/03/2024").is_err());
        assert!(parse_due_date("soon").is_err());
    }
}
