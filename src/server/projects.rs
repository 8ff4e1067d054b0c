use crate::common::models::{
    Collaborator, CollaboratorProfile, Project, ProjectListing, ProjectLists, ProjectPatch,
    ProjectView, Visibility, DEFAULT_ROLE, OWNER_ROLE,
};
use crate::server::access;
use crate::server::database::Database;
use crate::server::error::{ServiceError, ServiceResult};
use crate::server::{notifications, users};
use log::{info, warn};
use sqlx::Row;

const PROJECT_COLUMNS: &str =
    "id, name, description, visibility, owner_id, collaborators, stats, created_at, updated_at";

pub async fn create_project(
    db: &Database,
    name: &str,
    description: &str,
    visibility: Option<Visibility>,
    owner_id: &str,
) -> ServiceResult<Project> {
    let name = name.trim();
    let owner_id = owner_id.trim();
    if name.is_empty() {
        return Err(ServiceError::invalid("Project name must not be empty"));
    }
    if owner_id.is_empty() {
        return Err(ServiceError::invalid("Owner id must not be empty"));
    }

    let project_id = uuid::Uuid::new_v4().to_string();
    let visibility = visibility.unwrap_or_default();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO projects (id, name, description, visibility, owner_id, collaborators, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, '[]', ?, ?)",
    )
    .bind(&project_id)
    .bind(name)
    .bind(description.trim())
    .bind(visibility.as_str())
    .bind(owner_id)
    .bind(now)
    .bind(now)
    .execute(&db.pool)
    .await?;

    info!("[PROJECTS] Project '{}' ({}) created by {}", name, project_id, owner_id);
    let project = require_project(db, &project_id).await?;
    notifications::project_created(db, &project).await?;
    Ok(project)
}

/// Detail view for one project, gated on view access. The roster is
/// enriched with user profiles; the caller's role and edit rights ride
/// along so clients need no second query.
pub async fn get_project(db: &Database, project_id: &str, user_id: &str) -> ServiceResult<ProjectView> {
    let project = require_project(db, project_id).await?;
    let access = access::evaluate(Some(&project), user_id);
    if !access.can_view {
        return Err(ServiceError::denied("You do not have access to this project"));
    }

    let owner = users::fetch_user(db, &project.owner_id).await?;
    let collaborators_data = enrich_roster(db, &project).await?;
    Ok(ProjectView {
        project,
        owner,
        collaborators_data,
        role: access.role,
        can_edit: access.can_edit,
    })
}

/// Everything the dashboard shows: projects the user owns or works on,
/// plus public projects they merely observe. Both lists come back newest
/// first.
pub async fn list_projects(db: &Database, user_id: &str) -> ServiceResult<ProjectLists> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM projects ORDER BY created_at DESC",
        PROJECT_COLUMNS
    ))
    .fetch_all(&db.pool)
    .await?;

    let mut projects = Vec::new();
    let mut public_projects = Vec::new();
    for row in &rows {
        let project = project_from_row(row)?;
        let access = access::evaluate(Some(&project), user_id);
        if access.is_owner || access.is_collaborator {
            projects.push(ProjectListing {
                is_owner: access.is_owner,
                project,
            });
        } else if project.visibility == Visibility::Public {
            public_projects.push(project);
        }
    }

    Ok(ProjectLists {
        projects,
        public_projects,
    })
}

pub async fn update_project(
    db: &Database,
    project_id: &str,
    user_id: &str,
    patch: ProjectPatch,
) -> ServiceResult<Project> {
    let project = require_project(db, project_id).await?;
    let access = access::evaluate(Some(&project), user_id);
    if !access.can_edit {
        return Err(ServiceError::denied(
            "Only the owner or a collaborator can update this project",
        ));
    }

    let name = match &patch.name {
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(ServiceError::invalid("Project name must not be empty"));
            }
            trimmed.to_string()
        }
        None => project.name.clone(),
    };
    let description = match &patch.description {
        Some(raw) => raw.trim().to_string(),
        None => project.description.clone(),
    };
    let visibility = patch.visibility.unwrap_or(project.visibility);
    let now = chrono::Utc::now().timestamp();

    sqlx::query("UPDATE projects SET name = ?, description = ?, visibility = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&description)
        .bind(visibility.as_str())
        .bind(now)
        .bind(project_id)
        .execute(&db.pool)
        .await?;

    notifications::project_timestamp_changed(db, project_id, now).await?;
    info!("[PROJECTS] Project {} updated by {}", project_id, user_id);
    require_project(db, project_id).await
}

/// Owner-only. The project's tasks, its messages and the project row leave
/// in one transaction, so a partial cascade is never observable.
pub async fn delete_project(db: &Database, project_id: &str, user_id: &str) -> ServiceResult<()> {
    let project = require_project(db, project_id).await?;
    if project.owner_id != user_id {
        return Err(ServiceError::denied("Only the project owner can delete a project"));
    }

    let mut tx = db.pool.begin().await?;
    sqlx::query("DELETE FROM tasks WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM messages WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("[PROJECTS] Project {} deleted by {} (tasks and messages included)", project_id, user_id);
    Ok(())
}

pub async fn add_collaborator(
    db: &Database,
    project_id: &str,
    email: &str,
    role: Option<&str>,
) -> ServiceResult<CollaboratorProfile> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ServiceError::invalid("Email must not be empty"));
    }
    let role = role.map(str::trim).filter(|r| !r.is_empty()).unwrap_or(DEFAULT_ROLE);

    let project = require_project(db, project_id).await?;
    let user = match users::find_user_by_email(db, &email).await? {
        Some(user) => user,
        None => {
            return Err(ServiceError::not_found(format!(
                "No user registered with email {}",
                email
            )))
        }
    };

    if user.id == project.owner_id {
        return Err(ServiceError::already_exists("This user is the project owner"));
    }
    if project.collaborators.iter().any(|c| c.user_id == user.id) {
        return Err(ServiceError::already_exists("This user is already a collaborator"));
    }

    let now = chrono::Utc::now().timestamp();
    let mut roster = project.collaborators.clone();
    roster.push(Collaborator {
        user_id: user.id.clone(),
        role: role.to_string(),
        added_at: Some(now),
    });
    write_roster(db, project_id, &roster, now).await?;

    notifications::collaborators_added(db, project_id, &project.name, &project.collaborators, &roster)
        .await?;

    info!("[PROJECTS] {} joined project {} as {}", user.id, project_id, role);
    Ok(CollaboratorProfile {
        id: user.id,
        email: user.email,
        display_name: user.display_name,
        is_owner: false,
        role: role.to_string(),
        added_at: Some(now),
    })
}

pub async fn remove_collaborator(db: &Database, project_id: &str, user_id: &str) -> ServiceResult<()> {
    let project = require_project(db, project_id).await?;
    if user_id == project.owner_id {
        return Err(ServiceError::denied("The project owner cannot be removed"));
    }
    if !project.collaborators.iter().any(|c| c.user_id == user_id) {
        return Err(ServiceError::not_found(
            "This user is not a collaborator of the project",
        ));
    }

    let roster: Vec<Collaborator> = project
        .collaborators
        .iter()
        .filter(|c| c.user_id != user_id)
        .cloned()
        .collect();
    let now = chrono::Utc::now().timestamp();
    write_roster(db, project_id, &roster, now).await?;

    info!("[PROJECTS] {} removed from project {}", user_id, project_id);
    Ok(())
}

/// Roster listing with profiles, owner first. Follows the stored order for
/// everyone else.
pub async fn list_collaborators(db: &Database, project_id: &str) -> ServiceResult<Vec<CollaboratorProfile>> {
    let project = require_project(db, project_id).await?;
    enrich_roster(db, &project).await
}

async fn enrich_roster(db: &Database, project: &Project) -> ServiceResult<Vec<CollaboratorProfile>> {
    let mut out = Vec::with_capacity(project.collaborators.len() + 1);
    if let Some(owner) = users::fetch_user(db, &project.owner_id).await? {
        out.push(CollaboratorProfile {
            id: owner.id,
            email: owner.email,
            display_name: owner.display_name,
            is_owner: true,
            role: OWNER_ROLE.to_string(),
            added_at: None,
        });
    }
    for collab in &project.collaborators {
        // Legacy projects seeded the owner into their own roster
        if collab.user_id == project.owner_id {
            continue;
        }
        match users::fetch_user(db, &collab.user_id).await? {
            Some(user) => out.push(CollaboratorProfile {
                id: user.id,
                email: user.email,
                display_name: user.display_name,
                is_owner: false,
                role: collab.role.clone(),
                added_at: collab.added_at,
            }),
            None => {
                warn!(
                    "[PROJECTS] Roster of {} references unknown user {}",
                    project.id, collab.user_id
                );
            }
        }
    }
    Ok(out)
}

/// Persists a full roster. Rewriting the whole column migrates any legacy
/// string entries to the object shape as a side effect.
async fn write_roster(
    db: &Database,
    project_id: &str,
    roster: &[Collaborator],
    updated_at: i64,
) -> ServiceResult<()> {
    let raw = serde_json::to_string(roster)?;
    let res = sqlx::query("UPDATE projects SET collaborators = ?, updated_at = ? WHERE id = ?")
        .bind(&raw)
        .bind(updated_at)
        .bind(project_id)
        .execute(&db.pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(ServiceError::not_found(format!("Project {} not found", project_id)));
    }
    Ok(())
}

/// Best-effort freshness stamp written after task-level changes. A vanished
/// project is not an error here; the cascade already took everything else.
pub(crate) async fn touch_project(db: &Database, project_id: &str, updated_at: i64) -> ServiceResult<()> {
    sqlx::query("UPDATE projects SET updated_at = ? WHERE id = ?")
        .bind(updated_at)
        .bind(project_id)
        .execute(&db.pool)
        .await?;
    Ok(())
}

pub(crate) async fn require_project(db: &Database, project_id: &str) -> ServiceResult<Project> {
    match fetch_project(db, project_id).await? {
        Some(project) => Ok(project),
        None => Err(ServiceError::not_found(format!("Project {} not found", project_id))),
    }
}

pub(crate) async fn fetch_project(db: &Database, project_id: &str) -> ServiceResult<Option<Project>> {
    let row = sqlx::query(&format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS))
        .bind(project_id)
        .fetch_optional(&db.pool)
        .await?;
    match row {
        Some(row) => Ok(Some(project_from_row(&row)?)),
        None => Ok(None),
    }
}

fn project_from_row(row: &sqlx::sqlite::SqliteRow) -> ServiceResult<Project> {
    let visibility_raw: String = row.try_get("visibility")?;
    let visibility = Visibility::parse(&visibility_raw)
        .ok_or_else(|| ServiceError::internal(format!("unknown visibility '{}'", visibility_raw)))?;
    let roster_raw: String = row.try_get("collaborators")?;
    let collaborators = crate::common::models::normalize_roster(&roster_raw)?;
    let stats_raw: Option<String> = row.try_get("stats")?;
    let stats = match stats_raw {
        Some(raw) => Some(serde_json::from_str(&raw)?),
        None => None,
    };

    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        visibility,
        owner_id: row.try_get("owner_id")?,
        collaborators,
        stats,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
