use crate::common::models::{Project, Visibility, OWNER_ROLE};

/// What a given user may do with a given project.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAccess {
    pub is_owner: bool,
    pub is_collaborator: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub can_view: bool,
    pub can_edit: bool,
}

impl ProjectAccess {
    /// The all-false decision handed out for missing projects and strangers.
    pub fn unauthorized() -> Self {
        ProjectAccess {
            is_owner: false,
            is_collaborator: false,
            role: None,
            can_view: false,
            can_edit: false,
        }
    }
}

/// Evaluates `user_id` against a project's owner, roster and visibility.
///
/// Ownership is implicit and supersedes any roster entry the owner might
/// also have. Collaborators get their stored role. Public visibility grants
/// view access only, never edit. A missing project evaluates to the fully
/// unauthorized decision so callers keep "not found" and "not authorized"
/// as separate questions.
pub fn evaluate(project: Option<&Project>, user_id: &str) -> ProjectAccess {
    let project = match project {
        Some(p) => p,
        None => return ProjectAccess::unauthorized(),
    };

    let is_owner = project.owner_id == user_id;
    let entry = project.collaborators.iter().find(|c| c.user_id == user_id);
    let is_collaborator = entry.is_some();
    let can_edit = is_owner || is_collaborator;
    let can_view = can_edit || project.visibility == Visibility::Public;
    let role = if is_owner {
        Some(OWNER_ROLE.to_string())
    } else {
        entry.map(|c| c.role.clone())
    };

    ProjectAccess {
        is_owner,
        is_collaborator,
        role,
        can_view,
        can_edit,
    }
}
