use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Role shown for a project owner. Never stored in the roster.
pub const OWNER_ROLE: &str = "Project Owner";
/// Role assumed for roster entries that carry none.
pub const DEFAULT_ROLE: &str = "Member";

/// Registered user profile, mirrored from the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
        }
    }

    pub fn parse(raw: &str) -> Option<Visibility> {
        match raw {
            "private" => Some(Visibility::Private),
            "public" => Some(Visibility::Public),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Option<Priority> {
        match raw {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// Canonical roster entry. Stored rosters may still contain bare user-id
/// strings written by older clients; [`CollaboratorEntry`] accepts both
/// shapes and [`normalize_roster`] folds them into this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<i64>,
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

/// Either of the two roster shapes found in stored projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CollaboratorEntry {
    Entry(Collaborator),
    Legacy(String),
}

impl CollaboratorEntry {
    pub fn user_id(&self) -> &str {
        match self {
            CollaboratorEntry::Entry(c) => &c.user_id,
            CollaboratorEntry::Legacy(id) => id,
        }
    }

    pub fn normalize(self) -> Collaborator {
        match self {
            CollaboratorEntry::Entry(c) => c,
            CollaboratorEntry::Legacy(user_id) => Collaborator {
                user_id,
                role: default_role(),
                added_at: None,
            },
        }
    }
}

/// Parses a stored roster column and normalizes every entry.
pub fn normalize_roster(raw: &str) -> Result<Vec<Collaborator>, serde_json::Error> {
    let entries: Vec<CollaboratorEntry> = serde_json::from_str(raw)?;
    Ok(entries.into_iter().map(CollaboratorEntry::normalize).collect())
}

/// Aggregate task counters, recomputed from the project's live tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub high_priority_tasks: i64,
    pub overdue_tasks: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    pub owner_id: String,
    pub collaborators: Vec<Collaborator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ProjectStats>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Partial update for project metadata. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}

/// Lightweight checklist item embedded in a task, addressed by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub name: String,
    pub completed: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub description: String,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    pub subtasks: Vec<Subtask>,
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_updated_at: Option<i64>,
}

/// Chat message posted to a project's discussion board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    TaskCompleted,
    AddedToProject,
    NewProject,
    NewTask,
    NewMessage,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TaskCompleted => "TASK_COMPLETED",
            NotificationKind::AddedToProject => "ADDED_TO_PROJECT",
            NotificationKind::NewProject => "NEW_PROJECT",
            NotificationKind::NewTask => "NEW_TASK",
            NotificationKind::NewMessage => "NEW_MESSAGE",
        }
    }

    pub fn parse(raw: &str) -> Option<NotificationKind> {
        match raw {
            "TASK_COMPLETED" => Some(NotificationKind::TaskCompleted),
            "ADDED_TO_PROJECT" => Some(NotificationKind::AddedToProject),
            "NEW_PROJECT" => Some(NotificationKind::NewProject),
            "NEW_TASK" => Some(NotificationKind::NewTask),
            "NEW_MESSAGE" => Some(NotificationKind::NewMessage),
            _ => None,
        }
    }
}

/// Event record addressed to a single user, to a recipient list, or to
/// whoever watches the project it references.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    pub read: bool,
    pub created_at: i64,
}

impl Notification {
    /// Fresh unread notification with a generated id and current timestamp.
    pub fn new(kind: NotificationKind) -> Self {
        Notification {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            user_id: None,
            recipients: Vec::new(),
            project_id: None,
            project_name: None,
            task_id: None,
            task_name: None,
            message_id: None,
            sender_id: None,
            read: false,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Roster entry enriched with the user's public profile, as returned by
/// collaborator listings. The owner comes first with `is_owner` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorProfile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub is_owner: bool,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<i64>,
}

/// A project together with the caller's relationship to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListing {
    #[serde(flatten)]
    pub project: Project,
    pub is_owner: bool,
}

/// Projects split the way the dashboard consumes them: the caller's own
/// (owned or collaborating) and the public ones they merely observe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectLists {
    pub projects: Vec<ProjectListing>,
    pub public_projects: Vec<Project>,
}

/// Full project detail view: the record, its enriched roster, the owner's
/// profile and what the requesting user may do with it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: Project,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<User>,
    pub collaborators_data: Vec<CollaboratorProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub can_edit: bool,
}

/// A task plus whether the requesting user may modify it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub can_edit: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_normalizes_legacy_and_object_entries() {
        let raw = r#"["u_old", {"userId": "u_new", "role": "Designer", "addedAt": 1700000000}]"#;
        let roster = normalize_roster(raw).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].user_id, "u_old");
        assert_eq!(roster[0].role, DEFAULT_ROLE);
        assert_eq!(roster[0].added_at, None);
        assert_eq!(roster[1].user_id, "u_new");
        assert_eq!(roster[1].role, "Designer");
        assert_eq!(roster[1].added_at, Some(1700000000));
    }

    #[test]
    fn roster_entry_without_role_defaults_to_member() {
        let raw = r#"[{"userId": "u1"}]"#;
        let roster = normalize_roster(raw).unwrap();
        assert_eq!(roster[0].role, DEFAULT_ROLE);
    }

    #[test]
    fn roster_entry_ignores_unknown_fields() {
        let raw = r#"[{"userId": "u1", "email": "u1@example.com", "role": "Tester"}]"#;
        let roster = normalize_roster(raw).unwrap();
        assert_eq!(roster[0].user_id, "u1");
        assert_eq!(roster[0].role, "Tester");
    }

    #[test]
    fn roster_rejects_malformed_entries() {
        assert!(normalize_roster(r#"[{"role": "Member"}]"#).is_err());
        assert!(normalize_roster(r#"{"userId": "u1"}"#).is_err());
    }

    #[test]
    fn canonical_roster_serializes_as_objects() {
        let roster = vec![Collaborator {
            user_id: "u1".to_string(),
            role: "Member".to_string(),
            added_at: None,
        }];
        let raw = serde_json::to_string(&roster).unwrap();
        assert_eq!(raw, r#"[{"userId":"u1","role":"Member"}]"#);
    }

    #[test]
    fn notification_kind_round_trips_through_wire_names() {
        for kind in [
            NotificationKind::TaskCompleted,
            NotificationKind::AddedToProject,
            NotificationKind::NewProject,
            NotificationKind::NewTask,
            NotificationKind::NewMessage,
        ] {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NotificationKind::parse("TASK_CREATED"), None);
    }

    #[test]
    fn priority_and_visibility_parse_stored_values() {
        assert_eq!(Priority::parse("high"), Some(Priority::High));
        assert_eq!(Priority::parse("urgent"), None);
        assert_eq!(Priority::default(), Priority::Medium);
        assert_eq!(Visibility::parse("public"), Some(Visibility::Public));
        assert_eq!(Visibility::parse("hidden"), None);
        assert_eq!(Visibility::default(), Visibility::Private);
    }

    #[test]
    fn task_serializes_dates_and_skips_empty_options() {
        let task = Task {
            id: "t1".to_string(),
            project_id: "p1".to_string(),
            name: "Pour foundation".to_string(),
            description: String::new(),
            priority: Priority::High,
            due_date: Some(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()),
            completed: false,
            completed_by: None,
            subtasks: Vec::new(),
            created_by: "u1".to_string(),
            created_at: 1700000000,
            updated_at: 1700000000,
            project_updated_at: None,
        };
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["dueDate"], "2024-03-15");
        assert!(value.get("completedBy").is_none());
        assert!(value.get("projectUpdatedAt").is_none());
    }
}
