use crate::common::models::{Priority, ProjectPatch, Visibility};
use crate::server::database::Database;
use crate::server::error::{ServiceError, ServiceResult};
use crate::server::{messages, notifications, projects, tasks, users};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};

/// One JSON request per line. The `op` tag selects the operation, the rest
/// of the object is its payload; unknown fields are ignored. `user_id`
/// always names the already-authenticated caller, never a credential.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Request {
    RegisterUser {
        user_id: String,
        email: String,
        #[serde(default)]
        display_name: String,
    },
    GetUserProfile {
        user_id: String,
    },
    UpdateDisplayName {
        user_id: String,
        display_name: String,
    },
    CreateProject {
        user_id: String,
        name: String,
        #[serde(default)]
        description: String,
        visibility: Option<Visibility>,
    },
    GetProject {
        project_id: String,
        user_id: String,
    },
    ListProjects {
        user_id: String,
    },
    UpdateProject {
        project_id: String,
        user_id: String,
        #[serde(default)]
        updates: ProjectPatch,
    },
    DeleteProject {
        project_id: String,
        user_id: String,
    },
    AddCollaborator {
        project_id: String,
        email: String,
        role: Option<String>,
    },
    RemoveCollaborator {
        project_id: String,
        user_id: String,
    },
    ListCollaborators {
        project_id: String,
    },
    CreateTask {
        project_id: String,
        user_id: String,
        name: String,
        #[serde(default)]
        description: String,
        priority: Option<Priority>,
        due_date: Option<String>,
    },
    GetTask {
        task_id: String,
        user_id: String,
    },
    ListTasks {
        project_id: String,
        user_id: String,
    },
    UpdateTask {
        task_id: String,
        user_id: String,
        #[serde(default)]
        updates: serde_json::Map<String, Value>,
    },
    DeleteTask {
        task_id: String,
        user_id: String,
    },
    AddSubtask {
        task_id: String,
        user_id: String,
        name: String,
    },
    ToggleSubtask {
        task_id: String,
        user_id: String,
        index: usize,
    },
    RemoveSubtask {
        task_id: String,
        user_id: String,
        index: usize,
    },
    PostMessage {
        project_id: String,
        user_id: String,
        text: String,
    },
    ListMessages {
        project_id: String,
        user_id: String,
    },
    ListNotifications {
        user_id: String,
    },
    MarkNotificationRead {
        notification_id: String,
        user_id: String,
    },
    DeleteNotification {
        notification_id: String,
        user_id: String,
    },
}

impl Request {
    fn op_name(&self) -> &'static str {
        match self {
            Request::RegisterUser { .. } => "register_user",
            Request::GetUserProfile { .. } => "get_user_profile",
            Request::UpdateDisplayName { .. } => "update_display_name",
            Request::CreateProject { .. } => "create_project",
            Request::GetProject { .. } => "get_project",
            Request::ListProjects { .. } => "list_projects",
            Request::UpdateProject { .. } => "update_project",
            Request::DeleteProject { .. } => "delete_project",
            Request::AddCollaborator { .. } => "add_collaborator",
            Request::RemoveCollaborator { .. } => "remove_collaborator",
            Request::ListCollaborators { .. } => "list_collaborators",
            Request::CreateTask { .. } => "create_task",
            Request::GetTask { .. } => "get_task",
            Request::ListTasks { .. } => "list_tasks",
            Request::UpdateTask { .. } => "update_task",
            Request::DeleteTask { .. } => "delete_task",
            Request::AddSubtask { .. } => "add_subtask",
            Request::ToggleSubtask { .. } => "toggle_subtask",
            Request::RemoveSubtask { .. } => "remove_subtask",
            Request::PostMessage { .. } => "post_message",
            Request::ListMessages { .. } => "list_messages",
            Request::ListNotifications { .. } => "list_notifications",
            Request::MarkNotificationRead { .. } => "mark_notification_read",
            Request::DeleteNotification { .. } => "delete_notification",
        }
    }
}

pub struct Server {
    pub db: Arc<Database>,
}

impl Server {
    pub async fn run(&self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("[SERVER] Listening on {}", addr);

        loop {
            let (stream, peer) = listener.accept().await?;
            info!("[SERVER] New connection from {}", peer);
            let db = self.db.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_client(db, stream, peer).await {
                    warn!("[SERVER] Connection {} ended with error: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_client(
    db: Arc<Database>,
    stream: TcpStream,
    peer: std::net::SocketAddr,
) -> anyhow::Result<()> {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            info!("[SERVER] Client disconnected: {}", peer);
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => {
                info!("[SERVER] {} <- {}", request.op_name(), peer);
                handle_request(&db, request).await
            }
            Err(e) => {
                warn!("[SERVER] Unparseable request from {}: {}", peer, e);
                json!({
                    "ok": false,
                    "error": "INVALID_ARGUMENT",
                    "message": format!("Unparseable request: {}", e),
                })
            }
        };

        let body = serde_json::to_string(&response)?;
        writer.write_all(body.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Runs one parsed request and shapes the reply envelope. Success replies
/// carry `"ok": true` plus the operation's payload; failures carry the
/// error kind and a human-readable message.
pub async fn handle_request(db: &Database, request: Request) -> Value {
    let op = request.op_name();
    match dispatch(db, request).await {
        Ok(payload) => ok_envelope(payload),
        Err(e) => {
            match &e {
                ServiceError::Internal(source) => error!("[SERVER] {} failed: {:#}", op, source),
                _ => info!("[SERVER] {} rejected: {}", op, e),
            }
            json!({
                "ok": false,
                "error": e.kind(),
                "message": e.to_string(),
            })
        }
    }
}

fn ok_envelope(payload: Value) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("ok".to_string(), Value::Bool(true));
    if let Value::Object(fields) = payload {
        for (key, value) in fields {
            body.insert(key, value);
        }
    }
    Value::Object(body)
}

async fn dispatch(db: &Database, request: Request) -> ServiceResult<Value> {
    match request {
        Request::RegisterUser { user_id, email, display_name } => {
            let user = users::register_user(db, &user_id, &email, &display_name).await?;
            Ok(json!({ "user": user }))
        }
        Request::GetUserProfile { user_id } => {
            let user = users::get_user_profile(db, &user_id).await?;
            Ok(json!({ "user": user }))
        }
        Request::UpdateDisplayName { user_id, display_name } => {
            let user = users::update_display_name(db, &user_id, &display_name).await?;
            Ok(json!({ "user": user }))
        }
        Request::CreateProject { user_id, name, description, visibility } => {
            let project = projects::create_project(db, &name, &description, visibility, &user_id).await?;
            Ok(json!({ "projectId": project.id, "project": project }))
        }
        Request::GetProject { project_id, user_id } => {
            let view = projects::get_project(db, &project_id, &user_id).await?;
            Ok(json!({ "project": view }))
        }
        Request::ListProjects { user_id } => {
            let lists = projects::list_projects(db, &user_id).await?;
            Ok(serde_json::to_value(lists)?)
        }
        Request::UpdateProject { project_id, user_id, updates } => {
            let project = projects::update_project(db, &project_id, &user_id, updates).await?;
            Ok(json!({ "project": project }))
        }
        Request::DeleteProject { project_id, user_id } => {
            projects::delete_project(db, &project_id, &user_id).await?;
            Ok(json!({ "deleted": project_id }))
        }
        Request::AddCollaborator { project_id, email, role } => {
            let collaborator = projects::add_collaborator(db, &project_id, &email, role.as_deref()).await?;
            Ok(json!({ "collaborator": collaborator }))
        }
        Request::RemoveCollaborator { project_id, user_id } => {
            projects::remove_collaborator(db, &project_id, &user_id).await?;
            Ok(json!({ "removed": user_id }))
        }
        Request::ListCollaborators { project_id } => {
            let collaborators = projects::list_collaborators(db, &project_id).await?;
            Ok(json!({ "collaborators": collaborators }))
        }
        Request::CreateTask { project_id, user_id, name, description, priority, due_date } => {
            let task = tasks::create_task(
                db,
                &project_id,
                &name,
                &description,
                priority,
                due_date.as_deref(),
                &user_id,
            )
            .await?;
            Ok(json!({ "taskId": task.id, "task": task }))
        }
        Request::GetTask { task_id, user_id } => {
            let view = tasks::get_task_details(db, &task_id, &user_id).await?;
            Ok(json!({ "task": view }))
        }
        Request::ListTasks { project_id, user_id } => {
            let list = tasks::list_project_tasks(db, &project_id, &user_id).await?;
            Ok(json!({ "tasks": list }))
        }
        Request::UpdateTask { task_id, user_id, updates } => {
            let task = tasks::update_task(db, &task_id, &user_id, &updates).await?;
            Ok(json!({ "task": task }))
        }
        Request::DeleteTask { task_id, user_id } => {
            tasks::delete_task(db, &task_id, &user_id).await?;
            Ok(json!({ "deleted": task_id }))
        }
        Request::AddSubtask { task_id, user_id, name } => {
            let task = tasks::add_subtask(db, &task_id, &name, &user_id).await?;
            Ok(json!({ "task": task }))
        }
        Request::ToggleSubtask { task_id, user_id, index } => {
            let task = tasks::toggle_subtask(db, &task_id, index, &user_id).await?;
            Ok(json!({ "task": task }))
        }
        Request::RemoveSubtask { task_id, user_id, index } => {
            let task = tasks::remove_subtask(db, &task_id, index, &user_id).await?;
            Ok(json!({ "task": task }))
        }
        Request::PostMessage { project_id, user_id, text } => {
            let message = messages::post_message(db, &project_id, &user_id, &text).await?;
            Ok(json!({ "message": message }))
        }
        Request::ListMessages { project_id, user_id } => {
            let list = messages::list_messages(db, &project_id, &user_id).await?;
            Ok(json!({ "messages": list }))
        }
        Request::ListNotifications { user_id } => {
            let list = notifications::list_notifications(db, &user_id).await?;
            Ok(json!({ "notifications": list }))
        }
        Request::MarkNotificationRead { notification_id, user_id } => {
            notifications::mark_notification_read(db, &notification_id, &user_id).await?;
            Ok(json!({ "read": notification_id }))
        }
        Request::DeleteNotification { notification_id, user_id } => {
            notifications::delete_notification(db, &notification_id, &user_id).await?;
            Ok(json!({ "deleted": notification_id }))
        }
    }
}
