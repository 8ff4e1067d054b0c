mod common;

use cantiere::common::models::{ProjectPatch, Visibility, DEFAULT_ROLE, OWNER_ROLE};
use cantiere::server::error::ServiceError;
use cantiere::server::{messages, projects, tasks};
use common::{register, setup};

#[tokio::test]
async fn roster_listing_puts_owner_first_with_roles() {
    let t = setup().await;
    let db = &t.db;
    register(db, "u1", "ana@site.test", "Ana").await;
    register(db, "u2", "bo@site.test", "Bo").await;

    let project = projects::create_project(db, "Dock refit", "", None, "u1")
        .await
        .unwrap();
    projects::add_collaborator(db, &project.id, "bo@site.test", Some("Engineer"))
        .await
        .unwrap();

    let roster = projects::list_collaborators(db, &project.id).await.unwrap();
    assert_eq!(roster.len(), 2);
    assert_eq!(roster[0].id, "u1");
    assert!(roster[0].is_owner);
    assert_eq!(roster[0].role, OWNER_ROLE);
    assert_eq!(roster[1].id, "u2");
    assert!(!roster[1].is_owner);
    assert_eq!(roster[1].role, "Engineer");
    assert_eq!(roster[1].email, "bo@site.test");
    assert!(roster[1].added_at.is_some());
}

#[tokio::test]
async fn duplicate_and_unknown_invites_leave_the_roster_unchanged() {
    let t = setup().await;
    let db = &t.db;
    register(db, "u1", "ana@site.test", "Ana").await;
    register(db, "u2", "bo@site.test", "Bo").await;

    let project = projects::create_project(db, "Dock refit", "", None, "u1")
        .await
        .unwrap();
    projects::add_collaborator(db, &project.id, "bo@site.test", None)
        .await
        .unwrap();

    let err = projects::add_collaborator(db, &project.id, "bo@site.test", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyExists(_)));

    let err = projects::add_collaborator(db, &project.id, "ana@site.test", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyExists(_)));

    let err = projects::add_collaborator(db, &project.id, "ghost@site.test", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let err = projects::add_collaborator(db, &project.id, "   ", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));

    let roster = projects::list_collaborators(db, &project.id).await.unwrap();
    assert_eq!(roster.len(), 2);
}

#[tokio::test]
async fn the_owner_cannot_be_removed_from_their_own_project() {
    let t = setup().await;
    let db = &t.db;
    register(db, "u1", "ana@site.test", "Ana").await;
    register(db, "u2", "bo@site.test", "Bo").await;

    let project = projects::create_project(db, "Dock refit", "", None, "u1")
        .await
        .unwrap();
    projects::add_collaborator(db, &project.id, "bo@site.test", None)
        .await
        .unwrap();

    let err = projects::remove_collaborator(db, &project.id, "u1").await.unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied(_)));

    let err = projects::remove_collaborator(db, &project.id, "u3").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    projects::remove_collaborator(db, &project.id, "u2").await.unwrap();
    let roster = projects::list_collaborators(db, &project.id).await.unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].id, "u1");
}

#[tokio::test]
async fn project_updates_merge_fields_and_check_permissions() {
    let t = setup().await;
    let db = &t.db;
    register(db, "u1", "ana@site.test", "Ana").await;
    register(db, "u2", "bo@site.test", "Bo").await;
    register(db, "u3", "cy@site.test", "Cy").await;

    let project = projects::create_project(db, "Dock refit", "West dock", None, "u1")
        .await
        .unwrap();
    projects::add_collaborator(db, &project.id, "bo@site.test", None)
        .await
        .unwrap();

    // A collaborator may edit; untouched fields keep their value
    let patch = ProjectPatch {
        name: Some("Dock refit phase 2".to_string()),
        ..Default::default()
    };
    let updated = projects::update_project(db, &project.id, "u2", patch).await.unwrap();
    assert_eq!(updated.name, "Dock refit phase 2");
    assert_eq!(updated.description, "West dock");
    assert_eq!(updated.visibility, Visibility::Private);

    let patch = ProjectPatch {
        name: Some("   ".to_string()),
        ..Default::default()
    };
    let err = projects::update_project(db, &project.id, "u1", patch).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));

    let patch = ProjectPatch {
        description: Some("hijacked".to_string()),
        ..Default::default()
    };
    let err = projects::update_project(db, &project.id, "u3", patch).await.unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied(_)));

    let view = projects::get_project(db, &project.id, "u1").await.unwrap();
    assert_eq!(view.project.description, "West dock");
}

#[tokio::test]
async fn public_projects_are_viewable_but_not_editable_by_strangers() {
    let t = setup().await;
    let db = &t.db;
    register(db, "u1", "ana@site.test", "Ana").await;
    register(db, "u3", "cy@site.test", "Cy").await;

    let open = projects::create_project(db, "Open yard", "", Some(Visibility::Public), "u1")
        .await
        .unwrap();
    let view = projects::get_project(db, &open.id, "u3").await.unwrap();
    assert!(!view.can_edit);
    assert_eq!(view.role, None);
    assert_eq!(view.owner.as_ref().map(|o| o.id.as_str()), Some("u1"));
    assert_eq!(view.collaborators_data.len(), 1);

    let hidden = projects::create_project(db, "Hidden yard", "", None, "u1")
        .await
        .unwrap();
    let err = projects::get_project(db, &hidden.id, "u3").await.unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied(_)));

    let err = projects::get_project(db, "missing", "u3").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn listings_split_own_projects_from_public_ones() {
    let t = setup().await;
    let db = &t.db;
    register(db, "u1", "ana@site.test", "Ana").await;
    register(db, "u2", "bo@site.test", "Bo").await;

    let mine = projects::create_project(db, "Mine", "", None, "u1").await.unwrap();
    let shared = projects::create_project(db, "Shared", "", None, "u2").await.unwrap();
    projects::add_collaborator(db, &shared.id, "ana@site.test", None)
        .await
        .unwrap();
    let open = projects::create_project(db, "Open", "", Some(Visibility::Public), "u2")
        .await
        .unwrap();
    projects::create_project(db, "Hidden", "", None, "u2").await.unwrap();

    let lists = projects::list_projects(db, "u1").await.unwrap();
    assert_eq!(lists.projects.len(), 2);
    for listing in &lists.projects {
        assert_eq!(listing.is_owner, listing.project.id == mine.id);
    }
    let ids: Vec<&str> = lists.projects.iter().map(|l| l.project.id.as_str()).collect();
    assert!(ids.contains(&mine.id.as_str()));
    assert!(ids.contains(&shared.id.as_str()));

    assert_eq!(lists.public_projects.len(), 1);
    assert_eq!(lists.public_projects[0].id, open.id);
}

#[tokio::test]
async fn delete_cascades_to_tasks_and_messages() {
    let t = setup().await;
    let db = &t.db;
    register(db, "u1", "ana@site.test", "Ana").await;
    register(db, "u2", "bo@site.test", "Bo").await;

    let project = projects::create_project(db, "Dock refit", "", None, "u1")
        .await
        .unwrap();
    projects::add_collaborator(db, &project.id, "bo@site.test", None)
        .await
        .unwrap();
    let task = tasks::create_task(db, &project.id, "Pour slab", "", None, None, "u1")
        .await
        .unwrap();
    messages::post_message(db, &project.id, "u2", "starting tomorrow")
        .await
        .unwrap();

    let err = projects::delete_project(db, &project.id, "u2").await.unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied(_)));

    projects::delete_project(db, &project.id, "u1").await.unwrap();

    let err = projects::get_project(db, &project.id, "u1").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    let err = tasks::get_task_details(db, &task.id, "u1").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    let messages_left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE project_id = ?")
        .bind(&project.id)
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(messages_left, 0);

    let err = projects::delete_project(db, &project.id, "u1").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn a_failed_cascade_rolls_back_completely() {
    let t = setup().await;
    let db = &t.db;
    register(db, "u1", "ana@site.test", "Ana").await;

    let project = projects::create_project(db, "Dock refit", "", None, "u1")
        .await
        .unwrap();
    let task = tasks::create_task(db, &project.id, "Pour slab", "", None, None, "u1")
        .await
        .unwrap();

    // Sabotage the middle of the batch; the whole delete must roll back
    sqlx::query("DROP TABLE messages").execute(&db.pool).await.unwrap();

    let err = projects::delete_project(db, &project.id, "u1").await.unwrap_err();
    assert!(matches!(err, ServiceError::Internal(_)));

    assert!(projects::get_project(db, &project.id, "u1").await.is_ok());
    assert!(tasks::get_task_details(db, &task.id, "u1").await.is_ok());
}

#[tokio::test]
async fn legacy_string_rosters_keep_working_and_migrate_on_write() {
    let t = setup().await;
    let db = &t.db;
    register(db, "u1", "ana@site.test", "Ana").await;
    register(db, "u2", "bo@site.test", "Bo").await;
    register(db, "u3", "cy@site.test", "Cy").await;

    // A stored project whose roster predates the object shape
    sqlx::query(
        "INSERT INTO projects (id, name, description, visibility, owner_id, collaborators, created_at, updated_at)
         VALUES ('p_old', 'Legacy yard', '', 'private', 'u1', '[\"u2\"]', 100, 100)",
    )
    .execute(&db.pool)
    .await
    .unwrap();

    let view = projects::get_project(db, "p_old", "u2").await.unwrap();
    assert!(view.can_edit);
    assert_eq!(view.role.as_deref(), Some(DEFAULT_ROLE));

    let roster = projects::list_collaborators(db, "p_old").await.unwrap();
    assert_eq!(roster.len(), 2);
    assert_eq!(roster[1].id, "u2");
    assert_eq!(roster[1].role, DEFAULT_ROLE);
    assert_eq!(roster[1].added_at, None);

    // The legacy entry still counts as membership for duplicate checks
    let err = projects::add_collaborator(db, "p_old", "bo@site.test", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyExists(_)));

    // The next successful roster write rewrites the column in object form
    projects::add_collaborator(db, "p_old", "cy@site.test", Some("Surveyor"))
        .await
        .unwrap();
    let raw: String = sqlx::query_scalar("SELECT collaborators FROM projects WHERE id = 'p_old'")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert!(raw.contains(r#"{"userId":"u2","role":"Member"}"#));
    assert!(raw.contains(r#""userId":"u3""#));
}
