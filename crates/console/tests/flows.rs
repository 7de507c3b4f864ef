use std::sync::Arc;

use corral_api::{ApiError, Call, MockService};
use corral_console::{Console, PageFetch, Submission, TableView, ToastBuffer, ToastLevel};
use corral_core::{MutationError, PageKey, ResourceKind, Task};
use serde_json::json;

fn task(i: usize) -> serde_json::Value {
    json!({ "id": format!("t{}", i), "projectId": "p1", "title": format!("Task {}", i), "status": "pending" })
}

struct Fixture {
    mock: Arc<MockService>,
    toasts: Arc<ToastBuffer>,
    console: Arc<Console>,
}

fn fixture(tasks: usize) -> Fixture {
    let mock = Arc::new(
        MockService::new()
            .with_rows(ResourceKind::Projects, vec![json!({ "id": "p1", "name": "Alpha" }), json!({ "id": "p2", "name": "Beta" })])
            .with_rows(ResourceKind::Tasks, (1..=tasks).map(task).collect())
            .with_rows(
                ResourceKind::Users,
                vec![
                    json!({ "id": "u1", "email": "root@corral.dev", "is_superuser": true }),
                    json!({ "id": "u2", "email": "ann@corral.dev", "full_name": "Ann" }),
                ],
            ),
    );
    let toasts = Arc::new(ToastBuffer::new());
    let console = Arc::new(Console::new(mock.clone(), toasts.clone()).signed_in_as(Some("u1".into())));
    Fixture { mock, toasts, console }
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

fn titles(view: &TableView<Task>) -> Vec<String> {
    match view {
        TableView::Rows { rows, .. } => rows.iter().map(|r| r.entity.title.clone()).collect(),
        other => panic!("expected rows, got {:?}", other),
    }
}

#[tokio::test]
async fn added_task_shows_up_once_after_refetch() {
    let f = fixture(3);
    f.console.tasks.go_to(1).await;
    f.console.projects.go_to(1).await;
    let lists_before = f.mock.list_calls();

    let mut dialog = f.console.tasks.add_dialog();
    dialog.set_field("title", "Write spec").unwrap();
    dialog.set_field("project_id", "p1").unwrap();
    let unit = f.console.mutation_unit();
    let out = dialog.submit(&unit).await;
    assert!(matches!(out, Submission::Committed(Some(_))));
    assert!(dialog.is_closed());

    let created = f.mock.calls().into_iter().find_map(|c| match c {
        Call::Create { kind: ResourceKind::Tasks, body } => Some(body),
        _ => None,
    });
    assert_eq!(created.unwrap()["projectId"], json!("p1"));

    assert_eq!(f.console.sync().await, vec![ResourceKind::Tasks]);
    assert_eq!(f.mock.list_calls(), lists_before + 1);
    let view = f.console.tasks.view();
    let names = titles(&view);
    assert_eq!(names.iter().filter(|t| t.as_str() == "Write spec").count(), 1);
    assert_eq!(names.len(), 4);

    // Projects were not touched by a task mutation.
    let projects = f.console.cache().peek(PageKey::new(ResourceKind::Projects, 1)).unwrap();
    assert!(!projects.stale);
    let toasts = f.toasts.active();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].message, "Task created successfully.");
}

#[tokio::test]
async fn cleared_name_is_rejected_without_a_request() {
    let f = fixture(0);
    f.console.projects.go_to(1).await;
    let TableView::Rows { rows, .. } = f.console.projects.view() else { panic!("no rows") };
    let alpha = rows.iter().find(|r| r.entity.name == "Alpha").unwrap();

    let mut dialog = f.console.projects.edit_dialog(alpha).unwrap();
    dialog.set_field("name", "").unwrap();
    let unit = f.console.mutation_unit();
    match dialog.submit(&unit).await {
        Submission::Invalid(errs) => assert!(errs.for_field("name").is_some()),
        other => panic!("expected validation failure, got {:?}", other),
    }
    assert!(dialog.is_open());
    assert_eq!(f.mock.mutation_calls(), 0);
}

#[tokio::test]
async fn delete_waits_for_confirmation() {
    let f = fixture(2);
    f.console.tasks.go_to(1).await;
    let TableView::Rows { rows, .. } = f.console.tasks.view() else { panic!("no rows") };
    let unit = f.console.mutation_unit();

    let mut dialog = f.console.tasks.delete_dialog(&rows[0]).unwrap();
    assert_eq!(dialog.submit(&unit).await, Submission::Skipped);
    assert!(dialog.prompt().unwrap().contains("cannot be undone"));
    dialog.cancel();
    assert_eq!(f.mock.mutation_calls(), 0);

    let mut dialog = f.console.tasks.delete_dialog(&rows[0]).unwrap();
    assert_eq!(f.mock.mutation_calls(), 0);
    assert_eq!(dialog.confirm_with(&unit).await, Submission::Committed(None));
    assert!(dialog.is_closed());
    assert_eq!(f.mock.calls().last(), Some(&Call::Delete { kind: ResourceKind::Tasks, id: "t1".into() }));
}

#[tokio::test]
async fn rejected_mutation_keeps_dialog_and_cache() {
    let f = fixture(1);
    f.console.projects.go_to(1).await;
    f.mock.fail_next_mutation(ApiError::conflict("Project name already exists"));

    let mut dialog = f.console.projects.add_dialog();
    dialog.set_field("name", "Alpha").unwrap();
    let unit = f.console.mutation_unit();
    let out = dialog.submit(&unit).await;
    assert!(matches!(out, Submission::Failed(MutationError::Rejected { status: 409, .. })));
    assert!(dialog.is_open());
    let form = dialog.form().unwrap();
    assert_eq!(form.draft.name, "Alpha");
    assert!(form.failure.is_some());
    assert!(!f.console.cache().peek(PageKey::new(ResourceKind::Projects, 1)).unwrap().stale);
    assert!(!f.console.sync().await.contains(&ResourceKind::Projects));
    assert_eq!(f.toasts.active()[0].level, ToastLevel::Error);
}

#[tokio::test]
async fn late_page_two_does_not_replace_page_three() {
    let f = fixture(14);
    let release = f.mock.hold_list(ResourceKind::Tasks, 5);
    let c = f.console.clone();
    let page2 = tokio::spawn(async move { c.tasks.go_to(2).await });
    settle().await;

    assert_eq!(f.console.tasks.go_to(3).await, PageFetch::Applied);
    release.send(()).unwrap();
    assert_eq!(page2.await.unwrap(), PageFetch::Superseded);

    let view = f.console.tasks.view();
    assert_eq!(titles(&view), vec!["Task 11", "Task 12", "Task 13", "Task 14"]);
    match view {
        TableView::Rows { placeholder, pagination, .. } => {
            assert!(!placeholder);
            assert_eq!(pagination.page, 3);
            assert_eq!(pagination.page_count, 3);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn previous_page_stays_visible_while_next_loads() {
    let f = fixture(8);
    assert_eq!(f.console.tasks.view(), TableView::Skeleton { rows: 5 });
    f.console.tasks.go_to(1).await;

    let release = f.mock.hold_list(ResourceKind::Tasks, 5);
    let c = f.console.clone();
    let next = tokio::spawn(async move { c.tasks.next_page().await });
    settle().await;

    let view = f.console.tasks.view();
    assert_eq!(titles(&view).first().map(String::as_str), Some("Task 1"));
    assert!(matches!(view, TableView::Rows { placeholder: true, pagination, .. } if pagination.page == 2));

    release.send(()).unwrap();
    assert_eq!(next.await.unwrap(), PageFetch::Applied);
    let view = f.console.tasks.view();
    assert_eq!(titles(&view), vec!["Task 6", "Task 7", "Task 8"]);
    assert!(matches!(view, TableView::Rows { placeholder: false, .. }));
}

#[tokio::test]
async fn fetch_error_keeps_last_good_rows() {
    let f = fixture(3);
    f.console.tasks.go_to(1).await;
    f.console.cache().invalidate(ResourceKind::Tasks);
    f.mock.fail_next_list(ApiError::internal("boom"));
    assert!(matches!(f.console.tasks.refresh().await, PageFetch::Failed(_)));

    match f.console.tasks.view() {
        TableView::Rows { rows, error, .. } => {
            assert_eq!(rows.len(), 3);
            assert!(error.is_some());
        }
        other => panic!("expected rows, got {:?}", other),
    }
}

#[tokio::test]
async fn users_table_locks_own_row() {
    let f = fixture(0);
    f.console.users.go_to(1).await;
    let TableView::Rows { rows, .. } = f.console.users.view() else { panic!("no rows") };
    let me = rows.iter().find(|r| r.is_you).unwrap();
    assert_eq!(me.entity.id, "u1");
    assert!(f.console.users.delete_dialog(me).is_none());
    assert_eq!(rows.iter().filter(|r| r.actions_enabled).count(), 1);
}
