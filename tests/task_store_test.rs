mod common;

use taskfabric::domain::errors::CoreError;
use taskfabric::domain::models::{
    RecurrencePattern, RecurrenceRule, Reminder, StatusFilter, Task, TaskPatch, TaskPriority,
    TaskQuery, Topic,
};
use taskfabric::domain::ports::{OutboxStore, ReminderStore, TaskCreateSpec, TaskStore};

use common::{in_hours, test_env};

#[tokio::test]
async fn create_and_get_round_trip() {
    let env = test_env().await;

    let task = Task::new("alice", "Water plants")
        .with_priority(TaskPriority::High)
        .with_tags(vec!["home".to_string()])
        .with_due_date(in_hours(4));
    let (created, events) = env
        .tasks
        .commit_task_create(TaskCreateSpec::task_only(task))
        .await
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].topic, Topic::TaskEvents);
    assert_eq!(events[1].topic, Topic::TaskUpdates);

    let fetched = env.tasks.get_task(created.id, "alice").await.unwrap().unwrap();
    assert_eq!(fetched.title, "Water plants");
    assert_eq!(fetched.priority, TaskPriority::High);
    assert_eq!(fetched.tags, vec!["home".to_string()]);
    assert!(!fetched.completed);
}

#[tokio::test]
async fn cross_user_rows_are_invisible() {
    let env = test_env().await;

    let task = Task::new("alice", "Private");
    let (created, _) = env
        .tasks
        .commit_task_create(TaskCreateSpec::task_only(task))
        .await
        .unwrap();

    assert!(env.tasks.get_task(created.id, "bob").await.unwrap().is_none());
    let err = env
        .tasks
        .commit_task_complete(created.id, "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn complete_is_idempotent_and_elides_events() {
    let env = test_env().await;

    let (created, _) = env
        .tasks
        .commit_task_create(TaskCreateSpec::task_only(Task::new("alice", "Once")))
        .await
        .unwrap();

    let first = env.tasks.commit_task_complete(created.id, "alice").await.unwrap();
    assert!(first.changed);
    assert!(first.new.completed);
    assert_eq!(first.events.len(), 2);

    let second = env.tasks.commit_task_complete(created.id, "alice").await.unwrap();
    assert!(!second.changed);
    assert!(second.events.is_empty());
}

#[tokio::test]
async fn due_date_change_on_completed_task_is_rejected() {
    let env = test_env().await;

    let (created, _) = env
        .tasks
        .commit_task_create(TaskCreateSpec::task_only(Task::new("alice", "Done soon")))
        .await
        .unwrap();
    env.tasks.commit_task_complete(created.id, "alice").await.unwrap();

    let patch = TaskPatch { due_date: Some(in_hours(2)), ..Default::default() };
    let err = env
        .tasks
        .commit_task_update(created.id, "alice", patch)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    // Other fields remain editable after completion.
    let patch = TaskPatch { title: Some("Renamed".to_string()), ..Default::default() };
    let (_, new, _) = env
        .tasks
        .commit_task_update(created.id, "alice", patch)
        .await
        .unwrap();
    assert_eq!(new.title, "Renamed");
}

#[tokio::test]
async fn delete_cascades_reminders() {
    let env = test_env().await;

    let task = Task::new("alice", "With reminder").with_due_date(in_hours(4));
    let reminder = Reminder::new(&task, in_hours(2));
    let reminder_id = reminder.id;
    let (created, _) = env
        .tasks
        .commit_task_create(TaskCreateSpec { task, rule: None, reminders: vec![reminder] })
        .await
        .unwrap();

    assert!(env.reminders.get(reminder_id).await.unwrap().is_some());

    env.tasks.commit_task_delete(created.id, "alice").await.unwrap();
    assert!(env.reminders.get(reminder_id).await.unwrap().is_none());
    assert!(env.tasks.get_task(created.id, "alice").await.unwrap().is_none());
}

#[tokio::test]
async fn deleting_template_detaches_descendants() {
    let env = test_env().await;

    let template = Task::new("alice", "Weekly");
    let rule = RecurrenceRule::new(&template, RecurrencePattern::Weekly, 1);
    let (template, _) = env
        .tasks
        .commit_task_create(TaskCreateSpec {
            task: template,
            rule: Some(rule.clone()),
            reminders: vec![],
        })
        .await
        .unwrap();
    env.tasks.commit_task_complete(template.id, "alice").await.unwrap();

    // Next instance in the same chain.
    let instance = Task::new("alice", "Weekly")
        .with_due_date(in_hours(24 * 7))
        .with_recurrence(rule.id);
    let spec = TaskCreateSpec::task_only(instance);
    // The instance references an existing rule, so create it directly.
    let (instance, _) = env.tasks.commit_task_create(spec).await.unwrap();
    assert_eq!(instance.recurrence_id, Some(rule.id));

    env.tasks.commit_task_delete(template.id, "alice").await.unwrap();

    let detached = env.tasks.get_task(instance.id, "alice").await.unwrap().unwrap();
    assert_eq!(detached.recurrence_id, None);
    assert!(env.tasks.get_rule(rule.id, "alice").await.unwrap().is_none());
}

#[tokio::test]
async fn one_pending_task_per_chain_is_enforced() {
    let env = test_env().await;

    let template = Task::new("alice", "Daily");
    let rule = RecurrenceRule::new(&template, RecurrencePattern::Daily, 1);
    let (template, _) = env
        .tasks
        .commit_task_create(TaskCreateSpec {
            task: template,
            rule: Some(rule.clone()),
            reminders: vec![],
        })
        .await
        .unwrap();

    // The template itself is the pending member of the chain.
    let duplicate = Task::new("alice", "Daily").with_recurrence(rule.id);
    let err = env
        .tasks
        .commit_task_create(TaskCreateSpec::task_only(duplicate))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    // Once completed, the next instance may exist.
    env.tasks.commit_task_complete(template.id, "alice").await.unwrap();
    let next = Task::new("alice", "Daily").with_recurrence(rule.id);
    assert!(env
        .tasks
        .commit_task_create(TaskCreateSpec::task_only(next))
        .await
        .is_ok());
}

#[tokio::test]
async fn find_pending_in_chain_sees_only_open_members() {
    let env = test_env().await;

    let template = Task::new("alice", "Daily");
    let rule = RecurrenceRule::new(&template, RecurrencePattern::Daily, 1);
    let (template, _) = env
        .tasks
        .commit_task_create(TaskCreateSpec {
            task: template,
            rule: Some(rule.clone()),
            reminders: vec![],
        })
        .await
        .unwrap();

    let pending = env.tasks.find_pending_in_chain(rule.id).await.unwrap();
    assert_eq!(pending.unwrap().id, template.id);

    env.tasks.commit_task_complete(template.id, "alice").await.unwrap();
    assert!(env.tasks.find_pending_in_chain(rule.id).await.unwrap().is_none());
}

#[tokio::test]
async fn outbox_rows_are_written_with_the_commit() {
    let env = test_env().await;

    let (_, events) = env
        .tasks
        .commit_task_create(TaskCreateSpec::task_only(Task::new("alice", "t")))
        .await
        .unwrap();

    // Rows exist before any publish attempt.
    let undelivered = env.outbox.fetch_undelivered(10).await.unwrap();
    assert_eq!(undelivered.len(), events.len());
    assert_eq!(env.outbox.depth().await.unwrap(), 2);
}

#[tokio::test]
async fn list_filters_sorts_and_paginates() {
    let env = test_env().await;

    for i in 0..5 {
        let mut task = Task::new("alice", format!("Task {i}"));
        if i % 2 == 0 {
            task = task.with_tags(vec!["Work".to_string()]).with_priority(TaskPriority::High);
        }
        let (created, _) = env
            .tasks
            .commit_task_create(TaskCreateSpec::task_only(task))
            .await
            .unwrap();
        if i == 4 {
            env.tasks.commit_task_complete(created.id, "alice").await.unwrap();
        }
    }
    // Another user's tasks never appear.
    env.tasks
        .commit_task_create(TaskCreateSpec::task_only(Task::new("bob", "Other")))
        .await
        .unwrap();

    let all = env
        .tasks
        .list_tasks("alice", &TaskQuery { limit: 10, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(all.tasks.len(), 5);
    assert!(all.next_cursor.is_none());

    let pending = env
        .tasks
        .list_tasks(
            "alice",
            &TaskQuery { status: Some(StatusFilter::Pending), limit: 10, ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(pending.tasks.len(), 4);

    // Tag matching is case-insensitive.
    let tagged = env
        .tasks
        .list_tasks(
            "alice",
            &TaskQuery { tag: Some("work".to_string()), limit: 10, ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(tagged.tasks.len(), 3);

    // Keyset pagination walks the full set without overlap.
    let page1 = env
        .tasks
        .list_tasks("alice", &TaskQuery { limit: 2, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(page1.tasks.len(), 2);
    let cursor = page1.next_cursor.expect("expected a continuation cursor");

    let page2 = env
        .tasks
        .list_tasks(
            "alice",
            &TaskQuery { limit: 10, cursor: Some(cursor), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(page2.tasks.len(), 3);

    let mut ids: Vec<_> = page1.tasks.iter().chain(page2.tasks.iter()).map(|t| t.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5);
}
