use std::collections::BTreeSet;

use jiff::civil::Date;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    access::{self, Action},
    error::{CoreError, CoreResult},
    identity::Caller,
    models::{
        activity::ActivityKind,
        file::FileAttachment,
        task::{Priority, Status, Task, TaskAssignee, TaskLabel, TaskView},
        tenant::{CascadeReport, Tenant},
    },
    realtime::{EventKind, Scope},
    services::rules,
    store::{TenantTx, WorkItemStore},
};

pub struct CreateTaskParameters {
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: Status,
    pub priority: Priority,
    pub points: Option<u8>,
    pub start_date: Option<Date>,
    pub due_date: Option<Date>,
    pub epic_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub assignee_ids: Vec<Uuid>,
    pub label_ids: Vec<Uuid>,
}

impl CreateTaskParameters {
    pub fn new(project_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            project_id,
            title: title.into(),
            description: None,
            status: Status::default(),
            priority: Priority::default(),
            points: None,
            start_date: None,
            due_date: None,
            epic_id: None,
            parent_task_id: None,
            assignee_ids: vec![],
            label_ids: vec![],
        }
    }
}

/// Partial task update. Nested options clear a field with `Some(None)`;
/// assignee and label lists replace the current set.
#[derive(Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub points: Option<Option<u8>>,
    pub start_date: Option<Option<Date>>,
    pub due_date: Option<Option<Date>>,
    pub epic_id: Option<Option<Uuid>>,
    pub parent_task_id: Option<Option<Uuid>>,
    pub order_index: Option<u64>,
    pub assignee_ids: Option<Vec<Uuid>>,
    pub label_ids: Option<Vec<Uuid>>,
}

impl TaskPatch {
    /// True when applying the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.points.is_none()
            && self.start_date.is_none()
            && self.due_date.is_none()
            && self.epic_id.is_none()
            && self.parent_task_id.is_none()
            && self.order_index.is_none()
            && self.assignee_ids.is_none()
            && self.label_ids.is_none()
    }
}

fn locate_task(store: &WorkItemStore, caller: &Caller, task_id: Uuid) -> CoreResult<Uuid> {
    store
        .locate(caller, |tenant| tenant.tasks.contains_key(&task_id))
        .ok_or_else(|| CoreError::not_found("Task"))
}

fn load_task(tenant: &Tenant, task_id: Uuid) -> CoreResult<Task> {
    tenant
        .get_task(task_id)
        .cloned()
        .ok_or_else(|| CoreError::not_found("Task"))
}

fn check_epic(tenant: &Tenant, project_id: Uuid, epic_id: Option<Uuid>) -> CoreResult<()> {
    let Some(epic_id) = epic_id else {
        return Ok(());
    };
    let epic = tenant
        .epics
        .get(&epic_id)
        .ok_or_else(|| CoreError::not_found("Epic"))?;
    if epic.project_id != project_id {
        return Err(CoreError::validation(
            "epic must belong to the same project",
        ));
    }
    Ok(())
}

/// Checks that `parent_id` may become the parent of `task_id` (`None` for a
/// task being created). Subtasks are one level deep.
fn check_parent(
    tenant: &Tenant,
    project_id: Uuid,
    task_id: Option<Uuid>,
    parent_id: Option<Uuid>,
) -> CoreResult<()> {
    let Some(parent_id) = parent_id else {
        return Ok(());
    };
    let parent = tenant
        .get_task(parent_id)
        .ok_or_else(|| CoreError::not_found("Task"))?;

    if parent.project_id != project_id {
        return Err(CoreError::validation(
            "parent task must belong to the same project",
        ));
    }
    if let Some(task_id) = task_id {
        if tenant.is_ancestor_or_self(task_id, parent_id) {
            return Err(CoreError::validation("a task cannot be its own ancestor"));
        }
        if tenant.subtasks_of(task_id).next().is_some() {
            return Err(CoreError::validation(
                "a task with subtasks cannot become a subtask",
            ));
        }
    }
    if parent.parent_task_id.is_some() {
        return Err(CoreError::validation("subtasks cannot have subtasks"));
    }
    Ok(())
}

fn check_assignees(tenant: &Tenant, ids: Vec<Uuid>) -> CoreResult<BTreeSet<Uuid>> {
    let ids: BTreeSet<Uuid> = ids.into_iter().collect();
    if ids.iter().any(|id| !tenant.is_member(*id)) {
        return Err(CoreError::not_found("User"));
    }
    Ok(ids)
}

fn check_labels(tenant: &Tenant, ids: Vec<Uuid>) -> CoreResult<BTreeSet<Uuid>> {
    let ids: BTreeSet<Uuid> = ids.into_iter().collect();
    if ids.iter().any(|id| !tenant.labels.contains_key(id)) {
        return Err(CoreError::not_found("Label"));
    }
    Ok(ids)
}

fn notify_assigned(tx: &mut TenantTx<'_>, caller: &Caller, task: &Task, users: &[Uuid]) {
    for user_id in users.iter().filter(|id| **id != caller.user_id) {
        tx.notify(
            *user_id,
            "New assignment".to_string(),
            format!("You were assigned to {}", task.title),
        );
    }
}

/// Creates a task with its assignees and labels in one commit. The task gets
/// the next order index of its project.
pub fn create_task(
    store: &WorkItemStore,
    caller: &Caller,
    parameters: CreateTaskParameters,
) -> CoreResult<TaskView> {
    let title = rules::text("title", parameters.title, 200)?;
    let description = rules::optional_text("description", parameters.description, 1000)?;
    let points = rules::points(parameters.points)?;
    rules::date_order(parameters.start_date, parameters.due_date)?;

    let project_id = parameters.project_id;
    let organization_id = store
        .locate(caller, |tenant| tenant.projects.contains_key(&project_id))
        .ok_or_else(|| CoreError::not_found("Project"))?;

    let view = store.transact(organization_id, |tx| {
        tx.authorize(caller, Action::CreateTask)?;
        check_epic(&tx.tenant, project_id, parameters.epic_id)?;
        check_parent(&tx.tenant, project_id, None, parameters.parent_task_id)?;
        let assignees = check_assignees(&tx.tenant, parameters.assignee_ids)?;
        let labels = check_labels(&tx.tenant, parameters.label_ids)?;

        let project = tx
            .tenant
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| CoreError::not_found("Project"))?;
        let order_index = project.next_order_index;
        project.next_order_index += 1;

        let task = Task {
            id: Uuid::new_v4(),
            project_id,
            epic_id: parameters.epic_id,
            parent_task_id: parameters.parent_task_id,
            title,
            description,
            status: parameters.status,
            priority: parameters.priority,
            points,
            start_date: parameters.start_date,
            due_date: parameters.due_date,
            order_index,
            created_by_id: caller.user_id,
            created_at: tx.now,
            updated_at: tx.now,
        };

        tx.tenant.tasks.insert(task.id, task.clone());
        tx.tenant
            .assignees
            .extend(assignees.iter().map(|user_id| TaskAssignee {
                task_id: task.id,
                user_id: *user_id,
            }));
        tx.tenant
            .task_labels
            .extend(labels.iter().map(|label_id| TaskLabel {
                task_id: task.id,
                label_id: *label_id,
            }));

        tx.record_activity(
            caller.user_id,
            ActivityKind::TaskCreated,
            Some(project_id),
            Some(task.id),
            json!({ "title": task.title }),
        );
        let assigned: Vec<Uuid> = assignees.into_iter().collect();
        notify_assigned(tx, caller, &task, &assigned);

        let view = tx.tenant.task_view(&task);
        tx.emit(Scope::Project(project_id), EventKind::TaskCreated, &view);
        Ok(view)
    })?;

    info!(
        org_id = %organization_id,
        project_id = %project_id,
        task_id = %view.task.id,
        order_index = view.task.order_index,
        "Task created"
    );
    Ok(view)
}

/// Applies `patch` to a task. Every change is gated by `MoveTask` and
/// recorded as a single activity.
pub fn update_task(
    store: &WorkItemStore,
    caller: &Caller,
    task_id: Uuid,
    patch: TaskPatch,
) -> CoreResult<TaskView> {
    let organization_id = locate_task(store, caller, task_id)?;

    if patch.is_empty() {
        return store
            .read_tenant(organization_id, |tenant| -> CoreResult<TaskView> {
                let role = tenant
                    .role_of(caller.user_id)
                    .ok_or_else(|| CoreError::not_found("Task"))?;
                access::require(role, Action::MoveTask)?;
                let task = tenant
                    .get_task(task_id)
                    .ok_or_else(|| CoreError::not_found("Task"))?;
                Ok(tenant.task_view(task))
            })
            .ok_or_else(|| CoreError::not_found("Task"))?;
    }

    store.transact(organization_id, |tx| {
        tx.authorize(caller, Action::MoveTask)?;
        let mut task = load_task(&tx.tenant, task_id)?;
        let project_id = task.project_id;
        let mut changed = vec![];

        if let Some(title) = patch.title {
            task.title = rules::text("title", title, 200)?;
            changed.push("title");
        }
        if let Some(description) = patch.description {
            task.description = rules::optional_text("description", description, 1000)?;
            changed.push("description");
        }
        let previous_status = task.status;
        if let Some(status) = patch.status {
            task.status = status;
            changed.push("status");
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
            changed.push("priority");
        }
        if let Some(points) = patch.points {
            task.points = rules::points(points)?;
            changed.push("points");
        }
        if let Some(start_date) = patch.start_date {
            task.start_date = start_date;
            changed.push("startDate");
        }
        if let Some(due_date) = patch.due_date {
            task.due_date = due_date;
            changed.push("dueDate");
        }
        rules::date_order(task.start_date, task.due_date)?;

        if let Some(epic_id) = patch.epic_id {
            check_epic(&tx.tenant, project_id, epic_id)?;
            task.epic_id = epic_id;
            changed.push("epicId");
        }
        if let Some(parent_task_id) = patch.parent_task_id {
            check_parent(&tx.tenant, project_id, Some(task_id), parent_task_id)?;
            task.parent_task_id = parent_task_id;
            changed.push("parentTaskId");
        }

        let previous_index = task.order_index;
        let mut swapped = None;
        if let Some(target) = patch.order_index {
            changed.push("orderIndex");
            if target != previous_index {
                swapped = reorder(tx, &task, target)?;
                task.order_index = target;
            }
        }

        let mut newly_assigned = vec![];
        let mut assignees_changed = false;
        if let Some(ids) = patch.assignee_ids {
            let next = check_assignees(&tx.tenant, ids)?;
            let current: BTreeSet<Uuid> = tx.tenant.assignee_ids(task_id).into_iter().collect();
            newly_assigned = next.difference(&current).copied().collect();
            assignees_changed = next != current;

            tx.tenant.assignees.retain(|a| a.task_id != task_id);
            tx.tenant
                .assignees
                .extend(next.into_iter().map(|user_id| TaskAssignee { task_id, user_id }));
            changed.push("assigneeIds");
        }
        if let Some(ids) = patch.label_ids {
            let next = check_labels(&tx.tenant, ids)?;
            tx.tenant.task_labels.retain(|l| l.task_id != task_id);
            tx.tenant
                .task_labels
                .extend(next.into_iter().map(|label_id| TaskLabel { task_id, label_id }));
            changed.push("labelIds");
        }

        task.updated_at = tx.now;
        tx.tenant.tasks.insert(task_id, task.clone());

        let status_changed = task.status != previous_status;
        let moved = task.order_index != previous_index;
        let activity = if assignees_changed {
            ActivityKind::TaskAssigned
        } else if status_changed {
            ActivityKind::TaskStatusChanged
        } else if moved {
            ActivityKind::TaskMoved
        } else {
            ActivityKind::TaskUpdated
        };
        let mut meta = json!({ "changed": changed });
        if status_changed {
            meta["from"] = json!(previous_status);
            meta["to"] = json!(task.status);
        }
        if assignees_changed {
            meta["assigned"] = json!(newly_assigned);
        }
        tx.record_activity(caller.user_id, activity, Some(project_id), Some(task_id), meta);
        notify_assigned(tx, caller, &task, &newly_assigned);

        let kind = if status_changed || moved {
            EventKind::TaskMoved
        } else {
            EventKind::TaskUpdated
        };
        let view = tx.tenant.task_view(&task);
        tx.emit(Scope::Project(project_id), kind, &view);
        tx.emit(Scope::Task(task_id), kind, &view);

        if let Some(other) = swapped {
            let other_view = tx.tenant.task_view(&other);
            tx.emit(Scope::Project(project_id), EventKind::TaskMoved, &other_view);
            tx.emit(Scope::Task(other.id), EventKind::TaskMoved, &other_view);
        }

        Ok(view)
    })
}

/// Moves `task` to `target` within its project. A task already holding
/// `target` takes the old index; the swapped task is returned.
fn reorder(tx: &mut TenantTx<'_>, task: &Task, target: u64) -> CoreResult<Option<Task>> {
    let holder = tx
        .tenant
        .tasks_in_project(task.project_id)
        .find(|t| t.order_index == target && t.id != task.id)
        .map(|t| t.id);

    if let Some(holder) = holder {
        let now = tx.now;
        let other = tx
            .tenant
            .tasks
            .get_mut(&holder)
            .ok_or_else(|| CoreError::not_found("Task"))?;
        other.order_index = task.order_index;
        other.updated_at = now;
        return Ok(Some(other.clone()));
    }

    let project = tx
        .tenant
        .projects
        .get_mut(&task.project_id)
        .ok_or_else(|| CoreError::not_found("Project"))?;
    if target >= project.next_order_index {
        project.next_order_index = target + 1;
    }
    Ok(None)
}

/// Deletes a task together with its subtasks and everything attached to
/// them. One activity is recorded for the task that was asked for.
pub fn delete_task(
    store: &WorkItemStore,
    caller: &Caller,
    task_id: Uuid,
) -> CoreResult<CascadeReport> {
    let organization_id = locate_task(store, caller, task_id)?;

    let report = store.transact(organization_id, |tx| {
        tx.authorize(caller, Action::DeleteTask)?;
        let task = load_task(&tx.tenant, task_id)?;
        let report = tx.tenant.remove_task_cascade(task_id);

        tx.record_activity(
            caller.user_id,
            ActivityKind::TaskDeleted,
            Some(task.project_id),
            None,
            json!({ "taskId": task_id, "title": task.title, "removedTaskIds": report.task_ids }),
        );

        let payload = json!({ "id": task_id, "projectId": task.project_id, "removed": report });
        tx.emit(Scope::Project(task.project_id), EventKind::TaskDeleted, &payload);
        for removed in &report.task_ids {
            tx.emit(Scope::Task(*removed), EventKind::TaskDeleted, &payload);
        }
        Ok(report)
    })?;

    info!(
        org_id = %organization_id,
        task_id = %task_id,
        removed = report.task_ids.len(),
        "Task deleted"
    );
    Ok(report)
}

pub fn get_task(store: &WorkItemStore, caller: &Caller, task_id: Uuid) -> CoreResult<TaskView> {
    let organization_id = locate_task(store, caller, task_id)?;

    let view = store
        .read_tenant(organization_id, |tenant| -> CoreResult<TaskView> {
            let role = tenant
                .role_of(caller.user_id)
                .ok_or_else(|| CoreError::not_found("Task"))?;
            access::require(role, Action::ViewTask)?;
            let task = tenant
                .get_task(task_id)
                .ok_or_else(|| CoreError::not_found("Task"))?;
            Ok(tenant.task_view(task))
        })
        .ok_or_else(|| CoreError::not_found("Task"))??;

    debug!(task_id = %task_id, "Task read");
    Ok(view)
}

pub struct AttachFileParameters {
    pub task_id: Uuid,
    pub name: String,
    pub url: String,
    pub size: u64,
}

/// Records an uploaded file against a task. The bytes live elsewhere.
pub fn attach_file(
    store: &WorkItemStore,
    caller: &Caller,
    parameters: AttachFileParameters,
) -> CoreResult<FileAttachment> {
    let name = rules::text("name", parameters.name, 255)?;
    let url = rules::text("url", parameters.url, 2048)?;
    let organization_id = locate_task(store, caller, parameters.task_id)?;

    store.transact(organization_id, |tx| {
        tx.authorize(caller, Action::CreateTask)?;
        let task = load_task(&tx.tenant, parameters.task_id)?;

        let file = FileAttachment {
            id: Uuid::new_v4(),
            task_id: task.id,
            name,
            url,
            size: parameters.size,
            uploaded_by_id: caller.user_id,
            created_at: tx.now,
        };
        tx.tenant.files.insert(file.id, file.clone());

        tx.record_activity(
            caller.user_id,
            ActivityKind::FileAttached,
            Some(task.project_id),
            Some(task.id),
            json!({ "fileId": file.id, "name": file.name }),
        );
        let view = tx.tenant.task_view(&task);
        tx.emit(Scope::Task(task.id), EventKind::TaskUpdated, &view);
        Ok(file)
    })
}
