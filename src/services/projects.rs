use jiff::civil::Date;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    access::Action,
    error::{CoreError, CoreResult},
    identity::Caller,
    models::{
        activity::ActivityKind,
        epic::Epic,
        label::Label,
        project::Project,
        task::{Priority, Status},
        tenant::Tenant,
    },
    realtime::{EventKind, Scope},
    services::rules,
    store::WorkItemStore,
};

pub struct CreateProjectParameters {
    pub organization_id: Uuid,
    pub name: String,
    pub key: String,
    pub description: Option<String>,
    pub lead_id: Option<Uuid>,
    pub status: Status,
    pub priority: Priority,
    pub budget_cents: u64,
    pub start_date: Option<Date>,
    pub due_date: Option<Date>,
}

impl CreateProjectParameters {
    pub fn new(organization_id: Uuid, name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            organization_id,
            name: name.into(),
            key: key.into(),
            description: None,
            lead_id: None,
            status: Status::default(),
            priority: Priority::default(),
            budget_cents: 0,
            start_date: None,
            due_date: None,
        }
    }
}

fn ensure_key_free(tenant: &Tenant, key: &str, except: Option<Uuid>) -> CoreResult<()> {
    let taken = tenant
        .projects
        .values()
        .any(|p| p.key == key && Some(p.id) != except);
    if taken {
        Err(CoreError::conflict(format!(
            "project key '{key}' is already used in this organization"
        )))
    } else {
        Ok(())
    }
}

fn ensure_lead_is_member(tenant: &Tenant, lead_id: Option<Uuid>) -> CoreResult<()> {
    match lead_id {
        Some(lead) if !tenant.is_member(lead) => Err(CoreError::not_found("User")),
        _ => Ok(()),
    }
}

/// Any member of the organization may start a project.
pub fn create_project(
    store: &WorkItemStore,
    caller: &Caller,
    parameters: CreateProjectParameters,
) -> CoreResult<Project> {
    let name = rules::text("name", parameters.name, 100)?;
    rules::project_key(&parameters.key)?;
    let description = rules::optional_text("description", parameters.description, 500)?;
    rules::date_order(parameters.start_date, parameters.due_date)?;

    let organization_id = store
        .locate(caller, |tenant| tenant.id() == parameters.organization_id)
        .ok_or_else(|| CoreError::not_found("Organization"))?;

    let project = store.transact(organization_id, |tx| {
        tx.role_of(caller)?;
        ensure_key_free(&tx.tenant, &parameters.key, None)?;
        ensure_lead_is_member(&tx.tenant, parameters.lead_id)?;

        let project = Project {
            id: Uuid::new_v4(),
            organization_id,
            name,
            key: parameters.key,
            description,
            lead_id: parameters.lead_id,
            status: parameters.status,
            priority: parameters.priority,
            budget_cents: parameters.budget_cents,
            start_date: parameters.start_date,
            due_date: parameters.due_date,
            next_order_index: 1,
            created_at: tx.now,
            updated_at: tx.now,
        };
        tx.tenant.projects.insert(project.id, project.clone());

        tx.record_activity(
            caller.user_id,
            ActivityKind::ProjectCreated,
            Some(project.id),
            None,
            json!({ "name": project.name, "key": project.key }),
        );
        tx.emit(
            Scope::Organization(organization_id),
            EventKind::ProjectCreated,
            &project,
        );
        Ok(project)
    })?;

    info!(org_id = %organization_id, project_id = %project.id, key = %project.key, "Project created");
    Ok(project)
}

/// Partial project update. Nested options clear a field with `Some(None)`.
#[derive(Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub key: Option<String>,
    pub description: Option<Option<String>>,
    pub lead_id: Option<Option<Uuid>>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub budget_cents: Option<u64>,
    pub start_date: Option<Option<Date>>,
    pub due_date: Option<Option<Date>>,
}

pub fn update_project(
    store: &WorkItemStore,
    caller: &Caller,
    project_id: Uuid,
    patch: ProjectPatch,
) -> CoreResult<Project> {
    let organization_id = store
        .locate(caller, |tenant| tenant.projects.contains_key(&project_id))
        .ok_or_else(|| CoreError::not_found("Project"))?;

    store.transact(organization_id, |tx| {
        tx.authorize(caller, Action::EditProject)?;
        let mut project = tx
            .tenant
            .projects
            .get(&project_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Project"))?;
        let mut changed = vec![];

        if let Some(name) = patch.name {
            project.name = rules::text("name", name, 100)?;
            changed.push("name");
        }
        if let Some(key) = patch.key {
            rules::project_key(&key)?;
            ensure_key_free(&tx.tenant, &key, Some(project_id))?;
            project.key = key;
            changed.push("key");
        }
        if let Some(description) = patch.description {
            project.description = rules::optional_text("description", description, 500)?;
            changed.push("description");
        }
        if let Some(lead_id) = patch.lead_id {
            ensure_lead_is_member(&tx.tenant, lead_id)?;
            project.lead_id = lead_id;
            changed.push("leadId");
        }
        if let Some(status) = patch.status {
            project.status = status;
            changed.push("status");
        }
        if let Some(priority) = patch.priority {
            project.priority = priority;
            changed.push("priority");
        }
        if let Some(budget) = patch.budget_cents {
            project.budget_cents = budget;
            changed.push("budget");
        }
        if let Some(start_date) = patch.start_date {
            project.start_date = start_date;
            changed.push("startDate");
        }
        if let Some(due_date) = patch.due_date {
            project.due_date = due_date;
            changed.push("dueDate");
        }
        rules::date_order(project.start_date, project.due_date)?;

        project.updated_at = tx.now;
        tx.tenant.projects.insert(project_id, project.clone());

        tx.record_activity(
            caller.user_id,
            ActivityKind::ProjectUpdated,
            Some(project_id),
            None,
            json!({ "changed": changed }),
        );
        tx.emit(
            Scope::Organization(organization_id),
            EventKind::ProjectUpdated,
            &project,
        );
        Ok(project)
    })
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub task_count: usize,
    pub epic_count: usize,
}

/// Projects of one organization, newest first.
pub fn list_projects(
    store: &WorkItemStore,
    caller: &Caller,
    organization_id: Uuid,
) -> CoreResult<Vec<ProjectSummary>> {
    let organization_id = store
        .locate(caller, |tenant| tenant.id() == organization_id)
        .ok_or_else(|| CoreError::not_found("Organization"))?;

    let mut projects = store
        .read_tenant(organization_id, |tenant| {
            tenant
                .projects
                .values()
                .map(|project| ProjectSummary {
                    task_count: tenant.tasks_in_project(project.id).count(),
                    epic_count: tenant
                        .epics
                        .values()
                        .filter(|e| e.project_id == project.id)
                        .count(),
                    project: project.clone(),
                })
                .collect::<Vec<_>>()
        })
        .ok_or_else(|| CoreError::not_found("Organization"))?;

    projects.sort_by(|a, b| b.project.created_at.cmp(&a.project.created_at));
    Ok(projects)
}

pub struct CreateEpicParameters {
    pub project_id: Uuid,
    pub name: String,
}

pub fn create_epic(
    store: &WorkItemStore,
    caller: &Caller,
    parameters: CreateEpicParameters,
) -> CoreResult<Epic> {
    let name = rules::text("name", parameters.name, 100)?;
    let organization_id = store
        .locate(caller, |tenant| {
            tenant.projects.contains_key(&parameters.project_id)
        })
        .ok_or_else(|| CoreError::not_found("Project"))?;

    store.transact(organization_id, |tx| {
        tx.authorize(caller, Action::EditProject)?;
        if !tx.tenant.projects.contains_key(&parameters.project_id) {
            return Err(CoreError::not_found("Project"));
        }

        let epic = Epic {
            id: Uuid::new_v4(),
            project_id: parameters.project_id,
            name,
            created_at: tx.now,
        };
        tx.tenant.epics.insert(epic.id, epic.clone());
        Ok(epic)
    })
}

pub struct CreateLabelParameters {
    pub organization_id: Uuid,
    pub name: String,
    pub color: String,
}

pub fn create_label(
    store: &WorkItemStore,
    caller: &Caller,
    parameters: CreateLabelParameters,
) -> CoreResult<Label> {
    let name = rules::text("name", parameters.name, 50)?;
    rules::color(&parameters.color)?;
    let organization_id = store
        .locate(caller, |tenant| tenant.id() == parameters.organization_id)
        .ok_or_else(|| CoreError::not_found("Organization"))?;

    store.transact(organization_id, |tx| {
        tx.authorize(caller, Action::EditProject)?;
        let label = Label {
            id: Uuid::new_v4(),
            organization_id,
            name,
            color: parameters.color.to_lowercase(),
            created_at: tx.now,
        };
        tx.tenant.labels.insert(label.id, label.clone());
        Ok(label)
    })
}
