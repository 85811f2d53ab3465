use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    access::Role,
    models::{
        activity::Activity,
        comment::Comment,
        epic::Epic,
        file::FileAttachment,
        label::Label,
        membership::Membership,
        notification::Notification,
        organization::Organization,
        project::Project,
        task::{Task, TaskAssignee, TaskLabel, TaskView},
        time_entry::TimeEntry,
    },
};

/// Current schema version of a tenant document
pub const TENANT_VERSION: u32 = 1;

/// Everything owned by one organization. Committed and persisted as a unit.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Tenant {
    pub version: u32,
    pub organization: Organization,
    pub memberships: Vec<Membership>,
    pub projects: BTreeMap<Uuid, Project>,
    pub epics: BTreeMap<Uuid, Epic>,
    pub labels: BTreeMap<Uuid, Label>,
    pub tasks: BTreeMap<Uuid, Task>,
    pub assignees: Vec<TaskAssignee>,
    pub task_labels: Vec<TaskLabel>,
    pub comments: BTreeMap<Uuid, Comment>,
    pub time_entries: BTreeMap<Uuid, TimeEntry>,
    pub files: BTreeMap<Uuid, FileAttachment>,
    pub activities: Vec<Activity>,
    pub notifications: BTreeMap<Uuid, Notification>,
}

/// Rows removed by a cascading task delete.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub task_ids: Vec<Uuid>,
    pub assignees: usize,
    pub labels: usize,
    pub comments: usize,
    pub time_entries: usize,
    pub files: usize,
}

impl Tenant {
    pub fn new(organization: Organization) -> Self {
        Self {
            version: TENANT_VERSION,
            organization,
            memberships: vec![],
            projects: BTreeMap::new(),
            epics: BTreeMap::new(),
            labels: BTreeMap::new(),
            tasks: BTreeMap::new(),
            assignees: vec![],
            task_labels: vec![],
            comments: BTreeMap::new(),
            time_entries: BTreeMap::new(),
            files: BTreeMap::new(),
            activities: vec![],
            notifications: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.organization.id
    }

    pub fn membership_of(&self, user_id: Uuid) -> Option<&Membership> {
        self.memberships.iter().find(|m| m.user_id == user_id)
    }

    pub fn role_of(&self, user_id: Uuid) -> Option<Role> {
        self.membership_of(user_id).map(|m| m.role)
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.membership_of(user_id).is_some()
    }

    pub fn owner_count(&self) -> usize {
        self.memberships
            .iter()
            .filter(|m| m.role == Role::Owner)
            .count()
    }

    pub fn get_task(&self, task_id: Uuid) -> Option<&Task> {
        self.tasks.get(&task_id)
    }

    pub fn tasks_in_project(&self, project_id: Uuid) -> impl Iterator<Item = &Task> {
        self.tasks.values().filter(move |t| t.project_id == project_id)
    }

    pub fn subtasks_of(&self, task_id: Uuid) -> impl Iterator<Item = &Task> {
        self.tasks
            .values()
            .filter(move |t| t.parent_task_id == Some(task_id))
    }

    pub fn assignee_ids(&self, task_id: Uuid) -> Vec<Uuid> {
        self.assignees
            .iter()
            .filter(|a| a.task_id == task_id)
            .map(|a| a.user_id)
            .collect()
    }

    pub fn label_ids(&self, task_id: Uuid) -> Vec<Uuid> {
        self.task_labels
            .iter()
            .filter(|l| l.task_id == task_id)
            .map(|l| l.label_id)
            .collect()
    }

    /// The running timer of `user_id` on `task_id`, if any.
    pub fn open_time_entry(&self, user_id: Uuid, task_id: Uuid) -> Option<&TimeEntry> {
        self.time_entries
            .values()
            .find(|e| e.user_id == user_id && e.task_id == task_id && e.is_open())
    }

    pub fn task_view(&self, task: &Task) -> TaskView {
        TaskView {
            task: task.clone(),
            assignee_ids: self.assignee_ids(task.id),
            label_ids: self.label_ids(task.id),
            subtask_count: self.subtasks_of(task.id).count(),
            comment_count: self.comments.values().filter(|c| c.task_id == task.id).count(),
            time_entry_count: self
                .time_entries
                .values()
                .filter(|e| e.task_id == task.id)
                .count(),
        }
    }

    /// True when `candidate` is `task_id` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, candidate: Uuid, task_id: Uuid) -> bool {
        let mut seen = BTreeSet::new();
        let mut cursor = Some(task_id);
        while let Some(id) = cursor {
            if id == candidate {
                return true;
            }
            if !seen.insert(id) {
                // Corrupt chain; treat as a cycle.
                return true;
            }
            cursor = self.tasks.get(&id).and_then(|t| t.parent_task_id);
        }
        false
    }

    /// `task_id` followed by all of its descendants, breadth first.
    pub fn cascade_ids(&self, task_id: Uuid) -> Vec<Uuid> {
        let mut ids = vec![task_id];
        let mut next = 0;
        while next < ids.len() {
            let parent = ids[next];
            let children: Vec<Uuid> = self
                .subtasks_of(parent)
                .map(|t| t.id)
                .filter(|id| !ids.contains(id))
                .collect();
            ids.extend(children);
            next += 1;
        }
        ids
    }

    /// Removes the task, its subtasks and every row hanging off them.
    /// Activities stay: they are append-only history.
    pub fn remove_task_cascade(&mut self, task_id: Uuid) -> CascadeReport {
        let task_ids = self.cascade_ids(task_id);
        let doomed: BTreeSet<Uuid> = task_ids.iter().copied().collect();

        let mut report = CascadeReport {
            task_ids,
            ..CascadeReport::default()
        };

        let before = self.assignees.len();
        self.assignees.retain(|a| !doomed.contains(&a.task_id));
        report.assignees = before - self.assignees.len();

        let before = self.task_labels.len();
        self.task_labels.retain(|l| !doomed.contains(&l.task_id));
        report.labels = before - self.task_labels.len();

        let before = self.comments.len();
        self.comments.retain(|_, c| !doomed.contains(&c.task_id));
        report.comments = before - self.comments.len();

        let before = self.time_entries.len();
        self.time_entries.retain(|_, e| !doomed.contains(&e.task_id));
        report.time_entries = before - self.time_entries.len();

        let before = self.files.len();
        self.files.retain(|_, f| !doomed.contains(&f.task_id));
        report.files = before - self.files.len();

        self.tasks.retain(|id, _| !doomed.contains(id));

        report
    }
}
