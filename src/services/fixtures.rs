//! Shared setup for service tests.

use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
    access::Role,
    identity::{Caller, resolve_caller},
    realtime::{Dispatch, EventQueue, RealtimeHub},
    services::{
        memberships::{AddMemberParameters, add_member},
        organizations::{
            CreateOrganizationParameters, CreateUserParameters, create_organization, create_user,
        },
        projects::{CreateProjectParameters, create_project},
        tasks::{CreateTaskParameters, create_task},
    },
    storage::memory::MemoryStorage,
    store::WorkItemStore,
};

pub(crate) struct Fixture {
    pub store: WorkItemStore,
    pub storage: Arc<MemoryStorage>,
    queue: Mutex<EventQueue>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_queue_capacity(crate::realtime::DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(capacity: usize) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let (hub, queue) = RealtimeHub::bounded(capacity);
        let store = WorkItemStore::open(storage.clone(), hub).unwrap();
        Self {
            store,
            storage,
            queue: Mutex::new(queue),
        }
    }

    pub fn user(&self, email: &str) -> Uuid {
        create_user(
            &self.store,
            CreateUserParameters {
                email: email.to_string(),
                name: None,
            },
        )
        .unwrap()
        .id
    }

    pub fn caller(&self, user_id: Uuid) -> Caller {
        resolve_caller(&self.store, Some(user_id)).unwrap()
    }

    /// An organization with slug `slug` and a fresh owner.
    pub fn organization(&self, slug: &str) -> (Uuid, Uuid) {
        let owner = self.user(&format!("owner@{slug}.test"));
        let organization = create_organization(
            &self.store,
            &self.caller(owner),
            CreateOrganizationParameters {
                name: slug.to_string(),
                slug: Some(slug.to_string()),
            },
        )
        .unwrap();
        (organization.id, owner)
    }

    pub fn member(&self, organization_id: Uuid, email: &str, role: Role) -> Uuid {
        let user_id = self.user(email);
        let owner = self
            .store
            .read_tenant(organization_id, |tenant| {
                tenant
                    .memberships
                    .iter()
                    .find(|m| m.role == Role::Owner)
                    .map(|m| m.user_id)
            })
            .flatten()
            .unwrap();

        add_member(
            &self.store,
            &self.caller(owner),
            AddMemberParameters {
                organization_id,
                user_id,
                role,
            },
        )
        .unwrap();
        user_id
    }

    pub fn project(&self, organization_id: Uuid, user_id: Uuid, key: &str) -> Uuid {
        create_project(
            &self.store,
            &self.caller(user_id),
            CreateProjectParameters::new(organization_id, format!("Project {key}"), key),
        )
        .unwrap()
        .id
    }

    pub fn task(&self, project_id: Uuid, user_id: Uuid, title: &str) -> Uuid {
        self.assigned_task(project_id, user_id, title, vec![])
    }

    pub fn assigned_task(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        title: &str,
        assignee_ids: Vec<Uuid>,
    ) -> Uuid {
        let mut parameters = CreateTaskParameters::new(project_id, title);
        parameters.assignee_ids = assignee_ids;
        create_task(&self.store, &self.caller(user_id), parameters)
            .unwrap()
            .task
            .id
    }

    pub fn subtask(&self, parent: Uuid, project_id: Uuid, user_id: Uuid, title: &str) -> Uuid {
        let mut parameters = CreateTaskParameters::new(project_id, title);
        parameters.parent_task_id = Some(parent);
        create_task(&self.store, &self.caller(user_id), parameters)
            .unwrap()
            .task
            .id
    }

    /// Events published since the last call, in publish order.
    pub fn drain_events(&self) -> Vec<Dispatch> {
        self.queue.lock().try_drain()
    }
}
