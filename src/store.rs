//! The work-item store handle.
//!
//! Rows are sharded per organization. Each shard sits behind its own lock, so
//! writers in different organizations never wait on each other, while writers
//! in the same organization are serialized. A mutation runs against a copy of
//! the shard; the copy is persisted and swapped in only if the whole operation
//! succeeded, which makes every operation all-or-nothing.
//!
//! Lock order: shard, then directory, then membership index. The shard map
//! lock is only ever held on its own.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use jiff::Timestamp;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    access::{self, Action, Role},
    error::{CoreError, CoreResult},
    identity::Caller,
    models::{
        activity::{Activity, ActivityKind},
        directory::Directory,
        notification::Notification,
        tenant::Tenant,
    },
    realtime::{Dispatch, EventKind, RealtimeHub, Scope},
    storage::Storage,
};

type Shard = Arc<RwLock<Tenant>>;

pub struct WorkItemStore {
    storage: Arc<dyn Storage>,
    directory: RwLock<Directory>,
    tenants: RwLock<HashMap<Uuid, Shard>>,
    /// user id to the organizations they belong to; derived from the shards
    memberships: RwLock<HashMap<Uuid, BTreeSet<Uuid>>>,
    realtime: RealtimeHub,
}

impl WorkItemStore {
    /// Loads every document from `storage` and takes ownership of it.
    pub fn open(storage: Arc<dyn Storage>, realtime: RealtimeHub) -> CoreResult<Self> {
        let snapshot = storage.load()?;

        let mut tenants = HashMap::with_capacity(snapshot.tenants.len());
        let mut memberships: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();
        for tenant in snapshot.tenants {
            for membership in &tenant.memberships {
                memberships
                    .entry(membership.user_id)
                    .or_default()
                    .insert(tenant.id());
            }
            tenants.insert(tenant.id(), Arc::new(RwLock::new(tenant)));
        }

        info!(
            users = snapshot.directory.users.len(),
            organizations = tenants.len(),
            "Work-item store opened"
        );

        Ok(Self {
            storage,
            directory: RwLock::new(snapshot.directory),
            tenants: RwLock::new(tenants),
            memberships: RwLock::new(memberships),
            realtime,
        })
    }

    pub fn realtime(&self) -> &RealtimeHub {
        &self.realtime
    }

    pub fn directory(&self) -> RwLockReadGuard<'_, Directory> {
        self.directory.read()
    }

    /// Organizations `user_id` currently belongs to.
    pub fn organizations_of(&self, user_id: Uuid) -> Vec<Uuid> {
        self.memberships
            .read()
            .get(&user_id)
            .map(|orgs| orgs.iter().copied().collect())
            .unwrap_or_default()
    }

    fn shard(&self, organization_id: Uuid) -> Option<Shard> {
        self.tenants.read().get(&organization_id).cloned()
    }

    /// Runs `f` against a consistent view of one organization.
    pub fn read_tenant<T>(&self, organization_id: Uuid, f: impl FnOnce(&Tenant) -> T) -> Option<T> {
        let shard = self.shard(organization_id)?;
        let tenant = shard.read();
        Some(f(&tenant))
    }

    /// First organization of `caller` that still counts them as a member and
    /// satisfies `found`. Anything else is invisible to the caller.
    pub(crate) fn locate(&self, caller: &Caller, found: impl Fn(&Tenant) -> bool) -> Option<Uuid> {
        caller.organization_ids().find(|organization_id| {
            self.read_tenant(*organization_id, |tenant| {
                tenant.is_member(caller.user_id) && found(tenant)
            })
            .unwrap_or(false)
        })
    }

    /// Applies `op` to a copy of the directory and persists it before it
    /// becomes visible.
    pub(crate) fn update_directory<T>(
        &self,
        op: impl FnOnce(&mut Directory) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut current = self.directory.write();
        let mut draft = current.clone();
        let value = op(&mut draft)?;
        self.storage.save_directory(&draft)?;
        *current = draft;
        Ok(value)
    }

    /// Persists a tenant that is not reachable yet.
    pub(crate) fn persist_new_tenant(&self, tenant: &Tenant) -> CoreResult<()> {
        self.storage.save_tenant(tenant)?;
        Ok(())
    }

    /// Makes an already persisted tenant reachable.
    pub(crate) fn register_tenant(&self, tenant: Tenant) {
        let organization_id = tenant.id();
        {
            let mut index = self.memberships.write();
            for membership in &tenant.memberships {
                index
                    .entry(membership.user_id)
                    .or_default()
                    .insert(organization_id);
            }
        }
        self.tenants
            .write()
            .insert(organization_id, Arc::new(RwLock::new(tenant)));
    }

    /// Runs `op` as one transaction on one organization.
    ///
    /// Nothing `op` does is visible unless it returns `Ok` and the tenant
    /// document is saved. Events it emitted are enqueued on the realtime hub
    /// before the lock is released; enqueueing never waits on delivery.
    pub(crate) fn transact<T>(
        &self,
        organization_id: Uuid,
        op: impl FnOnce(&mut TenantTx<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let shard = self
            .shard(organization_id)
            .ok_or_else(|| CoreError::not_found("Organization"))?;

        let (value, events) = {
            let mut current = shard.write();
            let mut tx = TenantTx::begin(self, current.clone());
            let value = op(&mut tx)?;

            let TenantTx {
                tenant,
                outbox,
                roster,
                ..
            } = tx;
            self.storage.save_tenant(&tenant)?;
            *current = tenant;
            self.apply_roster(organization_id, roster);

            // Enqueued under the lock: each channel keeps commit order.
            let events = outbox.len();
            for dispatch in outbox {
                self.realtime.dispatch(dispatch);
            }
            (value, events)
        };

        debug!(org_id = %organization_id, events, "Transaction committed");
        Ok(value)
    }

    fn apply_roster(&self, organization_id: Uuid, roster: Vec<RosterChange>) {
        if roster.is_empty() {
            return;
        }
        let mut index = self.memberships.write();
        for change in roster {
            match change {
                RosterChange::Joined(user_id) => {
                    index.entry(user_id).or_default().insert(organization_id);
                }
                RosterChange::Left(user_id) => {
                    if let Some(orgs) = index.get_mut(&user_id) {
                        orgs.remove(&organization_id);
                    }
                }
            }
        }
    }
}

pub(crate) enum RosterChange {
    Joined(Uuid),
    Left(Uuid),
}

/// A pending change to one organization.
pub(crate) struct TenantTx<'a> {
    pub tenant: Tenant,
    pub now: Timestamp,
    store: &'a WorkItemStore,
    outbox: Vec<Dispatch>,
    roster: Vec<RosterChange>,
}

impl<'a> TenantTx<'a> {
    fn begin(store: &'a WorkItemStore, tenant: Tenant) -> Self {
        Self {
            tenant,
            now: Timestamp::now(),
            store,
            outbox: vec![],
            roster: vec![],
        }
    }

    pub fn organization_id(&self) -> Uuid {
        self.tenant.id()
    }

    /// The caller's current role here. Not being a member is an access error.
    pub fn role_of(&self, caller: &Caller) -> CoreResult<Role> {
        self.tenant
            .role_of(caller.user_id)
            .ok_or_else(|| CoreError::Access("not a member of this organization".to_string()))
    }

    pub fn authorize(&self, caller: &Caller, action: Action) -> CoreResult<Role> {
        let role = self.role_of(caller)?;
        access::require(role, action)?;
        Ok(role)
    }

    pub fn user_exists(&self, user_id: Uuid) -> bool {
        self.store.directory.read().get_user(user_id).is_some()
    }

    pub fn emit(&mut self, scope: Scope, kind: EventKind, payload: &impl Serialize) {
        match serde_json::to_value(payload) {
            Ok(payload) => self.outbox.push(Dispatch {
                scope,
                kind,
                payload,
            }),
            Err(e) => warn!(event = kind.wire_name(), error = %e, "Failed to encode event payload"),
        }
    }

    pub fn record_activity(
        &mut self,
        actor_id: Uuid,
        kind: ActivityKind,
        project_id: Option<Uuid>,
        task_id: Option<Uuid>,
        meta: Value,
    ) {
        self.tenant.activities.push(Activity {
            id: Uuid::new_v4(),
            kind,
            meta,
            project_id,
            task_id,
            actor_id,
            created_at: self.now,
        });
    }

    /// Stores a notification for `user_id` and queues it on their channel.
    pub fn notify(&mut self, user_id: Uuid, title: String, body: String) {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            organization_id: self.organization_id(),
            title,
            body,
            read: false,
            created_at: self.now,
        };
        self.emit(
            Scope::User(user_id),
            EventKind::NotificationCreated,
            &notification,
        );
        self.tenant
            .notifications
            .insert(notification.id, notification);
    }

    pub fn member_joined(&mut self, user_id: Uuid) {
        self.roster.push(RosterChange::Joined(user_id));
    }

    pub fn member_left(&mut self, user_id: Uuid) {
        self.roster.push(RosterChange::Left(user_id));
    }
}
