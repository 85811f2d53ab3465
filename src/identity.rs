//! Caller identity as handed to the core by the authentication layer.

use uuid::Uuid;

use crate::{
    access::Role,
    error::{CoreError, CoreResult},
    store::WorkItemStore,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MembershipGrant {
    pub organization_id: Uuid,
    pub role: Role,
}

/// An authenticated user and the organizations they belonged to when the
/// request started. Services re-read the role under the tenant lock, so a
/// stale grant can narrow what a caller sees but never widen it.
#[derive(Clone, Debug)]
pub struct Caller {
    pub user_id: Uuid,
    pub memberships: Vec<MembershipGrant>,
}

impl Caller {
    pub fn new(user_id: Uuid, memberships: Vec<MembershipGrant>) -> Self {
        Self {
            user_id,
            memberships,
        }
    }

    pub fn organization_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.memberships.iter().map(|m| m.organization_id)
    }

    pub fn role_in(&self, organization_id: Uuid) -> Option<Role> {
        self.memberships
            .iter()
            .find(|m| m.organization_id == organization_id)
            .map(|m| m.role)
    }
}

/// Builds a [`Caller`] for `user_id`. `None` or an unknown user is
/// [`CoreError::Unauthenticated`].
pub fn resolve_caller(store: &WorkItemStore, user_id: Option<Uuid>) -> CoreResult<Caller> {
    let user_id = user_id.ok_or(CoreError::Unauthenticated)?;

    if store.directory().get_user(user_id).is_none() {
        return Err(CoreError::Unauthenticated);
    }

    let memberships = store
        .organizations_of(user_id)
        .into_iter()
        .filter_map(|organization_id| {
            store
                .read_tenant(organization_id, |tenant| tenant.role_of(user_id))
                .flatten()
                .map(|role| MembershipGrant {
                    organization_id,
                    role,
                })
        })
        .collect();

    Ok(Caller::new(user_id, memberships))
}

/// Same as [`resolve_caller`] keyed by email, as the CLI identifies users.
pub fn resolve_caller_by_email(store: &WorkItemStore, email: Option<&str>) -> CoreResult<Caller> {
    let user_id = email.and_then(|email| {
        store
            .directory()
            .find_user_by_email(email)
            .map(|user| user.id)
    });
    resolve_caller(store, user_id)
}
