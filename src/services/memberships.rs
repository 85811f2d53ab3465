use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    access::{Action, Role},
    error::{CoreError, CoreResult},
    identity::Caller,
    models::{activity::ActivityKind, membership::Membership},
    realtime::{EventKind, Scope},
    store::{TenantTx, WorkItemStore},
};

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    #[serde(flatten)]
    pub membership: Membership,
    pub email: String,
    pub name: Option<String>,
}

fn locate_organization(
    store: &WorkItemStore,
    caller: &Caller,
    organization_id: Uuid,
) -> CoreResult<Uuid> {
    store
        .locate(caller, |tenant| tenant.id() == organization_id)
        .ok_or_else(|| CoreError::not_found("Organization"))
}

/// Only an OWNER may hand out or take away the OWNER role.
fn guard_owner_role(caller_role: Role, touched: Role) -> CoreResult<()> {
    if touched == Role::Owner && caller_role != Role::Owner {
        Err(CoreError::Access(
            "only an owner may grant or revoke the owner role".to_string(),
        ))
    } else {
        Ok(())
    }
}

fn membership_index(tx: &TenantTx<'_>, user_id: Uuid) -> CoreResult<usize> {
    tx.tenant
        .memberships
        .iter()
        .position(|m| m.user_id == user_id)
        .ok_or_else(|| CoreError::not_found("Membership"))
}

pub struct AddMemberParameters {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

pub fn add_member(
    store: &WorkItemStore,
    caller: &Caller,
    parameters: AddMemberParameters,
) -> CoreResult<Membership> {
    let organization_id = locate_organization(store, caller, parameters.organization_id)?;

    let membership = store.transact(organization_id, |tx| {
        let caller_role = tx.authorize(caller, Action::InviteUser)?;
        guard_owner_role(caller_role, parameters.role)?;

        if !tx.user_exists(parameters.user_id) {
            return Err(CoreError::not_found("User"));
        }
        if tx.tenant.is_member(parameters.user_id) {
            return Err(CoreError::conflict("user is already a member"));
        }

        let membership = Membership {
            id: Uuid::new_v4(),
            user_id: parameters.user_id,
            organization_id,
            role: parameters.role,
            created_at: tx.now,
        };
        tx.tenant.memberships.push(membership.clone());
        tx.member_joined(parameters.user_id);

        tx.record_activity(
            caller.user_id,
            ActivityKind::MemberAdded,
            None,
            None,
            json!({ "userId": parameters.user_id, "role": parameters.role }),
        );
        let title = format!("You joined {}", tx.tenant.organization.name);
        tx.notify(
            parameters.user_id,
            title,
            format!("You were added as {}", parameters.role),
        );
        tx.emit(
            Scope::Organization(organization_id),
            EventKind::UserJoined,
            &json!({ "userId": parameters.user_id, "role": parameters.role }),
        );

        Ok(membership)
    })?;

    info!(org_id = %organization_id, user_id = %membership.user_id, role = %membership.role, "Member added");
    Ok(membership)
}

pub struct ChangeRoleParameters {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

pub fn change_role(
    store: &WorkItemStore,
    caller: &Caller,
    parameters: ChangeRoleParameters,
) -> CoreResult<Membership> {
    let organization_id = locate_organization(store, caller, parameters.organization_id)?;

    store.transact(organization_id, |tx| {
        let caller_role = tx.authorize(caller, Action::ManageRoles)?;
        let index = membership_index(tx, parameters.user_id)?;
        let previous = tx.tenant.memberships[index].role;

        guard_owner_role(caller_role, previous)?;
        guard_owner_role(caller_role, parameters.role)?;

        if previous == Role::Owner
            && parameters.role != Role::Owner
            && tx.tenant.owner_count() == 1
        {
            return Err(CoreError::conflict(
                "an organization must keep at least one owner",
            ));
        }

        tx.tenant.memberships[index].role = parameters.role;
        tx.record_activity(
            caller.user_id,
            ActivityKind::MemberRoleChanged,
            None,
            None,
            json!({ "userId": parameters.user_id, "from": previous, "to": parameters.role }),
        );

        Ok(tx.tenant.memberships[index].clone())
    })
}

pub struct RemoveMemberParameters {
    pub organization_id: Uuid,
    pub user_id: Uuid,
}

/// Removes a membership and the user's task assignments in the organization.
/// Anyone may remove themselves.
pub fn remove_member(
    store: &WorkItemStore,
    caller: &Caller,
    parameters: RemoveMemberParameters,
) -> CoreResult<()> {
    let organization_id = locate_organization(store, caller, parameters.organization_id)?;

    store.transact(organization_id, |tx| {
        let caller_role = if parameters.user_id == caller.user_id {
            tx.role_of(caller)?
        } else {
            tx.authorize(caller, Action::ManageRoles)?
        };

        let index = membership_index(tx, parameters.user_id)?;
        let removed_role = tx.tenant.memberships[index].role;

        if parameters.user_id != caller.user_id {
            guard_owner_role(caller_role, removed_role)?;
        }
        if removed_role == Role::Owner && tx.tenant.owner_count() == 1 {
            return Err(CoreError::conflict(
                "an organization must keep at least one owner",
            ));
        }

        tx.tenant.memberships.remove(index);
        tx.tenant
            .assignees
            .retain(|a| a.user_id != parameters.user_id);
        let now = tx.now;
        for project in tx.tenant.projects.values_mut() {
            if project.lead_id == Some(parameters.user_id) {
                project.lead_id = None;
                project.updated_at = now;
            }
        }
        tx.member_left(parameters.user_id);

        tx.record_activity(
            caller.user_id,
            ActivityKind::MemberRemoved,
            None,
            None,
            json!({ "userId": parameters.user_id }),
        );
        tx.emit(
            Scope::Organization(organization_id),
            EventKind::UserLeft,
            &json!({ "userId": parameters.user_id }),
        );
        Ok(())
    })
}

pub fn list_members(
    store: &WorkItemStore,
    caller: &Caller,
    organization_id: Uuid,
) -> CoreResult<Vec<MemberView>> {
    let organization_id = locate_organization(store, caller, organization_id)?;
    let memberships = store
        .read_tenant(organization_id, |tenant| tenant.memberships.clone())
        .ok_or_else(|| CoreError::not_found("Organization"))?;

    let directory = store.directory();
    Ok(memberships
        .into_iter()
        .filter_map(|membership| {
            let user = directory.get_user(membership.user_id)?;
            Some(MemberView {
                email: user.email.clone(),
                name: user.name.clone(),
                membership,
            })
        })
        .collect())
}
