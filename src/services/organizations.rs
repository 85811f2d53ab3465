use jiff::Timestamp;
use slug::slugify;
use tracing::info;
use uuid::Uuid;

use crate::{
    access::{Action, Role},
    error::{CoreError, CoreResult},
    identity::Caller,
    models::{
        membership::Membership, organization::Organization, tenant::Tenant, user::User,
    },
    services::rules,
    store::WorkItemStore,
};

pub struct CreateUserParameters {
    pub email: String,
    pub name: Option<String>,
}

/// Registers a user. Emails are unique regardless of case.
pub fn create_user(store: &WorkItemStore, parameters: CreateUserParameters) -> CoreResult<User> {
    let email = rules::email(&parameters.email)?;
    let name = rules::optional_text("name", parameters.name, 100)?;

    let user = store.update_directory(|directory| {
        if directory.find_user_by_email(&email).is_some() {
            return Err(CoreError::conflict("email is already registered"));
        }

        let user = User {
            id: Uuid::new_v4(),
            email,
            name,
            created_at: Timestamp::now(),
        };
        directory.users.insert(user.id, user.clone());
        Ok(user)
    })?;

    info!(user_id = %user.id, "User created");
    Ok(user)
}

pub struct CreateOrganizationParameters {
    pub name: String,
    /// Derived from the name when absent
    pub slug: Option<String>,
}

/// Creates an organization with the caller as its first OWNER.
pub fn create_organization(
    store: &WorkItemStore,
    caller: &Caller,
    parameters: CreateOrganizationParameters,
) -> CoreResult<Organization> {
    let name = rules::text("name", parameters.name, 100)?;
    let slug = parameters.slug.unwrap_or_else(|| slugify(&name));
    rules::slug(&slug)?;

    let tenant = store.update_directory(|directory| {
        if directory.get_user(caller.user_id).is_none() {
            return Err(CoreError::Unauthenticated);
        }
        if directory.slugs.contains_key(&slug) {
            return Err(CoreError::conflict(format!(
                "organization slug '{slug}' is taken"
            )));
        }

        let now = Timestamp::now();
        let organization = Organization {
            id: Uuid::new_v4(),
            name,
            slug: slug.clone(),
            created_at: now,
        };

        let mut tenant = Tenant::new(organization);
        tenant.memberships.push(Membership {
            id: Uuid::new_v4(),
            user_id: caller.user_id,
            organization_id: tenant.id(),
            role: Role::Owner,
            created_at: now,
        });

        // The tenant document goes first; a directory that fails to save
        // leaves an unreferenced file that the next load ignores.
        store.persist_new_tenant(&tenant)?;
        directory.slugs.insert(slug.clone(), tenant.id());
        Ok(tenant)
    })?;

    let organization = tenant.organization.clone();
    store.register_tenant(tenant);

    info!(org_id = %organization.id, slug = %organization.slug, "Organization created");
    Ok(organization)
}

pub struct RenameOrganizationParameters {
    pub organization_id: Uuid,
    pub name: String,
}

/// The slug never changes.
pub fn rename_organization(
    store: &WorkItemStore,
    caller: &Caller,
    parameters: RenameOrganizationParameters,
) -> CoreResult<Organization> {
    let name = rules::text("name", parameters.name, 100)?;
    let organization_id = store
        .locate(caller, |tenant| tenant.id() == parameters.organization_id)
        .ok_or_else(|| CoreError::not_found("Organization"))?;

    store.transact(organization_id, |tx| {
        tx.authorize(caller, Action::ManageOrg)?;
        tx.tenant.organization.name = name;
        Ok(tx.tenant.organization.clone())
    })
}

/// Organizations the caller is a member of, by name.
pub fn list_organizations(store: &WorkItemStore, caller: &Caller) -> Vec<Organization> {
    let mut organizations: Vec<Organization> = store
        .organizations_of(caller.user_id)
        .into_iter()
        .filter_map(|id| store.read_tenant(id, |tenant| tenant.organization.clone()))
        .collect();
    organizations.sort_by(|a, b| a.name.cmp(&b.name));
    organizations
}
