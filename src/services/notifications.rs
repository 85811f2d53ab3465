use uuid::Uuid;

use crate::{
    error::{CoreError, CoreResult},
    identity::Caller,
    models::notification::Notification,
    store::WorkItemStore,
};

/// The caller's notifications across their organizations, newest first.
pub fn list_notifications(
    store: &WorkItemStore,
    caller: &Caller,
    unread_only: bool,
) -> Vec<Notification> {
    let mut notifications: Vec<Notification> = caller
        .organization_ids()
        .filter_map(|organization_id| {
            store.read_tenant(organization_id, |tenant| {
                tenant
                    .notifications
                    .values()
                    .filter(|n| n.user_id == caller.user_id && !(unread_only && n.read))
                    .cloned()
                    .collect::<Vec<_>>()
            })
        })
        .flatten()
        .collect();

    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    notifications
}

/// Other users' notifications are reported as not found.
pub fn mark_notification_read(
    store: &WorkItemStore,
    caller: &Caller,
    notification_id: Uuid,
) -> CoreResult<Notification> {
    let owned_by_caller = |notification: Option<&Notification>| {
        notification.is_some_and(|n| n.user_id == caller.user_id)
    };
    let organization_id = store
        .locate(caller, |tenant| {
            owned_by_caller(tenant.notifications.get(&notification_id))
        })
        .ok_or_else(|| CoreError::not_found("Notification"))?;

    store.transact(organization_id, |tx| {
        let notification = tx
            .tenant
            .notifications
            .get_mut(&notification_id)
            .filter(|n| n.user_id == caller.user_id)
            .ok_or_else(|| CoreError::not_found("Notification"))?;
        notification.read = true;
        Ok(notification.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, access::Role, services::fixtures::Fixture};

    #[test]
    fn test_list_and_mark_read() {
        let fx = Fixture::new();
        let (org, _) = fx.organization("acme");
        let dev = fx.member(org, "dev@acme.test", Role::Member);
        let caller = fx.caller(dev);

        let unread = list_notifications(&fx.store, &caller, true);
        assert_eq!(unread.len(), 1);

        let read = mark_notification_read(&fx.store, &caller, unread[0].id).unwrap();
        assert!(read.read);
        assert!(list_notifications(&fx.store, &caller, true).is_empty());
        assert_eq!(list_notifications(&fx.store, &caller, false).len(), 1);
    }

    #[test]
    fn test_aggregates_across_organizations() {
        let fx = Fixture::new();
        let (acme, _) = fx.organization("acme");
        let (globex, globex_owner) = fx.organization("globex");
        let dev = fx.member(acme, "dev@example.com", Role::Member);
        crate::services::memberships::add_member(
            &fx.store,
            &fx.caller(globex_owner),
            crate::services::memberships::AddMemberParameters {
                organization_id: globex,
                user_id: dev,
                role: Role::Viewer,
            },
        )
        .unwrap();

        let all = list_notifications(&fx.store, &fx.caller(dev), false);
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at >= all[1].created_at);
    }

    #[test]
    fn test_someone_elses_notification_is_not_found() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let dev = fx.member(org, "dev@acme.test", Role::Member);
        let theirs = list_notifications(&fx.store, &fx.caller(dev), false);

        let err = mark_notification_read(&fx.store, &fx.caller(owner), theirs[0].id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
