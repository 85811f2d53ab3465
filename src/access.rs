//! Role-based permission table.
//!
//! The policy is a fixed `(action, role)` lookup. Nothing in here performs I/O;
//! callers turn a `false` into [`CoreError::Access`] with [`require`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Membership role, ordered from least to most privileged.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Viewer,
    Member,
    Manager,
    Admin,
    Owner,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Viewer,
        Role::Member,
        Role::Manager,
        Role::Admin,
        Role::Owner,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "VIEWER",
            Role::Member => "MEMBER",
            Role::Manager => "MANAGER",
            Role::Admin => "ADMIN",
            Role::Owner => "OWNER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::validation(format!("unknown role '{s}'")))
    }
}

/// Everything a membership can be asked to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    ViewTask,
    CreateTask,
    /// Reorder, status change or assignee change.
    MoveTask,
    DeleteTask,
    EditProject,
    ManageOrg,
    InviteUser,
    ManageRoles,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::ViewTask,
        Action::CreateTask,
        Action::MoveTask,
        Action::DeleteTask,
        Action::EditProject,
        Action::ManageOrg,
        Action::InviteUser,
        Action::ManageRoles,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::ViewTask => "view_task",
            Action::CreateTask => "create_task",
            Action::MoveTask => "move_task",
            Action::DeleteTask => "delete_task",
            Action::EditProject => "edit_project",
            Action::ManageOrg => "manage_org",
            Action::InviteUser => "invite_user",
            Action::ManageRoles => "manage_roles",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| CoreError::validation(format!("unknown action '{s}'")))
    }
}

//                         VIEWER MEMBER MANAGER ADMIN  OWNER
const PERMISSIONS: [[bool; 5]; 8] = [
    /* ViewTask    */ [true, true, true, true, true],
    /* CreateTask  */ [false, true, true, true, true],
    /* MoveTask    */ [false, true, true, true, true],
    /* DeleteTask  */ [false, false, true, true, true],
    /* EditProject */ [false, false, true, true, true],
    /* ManageOrg   */ [false, false, false, true, true],
    /* InviteUser  */ [false, false, false, true, true],
    /* ManageRoles */ [false, false, false, true, true],
];

/// Pure permission lookup.
pub const fn authorize(role: Role, action: Action) -> bool {
    PERMISSIONS[action as usize][role as usize]
}

/// Lookup by action name. Names that do not parse are denied.
pub fn authorize_named(role: Role, action: &str) -> bool {
    action
        .parse::<Action>()
        .map(|action| authorize(role, action))
        .unwrap_or(false)
}

/// [`authorize`] lifted into the error type every service returns.
pub fn require(role: Role, action: Action) -> CoreResult<()> {
    if authorize(role, action) {
        Ok(())
    } else {
        Err(CoreError::Access(format!("role {role} may not {action}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_role_can_view() {
        for role in Role::ALL {
            assert!(authorize(role, Action::ViewTask), "{role} should view");
        }
    }

    #[test]
    fn test_full_truth_table() {
        use Action::*;
        use Role::*;

        let expected: &[(Action, &[Role])] = &[
            (ViewTask, &[Viewer, Member, Manager, Admin, Owner]),
            (CreateTask, &[Member, Manager, Admin, Owner]),
            (MoveTask, &[Member, Manager, Admin, Owner]),
            (DeleteTask, &[Manager, Admin, Owner]),
            (EditProject, &[Manager, Admin, Owner]),
            (ManageOrg, &[Admin, Owner]),
            (InviteUser, &[Admin, Owner]),
            (ManageRoles, &[Admin, Owner]),
        ];

        for (action, allowed) in expected {
            for role in Role::ALL {
                assert_eq!(
                    authorize(role, *action),
                    allowed.contains(&role),
                    "{role} / {action}"
                );
            }
        }
    }

    #[test]
    fn test_documented_cases() {
        assert!(!authorize(Role::Viewer, Action::CreateTask));
        assert!(!authorize(Role::Member, Action::DeleteTask));
        assert!(authorize(Role::Manager, Action::DeleteTask));
    }

    #[test]
    fn test_unknown_action_is_denied() {
        assert!(!authorize_named(Role::Owner, "drop_database"));
        assert!(!authorize_named(Role::Owner, ""));
        assert!(authorize_named(Role::Owner, "delete_task"));
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Viewer < Role::Member);
        assert!(Role::Member < Role::Manager);
        assert!(Role::Manager < Role::Admin);
        assert!(Role::Admin < Role::Owner);
    }

    #[test]
    fn test_require_maps_to_access_error() {
        let err = require(Role::Viewer, Action::CreateTask).unwrap_err();
        assert!(matches!(err, CoreError::Access(_)));
        assert!(require(Role::Admin, Action::InviteUser).is_ok());
    }

    #[test]
    fn test_parse_role_case_insensitive() {
        assert_eq!("manager".parse::<Role>().unwrap(), Role::Manager);
        assert!("superuser".parse::<Role>().is_err());
    }
}
