use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::User;

/// Current schema version of the directory document
pub const DIRECTORY_VERSION: u32 = 1;

/// Rows that live above any single organization.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Directory {
    pub version: u32,
    pub users: BTreeMap<Uuid, User>,
    /// Organization slug to organization id
    pub slugs: BTreeMap<String, Uuid>,
}

impl Default for Directory {
    fn default() -> Self {
        Self {
            version: DIRECTORY_VERSION,
            users: BTreeMap::new(),
            slugs: BTreeMap::new(),
        }
    }
}

impl Directory {
    pub fn get_user(&self, user_id: Uuid) -> Option<&User> {
        self.users.get(&user_id)
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<&User> {
        let email = email.trim().to_lowercase();
        self.users.values().find(|u| u.email == email)
    }

    pub fn organization_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.slugs.values().copied()
    }
}
