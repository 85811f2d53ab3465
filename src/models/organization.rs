use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    /// UUID of the organization
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Globally unique, immutable once created
    pub slug: String,
    pub created_at: Timestamp,
}
