use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    /// Lowercased, unique across the directory
    pub email: String,
    pub name: Option<String>,
    pub created_at: Timestamp,
}
