use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    /// Fixed at creation
    pub task_id: Uuid,
    /// Fixed at creation
    pub author_id: Uuid,
    pub body: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
