use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Organization whose mutation produced the notification
    pub organization_id: Uuid,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: Timestamp,
}
