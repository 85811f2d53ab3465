use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    /// `#rrggbb`
    pub color: String,
    pub created_at: Timestamp,
}
