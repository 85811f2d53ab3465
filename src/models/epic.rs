use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Epic {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub created_at: Timestamp,
}
