use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata of an uploaded file. The bytes live with the upload service.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub name: String,
    pub url: String,
    pub size: u64,
    pub uploaded_by_id: Uuid,
    pub created_at: Timestamp,
}
