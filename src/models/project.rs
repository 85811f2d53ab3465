use jiff::Timestamp;
use jiff::civil::Date;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::task::{Priority, Status};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// UUID of the project
    pub id: Uuid,
    pub organization_id: Uuid,
    /// Name of the project
    pub name: String,
    /// Short uppercase key, unique within the organization
    pub key: String,
    pub description: Option<String>,
    /// Member leading the project
    pub lead_id: Option<Uuid>,
    pub status: Status,
    pub priority: Priority,
    /// Planned budget in minor currency units
    pub budget_cents: u64,
    pub start_date: Option<Date>,
    pub due_date: Option<Date>,
    /// Next order index handed to a task of this project. Only ever grows.
    pub next_order_index: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
