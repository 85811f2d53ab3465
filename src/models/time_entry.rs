use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub started_at: Timestamp,
    /// `None` while the timer is running
    pub ended_at: Option<Timestamp>,
    pub seconds: u64,
    pub billable: bool,
    /// Hourly rate in minor currency units
    pub rate_cents: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TimeEntry {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}
