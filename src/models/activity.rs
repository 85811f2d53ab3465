use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    ProjectCreated,
    ProjectUpdated,
    TaskCreated,
    TaskUpdated,
    TaskAssigned,
    TaskStatusChanged,
    TaskMoved,
    TaskDeleted,
    CommentAdded,
    CommentUpdated,
    CommentDeleted,
    FileAttached,
    TimeStarted,
    TimeStopped,
    TimeLogged,
    MemberAdded,
    MemberRoleChanged,
    MemberRemoved,
}

/// Append-only audit row. Never mutated once written.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub meta: serde_json::Value,
    pub project_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub actor_id: Uuid,
    pub created_at: Timestamp,
}
