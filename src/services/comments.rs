use serde_json::json;
use uuid::Uuid;

use crate::{
    access::{self, Action},
    error::{CoreError, CoreResult},
    identity::Caller,
    models::{activity::ActivityKind, comment::Comment},
    realtime::{EventKind, Scope},
    services::rules,
    store::{TenantTx, WorkItemStore},
};

pub struct AddCommentParameters {
    pub task_id: Uuid,
    pub body: String,
}

/// Any member of the task's organization may comment.
pub fn add_comment(
    store: &WorkItemStore,
    caller: &Caller,
    parameters: AddCommentParameters,
) -> CoreResult<Comment> {
    let body = rules::text("body", parameters.body, 1000)?;
    let task_id = parameters.task_id;
    let organization_id = store
        .locate(caller, |tenant| tenant.tasks.contains_key(&task_id))
        .ok_or_else(|| CoreError::not_found("Task"))?;

    store.transact(organization_id, |tx| {
        tx.authorize(caller, Action::ViewTask)?;
        let project_id = tx
            .tenant
            .get_task(task_id)
            .map(|t| t.project_id)
            .ok_or_else(|| CoreError::not_found("Task"))?;

        let comment = Comment {
            id: Uuid::new_v4(),
            task_id,
            author_id: caller.user_id,
            body,
            created_at: tx.now,
            updated_at: tx.now,
        };
        tx.tenant.comments.insert(comment.id, comment.clone());

        tx.record_activity(
            caller.user_id,
            ActivityKind::CommentAdded,
            Some(project_id),
            Some(task_id),
            json!({ "commentId": comment.id }),
        );
        tx.emit(Scope::Task(task_id), EventKind::CommentCreated, &comment);
        Ok(comment)
    })
}

/// The comment, if the caller wrote it.
fn authored_comment(tx: &TenantTx<'_>, caller: &Caller, comment_id: Uuid) -> CoreResult<Comment> {
    tx.role_of(caller)?;
    let comment = tx
        .tenant
        .comments
        .get(&comment_id)
        .cloned()
        .ok_or_else(|| CoreError::not_found("Comment"))?;
    if comment.author_id != caller.user_id {
        return Err(CoreError::Access(
            "only the author may change a comment".to_string(),
        ));
    }
    Ok(comment)
}

fn project_of(tx: &TenantTx<'_>, task_id: Uuid) -> Option<Uuid> {
    tx.tenant.get_task(task_id).map(|t| t.project_id)
}

pub fn update_comment(
    store: &WorkItemStore,
    caller: &Caller,
    comment_id: Uuid,
    body: String,
) -> CoreResult<Comment> {
    let body = rules::text("body", body, 1000)?;
    let organization_id = store
        .locate(caller, |tenant| tenant.comments.contains_key(&comment_id))
        .ok_or_else(|| CoreError::not_found("Comment"))?;

    store.transact(organization_id, |tx| {
        let mut comment = authored_comment(tx, caller, comment_id)?;
        comment.body = body;
        comment.updated_at = tx.now;
        tx.tenant.comments.insert(comment_id, comment.clone());

        let project_id = project_of(tx, comment.task_id);
        tx.record_activity(
            caller.user_id,
            ActivityKind::CommentUpdated,
            project_id,
            Some(comment.task_id),
            json!({ "commentId": comment_id }),
        );
        tx.emit(Scope::Task(comment.task_id), EventKind::CommentUpdated, &comment);
        Ok(comment)
    })
}

pub fn delete_comment(store: &WorkItemStore, caller: &Caller, comment_id: Uuid) -> CoreResult<()> {
    let organization_id = store
        .locate(caller, |tenant| tenant.comments.contains_key(&comment_id))
        .ok_or_else(|| CoreError::not_found("Comment"))?;

    store.transact(organization_id, |tx| {
        let comment = authored_comment(tx, caller, comment_id)?;
        tx.tenant.comments.remove(&comment_id);

        let project_id = project_of(tx, comment.task_id);
        tx.record_activity(
            caller.user_id,
            ActivityKind::CommentDeleted,
            project_id,
            Some(comment.task_id),
            json!({ "commentId": comment_id }),
        );
        tx.emit(
            Scope::Task(comment.task_id),
            EventKind::CommentDeleted,
            &json!({ "id": comment_id, "taskId": comment.task_id }),
        );
        Ok(())
    })
}

/// Comments on a task, oldest first.
pub fn list_comments(
    store: &WorkItemStore,
    caller: &Caller,
    task_id: Uuid,
) -> CoreResult<Vec<Comment>> {
    let organization_id = store
        .locate(caller, |tenant| tenant.tasks.contains_key(&task_id))
        .ok_or_else(|| CoreError::not_found("Task"))?;

    store
        .read_tenant(organization_id, |tenant| -> CoreResult<Vec<Comment>> {
            let role = tenant
                .role_of(caller.user_id)
                .ok_or_else(|| CoreError::not_found("Task"))?;
            access::require(role, Action::ViewTask)?;

            let mut comments: Vec<Comment> = tenant
                .comments
                .values()
                .filter(|c| c.task_id == task_id)
                .cloned()
                .collect();
            comments.sort_by_key(|c| c.created_at);
            Ok(comments)
        })
        .ok_or_else(|| CoreError::not_found("Task"))?
}
