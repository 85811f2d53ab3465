use jiff::Timestamp;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    access::Action,
    error::{CoreError, CoreResult},
    identity::Caller,
    models::{activity::ActivityKind, time_entry::TimeEntry},
    realtime::{EventKind, Scope},
    store::WorkItemStore,
};

/// When the work happened.
#[derive(Clone, Copy, Debug)]
pub enum TimeInterval {
    /// Finished work. `seconds` is computed when absent and must match the
    /// interval when given.
    Closed {
        started_at: Timestamp,
        ended_at: Timestamp,
        seconds: Option<u64>,
    },
    /// A running timer.
    Open { started_at: Timestamp },
}

pub struct RecordTimeEntryParameters {
    pub task_id: Uuid,
    pub interval: TimeInterval,
    pub billable: bool,
    /// Hourly rate in minor currency units
    pub rate_cents: u64,
}

fn elapsed_seconds(started_at: Timestamp, ended_at: Timestamp) -> CoreResult<u64> {
    let before_start = || CoreError::validation("end time must not be before start time");
    if ended_at < started_at {
        return Err(before_start());
    }
    u64::try_from(ended_at.as_second() - started_at.as_second()).map_err(|_| before_start())
}

/// Logs time on a task for the caller. At most one timer per user and task
/// may be running.
pub fn record_time_entry(
    store: &WorkItemStore,
    caller: &Caller,
    parameters: RecordTimeEntryParameters,
) -> CoreResult<TimeEntry> {
    let (started_at, ended_at, seconds) = match parameters.interval {
        TimeInterval::Closed {
            started_at,
            ended_at,
            seconds,
        } => {
            let elapsed = elapsed_seconds(started_at, ended_at)?;
            if seconds.is_some_and(|s| s != elapsed) {
                return Err(CoreError::validation(
                    "seconds must match the time between start and end",
                ));
            }
            (started_at, Some(ended_at), elapsed)
        }
        TimeInterval::Open { started_at } => (started_at, None, 0),
    };

    let task_id = parameters.task_id;
    let organization_id = store
        .locate(caller, |tenant| tenant.tasks.contains_key(&task_id))
        .ok_or_else(|| CoreError::not_found("Task"))?;

    let entry = store.transact(organization_id, |tx| {
        tx.authorize(caller, Action::CreateTask)?;
        let project_id = tx
            .tenant
            .get_task(task_id)
            .map(|t| t.project_id)
            .ok_or_else(|| CoreError::not_found("Task"))?;

        if ended_at.is_none() && tx.tenant.open_time_entry(caller.user_id, task_id).is_some() {
            return Err(CoreError::conflict(
                "a timer is already running for this task",
            ));
        }

        let entry = TimeEntry {
            id: Uuid::new_v4(),
            task_id,
            user_id: caller.user_id,
            started_at,
            ended_at,
            seconds,
            billable: parameters.billable,
            rate_cents: parameters.rate_cents,
            created_at: tx.now,
            updated_at: tx.now,
        };
        tx.tenant.time_entries.insert(entry.id, entry.clone());

        let (activity, event) = if entry.is_open() {
            (ActivityKind::TimeStarted, EventKind::TimeEntryStarted)
        } else {
            (ActivityKind::TimeLogged, EventKind::TimeEntryStopped)
        };
        tx.record_activity(
            caller.user_id,
            activity,
            Some(project_id),
            Some(task_id),
            json!({ "timeEntryId": entry.id, "seconds": entry.seconds }),
        );
        tx.emit(Scope::Task(task_id), event, &entry);
        tx.emit(Scope::User(caller.user_id), event, &entry);
        Ok(entry)
    })?;

    info!(
        org_id = %organization_id,
        task_id = %task_id,
        open = entry.is_open(),
        "Time entry recorded"
    );
    Ok(entry)
}

/// Stops the caller's running timer on `task_id`.
pub fn stop_timer(store: &WorkItemStore, caller: &Caller, task_id: Uuid) -> CoreResult<TimeEntry> {
    let organization_id = store
        .locate(caller, |tenant| tenant.tasks.contains_key(&task_id))
        .ok_or_else(|| CoreError::not_found("Task"))?;

    store.transact(organization_id, |tx| {
        tx.authorize(caller, Action::CreateTask)?;
        let project_id = tx
            .tenant
            .get_task(task_id)
            .map(|t| t.project_id)
            .ok_or_else(|| CoreError::not_found("Task"))?;
        let mut entry = tx
            .tenant
            .open_time_entry(caller.user_id, task_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("TimeEntry"))?;

        // A timer started in the future stops at its own start.
        let ended_at = tx.now.max(entry.started_at);
        entry.seconds = elapsed_seconds(entry.started_at, ended_at)?;
        entry.ended_at = Some(ended_at);
        entry.updated_at = tx.now;
        tx.tenant.time_entries.insert(entry.id, entry.clone());

        tx.record_activity(
            caller.user_id,
            ActivityKind::TimeStopped,
            Some(project_id),
            Some(task_id),
            json!({ "timeEntryId": entry.id, "seconds": entry.seconds }),
        );
        tx.emit(Scope::Task(task_id), EventKind::TimeEntryStopped, &entry);
        tx.emit(Scope::User(caller.user_id), EventKind::TimeEntryStopped, &entry);
        Ok(entry)
    })
}

#[cfg(test)]
mod tests {
    use jiff::ToSpan;

    use super::*;
    use crate::{ErrorKind, access::Role, services::fixtures::Fixture};

    fn start(fx: &Fixture, user: Uuid, task_id: Uuid) -> CoreResult<TimeEntry> {
        record_time_entry(
            &fx.store,
            &fx.caller(user),
            RecordTimeEntryParameters {
                task_id,
                interval: TimeInterval::Open {
                    started_at: Timestamp::now(),
                },
                billable: true,
                rate_cents: 9_000,
            },
        )
    }

    #[test]
    fn test_second_open_timer_conflicts_until_stopped() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let project = fx.project(org, owner, "WEB");
        let task = fx.task(project, owner, "Build");

        let first = start(&fx, owner, task).unwrap();
        assert!(first.is_open());

        let err = start(&fx, owner, task).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let stopped = stop_timer(&fx.store, &fx.caller(owner), task).unwrap();
        assert_eq!(stopped.id, first.id);
        assert!(!stopped.is_open());

        start(&fx, owner, task).unwrap();
    }

    #[test]
    fn test_timers_are_per_user_and_task() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let dev = fx.member(org, "dev@acme.test", Role::Member);
        let project = fx.project(org, owner, "WEB");
        let a = fx.task(project, owner, "a");
        let b = fx.task(project, owner, "b");

        start(&fx, owner, a).unwrap();
        start(&fx, owner, b).unwrap();
        start(&fx, dev, a).unwrap();
    }

    #[test]
    fn test_concurrent_starts_one_wins() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let project = fx.project(org, owner, "WEB");
        let task = fx.task(project, owner, "Build");

        let results: Vec<CoreResult<TimeEntry>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4).map(|_| s.spawn(|| start(&fx, owner, task))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let open = fx
            .store
            .read_tenant(org, |t| t.time_entries.values().filter(|e| e.is_open()).count())
            .unwrap();
        assert_eq!(open, 1);
    }

    #[test]
    fn test_closed_interval_rules() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let project = fx.project(org, owner, "WEB");
        let task = fx.task(project, owner, "Build");
        let caller = fx.caller(owner);

        let ended_at = Timestamp::now();
        let started_at = ended_at - 90.minutes();
        let log = |started_at, ended_at, seconds| {
            record_time_entry(
                &fx.store,
                &caller,
                RecordTimeEntryParameters {
                    task_id: task,
                    interval: TimeInterval::Closed {
                        started_at,
                        ended_at,
                        seconds,
                    },
                    billable: false,
                    rate_cents: 0,
                },
            )
        };

        let entry = log(started_at, ended_at, None).unwrap();
        assert_eq!(entry.seconds, 5_400);

        log(started_at, ended_at, Some(5_400)).unwrap();

        let err = log(started_at, ended_at, Some(60)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = log(ended_at, started_at, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        // Less than a second apart, still backwards.
        let late_start = started_at + 900.milliseconds();
        let err = log(late_start, late_start - 800.milliseconds(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_stop_without_timer_is_not_found() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let project = fx.project(org, owner, "WEB");
        let task = fx.task(project, owner, "Build");

        let err = stop_timer(&fx.store, &fx.caller(owner), task).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_viewer_cannot_log_time() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let viewer = fx.member(org, "v@acme.test", Role::Viewer);
        let project = fx.project(org, owner, "WEB");
        let task = fx.task(project, owner, "Build");

        let err = start(&fx, viewer, task).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Access);
    }

    #[test]
    fn test_timer_events_reach_task_and_user() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let project = fx.project(org, owner, "WEB");
        let task = fx.task(project, owner, "Build");
        fx.drain_events();

        start(&fx, owner, task).unwrap();
        let scopes: Vec<Scope> = fx.drain_events().iter().map(|d| d.scope).collect();
        assert_eq!(scopes, vec![Scope::Task(task), Scope::User(owner)]);
    }
}
