//! Task queries: filtering, ordering and pagination over one project.
//!
//! A query reads a consistent snapshot of the project's organization under a
//! shared lock. Writers to that organization wait for the scan, never for the
//! caller.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use jiff::civil::Date;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::{
    access::{self, Action},
    error::{CoreError, CoreResult},
    identity::Caller,
    models::{
        task::{Priority, Status, Task, TaskView},
        tenant::Tenant,
    },
    store::WorkItemStore,
};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// Optional, conjunctive filters. Empty lists and `None` do not filter.
#[derive(Clone, Debug, Default)]
pub struct TaskFilters {
    pub status: Vec<Status>,
    pub priority: Vec<Priority>,
    /// Matches when any assignee is in the list
    pub assignee_ids: Vec<Uuid>,
    /// Matches when any label is in the list
    pub label_ids: Vec<Uuid>,
    pub epic_id: Option<Uuid>,
    /// Case-insensitive substring of the title or the description
    pub search: Option<String>,
    /// Matches tasks starting on or after this date, OR due by `end_date`.
    /// The two bounds are alternatives, not a range.
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

#[derive(Clone, Debug)]
pub struct TaskQuery {
    pub project_id: Uuid,
    pub filters: TaskFilters,
    /// 1-based
    pub page: u32,
    pub limit: u32,
}

impl TaskQuery {
    pub fn new(project_id: Uuid) -> Self {
        Self {
            project_id,
            filters: TaskFilters::default(),
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TaskPage {
    pub items: Vec<TaskView>,
    /// Matching tasks before pagination
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

/// Filters compiled against one tenant snapshot.
struct Matcher<'a> {
    tenant: &'a Tenant,
    filters: &'a TaskFilters,
    search: Option<String>,
    assignees: BTreeSet<Uuid>,
    labels: BTreeSet<Uuid>,
}

impl<'a> Matcher<'a> {
    fn new(tenant: &'a Tenant, filters: &'a TaskFilters) -> Self {
        let search = filters
            .search
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::to_lowercase);
        Self {
            tenant,
            filters,
            search,
            assignees: filters.assignee_ids.iter().copied().collect(),
            labels: filters.label_ids.iter().copied().collect(),
        }
    }

    fn matches(&self, task: &Task) -> bool {
        let f = self.filters;

        if !f.status.is_empty() && !f.status.contains(&task.status) {
            return false;
        }
        if !f.priority.is_empty() && !f.priority.contains(&task.priority) {
            return false;
        }
        if f.epic_id.is_some() && task.epic_id != f.epic_id {
            return false;
        }
        if !self.assignees.is_empty()
            && !self
                .tenant
                .assignees
                .iter()
                .any(|a| a.task_id == task.id && self.assignees.contains(&a.user_id))
        {
            return false;
        }
        if !self.labels.is_empty()
            && !self
                .tenant
                .task_labels
                .iter()
                .any(|l| l.task_id == task.id && self.labels.contains(&l.label_id))
        {
            return false;
        }
        self.matches_dates(task) && self.matches_search(task)
    }

    fn matches_dates(&self, task: &Task) -> bool {
        let f = self.filters;
        if f.start_date.is_none() && f.end_date.is_none() {
            return true;
        }
        let starts_after = f
            .start_date
            .is_some_and(|bound| task.start_date.is_some_and(|d| d >= bound));
        let due_before = f
            .end_date
            .is_some_and(|bound| task.due_date.is_some_and(|d| d <= bound));
        starts_after || due_before
    }

    fn matches_search(&self, task: &Task) -> bool {
        let Some(needle) = &self.search else {
            return true;
        };
        task.title.to_lowercase().contains(needle)
            || task
                .description
                .as_ref()
                .is_some_and(|d| d.to_lowercase().contains(needle))
    }
}

fn check_paging(query: &TaskQuery) -> CoreResult<()> {
    if query.page < 1 {
        return Err(CoreError::validation("page must be at least 1"));
    }
    if !(1..=MAX_LIMIT).contains(&query.limit) {
        return Err(CoreError::validation(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    Ok(())
}

/// Tasks of one project matching `query.filters`, ordered by order index.
///
/// A project the caller cannot see, whether missing or in another
/// organization, is an access error. No matches is an empty page.
pub fn query_tasks(store: &WorkItemStore, caller: &Caller, query: &TaskQuery) -> CoreResult<TaskPage> {
    check_paging(query)?;

    let no_access = || CoreError::Access("no access to this project".to_string());
    let organization_id = store
        .locate(caller, |tenant| tenant.projects.contains_key(&query.project_id))
        .ok_or_else(no_access)?;

    let page = store
        .read_tenant(organization_id, |tenant| -> CoreResult<TaskPage> {
            let role = tenant.role_of(caller.user_id).ok_or_else(no_access)?;
            access::require(role, Action::ViewTask)?;

            let matcher = Matcher::new(tenant, &query.filters);
            let mut matching: Vec<&Task> = tenant
                .tasks_in_project(query.project_id)
                .filter(|task| matcher.matches(task))
                .collect();
            matching.sort_by_key(|task| task.order_index);

            let total = matching.len();
            let limit = query.limit as usize;
            let offset = (query.page as usize - 1).saturating_mul(limit);
            let items = matching
                .into_iter()
                .skip(offset)
                .take(limit)
                .map(|task| tenant.task_view(task))
                .collect();

            Ok(TaskPage {
                items,
                total,
                page: query.page,
                limit: query.limit,
                total_pages: total.div_ceil(limit) as u32,
            })
        })
        .ok_or_else(no_access)??;

    debug!(
        project_id = %query.project_id,
        total = page.total,
        page = page.page,
        "Tasks queried"
    );
    Ok(page)
}

/// [`query_tasks`] with a deadline. Past the deadline the caller gets
/// [`CoreError::Timeout`] and the read finishes in the background with its
/// result discarded.
pub async fn query_tasks_within(
    store: Arc<WorkItemStore>,
    caller: Caller,
    query: TaskQuery,
    timeout: Duration,
) -> CoreResult<TaskPage> {
    run_with_timeout(timeout, move || query_tasks(&store, &caller, &query)).await
}

async fn run_with_timeout<T, F>(timeout: Duration, work: F) -> CoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CoreResult<T> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Ok(Err(_)) | Err(_) => Err(CoreError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::{
        ErrorKind,
        access::Role,
        identity::resolve_caller,
        realtime::{RealtimeHub, Transport, TransportError, run_worker},
        services::{
            fixtures::Fixture,
            organizations::{
                CreateOrganizationParameters, CreateUserParameters, create_organization,
                create_user,
            },
            projects::{CreateLabelParameters, CreateProjectParameters, create_label, create_project},
            tasks::{CreateTaskParameters, TaskPatch, create_task, update_task},
        },
        storage::memory::MemoryStorage,
    };

    fn query(fx: &Fixture, user: Uuid, query: &TaskQuery) -> CoreResult<TaskPage> {
        query_tasks(&fx.store, &fx.caller(user), query)
    }

    fn titles(page: &TaskPage) -> Vec<String> {
        page.items.iter().map(|v| v.task.title.clone()).collect()
    }

    #[test]
    fn test_second_page_of_forty_five() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let project = fx.project(org, owner, "WEB");
        for n in 1..=45 {
            fx.task(project, owner, &format!("task {n}"));
        }

        let mut q = TaskQuery::new(project);
        q.page = 2;
        q.limit = 20;
        let page = query(&fx, owner, &q).unwrap();

        assert_eq!(page.total, 45);
        assert_eq!(page.total_pages, 3);
        let expected: Vec<String> = (21..=40).map(|n| format!("task {n}")).collect();
        assert_eq!(titles(&page), expected);

        q.page = 3;
        assert_eq!(query(&fx, owner, &q).unwrap().items.len(), 5);
        q.page = 4;
        assert!(query(&fx, owner, &q).unwrap().items.is_empty());
    }

    #[test]
    fn test_paging_bounds() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let project = fx.project(org, owner, "WEB");

        for (page, limit) in [(0, 20), (1, 0), (1, 101)] {
            let mut q = TaskQuery::new(project);
            q.page = page;
            q.limit = limit;
            assert_eq!(query(&fx, owner, &q).unwrap_err().kind(), ErrorKind::Validation);
        }

        let mut q = TaskQuery::new(project);
        q.limit = 100;
        let page = query(&fx, owner, &q).unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn test_non_member_gets_access_error() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let (_, outsider) = fx.organization("globex");
        let project = fx.project(org, owner, "WEB");

        let err = query(&fx, outsider, &TaskQuery::new(project)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Access);

        let err = query(&fx, owner, &TaskQuery::new(Uuid::new_v4())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Access);
    }

    #[test]
    fn test_viewer_can_query() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let viewer = fx.member(org, "v@acme.test", Role::Viewer);
        let project = fx.project(org, owner, "WEB");
        fx.task(project, owner, "visible");

        let page = query(&fx, viewer, &TaskQuery::new(project)).unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let dev = fx.member(org, "dev@acme.test", Role::Member);
        let project = fx.project(org, owner, "WEB");
        let caller = fx.caller(owner);
        let bug = create_label(
            &fx.store,
            &caller,
            CreateLabelParameters {
                organization_id: org,
                name: "bug".into(),
                color: "#ff0000".into(),
            },
        )
        .unwrap();

        let make = |title: &str, status: Status, priority: Priority, assignee: bool, label: bool| {
            let mut p = CreateTaskParameters::new(project, title);
            p.status = status;
            p.priority = priority;
            if assignee {
                p.assignee_ids = vec![dev];
            }
            if label {
                p.label_ids = vec![bug.id];
            }
            create_task(&fx.store, &caller, p).unwrap();
        };
        make("a", Status::Todo, Priority::High, true, true);
        make("b", Status::Todo, Priority::Low, true, true);
        make("c", Status::Done, Priority::High, true, true);
        make("d", Status::Todo, Priority::High, false, true);
        make("e", Status::Todo, Priority::High, true, false);
        make("f", Status::InProgress, Priority::Urgent, true, true);

        let mut q = TaskQuery::new(project);
        q.filters = TaskFilters {
            status: vec![Status::Todo, Status::InProgress],
            priority: vec![Priority::High, Priority::Urgent],
            assignee_ids: vec![dev, Uuid::new_v4()],
            label_ids: vec![bug.id],
            ..TaskFilters::default()
        };
        let page = query(&fx, owner, &q).unwrap();
        assert_eq!(titles(&page), vec!["a", "f"]);
    }

    #[test]
    fn test_search_title_or_description() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let project = fx.project(org, owner, "WEB");
        let caller = fx.caller(owner);

        fx.task(project, owner, "Fix LOGIN redirect");
        let mut p = CreateTaskParameters::new(project, "Session bug");
        p.description = Some("Users lose their login after refresh".into());
        create_task(&fx.store, &caller, p).unwrap();
        fx.task(project, owner, "Update footer");

        let mut q = TaskQuery::new(project);
        q.filters.search = Some("Login".into());
        assert_eq!(
            titles(&query(&fx, owner, &q).unwrap()),
            vec!["Fix LOGIN redirect", "Session bug"]
        );

        q.filters.search = Some("   ".into());
        assert_eq!(query(&fx, owner, &q).unwrap().total, 3);

        // Surrounding spaces are part of the needle.
        fx.task(project, owner, "Loginpage polish");
        q.filters.search = Some("login ".into());
        assert_eq!(
            titles(&query(&fx, owner, &q).unwrap()),
            vec!["Fix LOGIN redirect"]
        );
    }

    #[test]
    fn test_date_bounds_are_alternatives() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let project = fx.project(org, owner, "WEB");
        let caller = fx.caller(owner);

        let dated = |title: &str, start: Option<Date>, due: Option<Date>| {
            let mut p = CreateTaskParameters::new(project, title);
            p.start_date = start;
            p.due_date = due;
            create_task(&fx.store, &caller, p).unwrap();
        };
        let d = |day| jiff::civil::date(2025, 6, day);
        dated("starts late", Some(d(20)), None);
        dated("due early", None, Some(d(5)));
        dated("inside", Some(d(8)), Some(d(12)));
        dated("undated", None, None);

        let mut q = TaskQuery::new(project);
        q.filters.start_date = Some(d(15));
        q.filters.end_date = Some(d(10));
        assert_eq!(
            titles(&query(&fx, owner, &q).unwrap()),
            vec!["starts late", "due early"]
        );

        q.filters.end_date = None;
        assert_eq!(titles(&query(&fx, owner, &q).unwrap()), vec!["starts late"]);
    }

    #[test]
    fn test_search_and_dates_both_apply() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let project = fx.project(org, owner, "WEB");
        let caller = fx.caller(owner);

        let mut p = CreateTaskParameters::new(project, "deploy api");
        p.due_date = Some(jiff::civil::date(2025, 1, 1));
        create_task(&fx.store, &caller, p).unwrap();
        fx.task(project, owner, "deploy web");

        let mut q = TaskQuery::new(project);
        q.filters.search = Some("deploy".into());
        q.filters.end_date = Some(jiff::civil::date(2025, 2, 1));
        assert_eq!(titles(&query(&fx, owner, &q).unwrap()), vec!["deploy api"]);
    }

    #[test]
    fn test_results_follow_order_index() {
        let fx = Fixture::new();
        let (org, owner) = fx.organization("acme");
        let project = fx.project(org, owner, "WEB");
        let first = fx.task(project, owner, "first");
        fx.task(project, owner, "second");

        update_task(
            &fx.store,
            &fx.caller(owner),
            first,
            TaskPatch {
                order_index: Some(2),
                ..TaskPatch::default()
            },
        )
        .unwrap();

        let page = query(&fx, owner, &TaskQuery::new(project)).unwrap();
        assert_eq!(titles(&page), vec!["second", "first"]);
    }

    struct Down;

    #[async_trait]
    impl Transport for Down {
        fn name(&self) -> &'static str {
            "down"
        }

        async fn trigger(&self, _: &str, _: &str, _: &Value) -> Result<(), TransportError> {
            Err(TransportError::Unavailable("broker offline".into()))
        }
    }

    #[tokio::test]
    async fn test_mutation_survives_failed_publish() {
        let (hub, queue) = RealtimeHub::channel();
        let store = Arc::new(WorkItemStore::open(Arc::new(MemoryStorage::new()), hub).unwrap());
        let worker = tokio::spawn(run_worker(queue, Arc::new(Down), Duration::from_secs(1)));

        let user = create_user(
            &store,
            CreateUserParameters {
                email: "solo@example.com".into(),
                name: None,
            },
        )
        .unwrap();
        let caller = resolve_caller(&store, Some(user.id)).unwrap();
        let org = create_organization(
            &store,
            &caller,
            CreateOrganizationParameters {
                name: "Solo".into(),
                slug: None,
            },
        )
        .unwrap();
        let caller = resolve_caller(&store, Some(user.id)).unwrap();
        let project = create_project(&store, &caller, CreateProjectParameters::new(org.id, "Web", "WEB"))
            .unwrap();
        create_task(&store, &caller, CreateTaskParameters::new(project.id, "durable")).unwrap();

        let page = query_tasks_within(
            store.clone(),
            caller,
            TaskQuery::new(project.id),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(page.total, 1);

        drop(store);
        let stats = worker.await.unwrap();
        assert_eq!(stats.delivered, 0);
        assert!(stats.failed >= 2);
    }

    #[tokio::test]
    async fn test_slow_read_times_out() {
        let result: CoreResult<()> = run_with_timeout(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        })
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
    }
}
