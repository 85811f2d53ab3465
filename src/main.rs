use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::*;
use jiff::civil::Date;
use uuid::Uuid;
use workboard::{
    CoreError, CoreResult, Role, WorkItemStore,
    config::{Config, TransportKind},
    identity::{Caller, resolve_caller_by_email},
    models::task::{Priority, Status},
    query::{DEFAULT_LIMIT, TaskFilters, TaskQuery, query_tasks_within},
    realtime::{LocalBroker, LogTransport, RealtimeHub, Transport, run_worker},
    services::{
        comments::{AddCommentParameters, add_comment, list_comments},
        memberships::{
            AddMemberParameters, ChangeRoleParameters, RemoveMemberParameters, add_member,
            change_role, list_members, remove_member,
        },
        notifications::{list_notifications, mark_notification_read},
        organizations::{
            CreateOrganizationParameters, CreateUserParameters, RenameOrganizationParameters,
            create_organization, create_user, list_organizations, rename_organization,
        },
        projects::{
            CreateEpicParameters, CreateLabelParameters, CreateProjectParameters, ProjectPatch,
            create_epic, create_label, create_project, list_projects, update_project,
        },
        tasks::{CreateTaskParameters, TaskPatch, create_task, delete_task, get_task, update_task},
        time_entries::{RecordTimeEntryParameters, TimeInterval, record_time_entry, stop_timer},
    },
    storage::json::JsonFileStorage,
    telemetry,
};

mod ui;

#[derive(Parser)]
#[command(
    name = "workboard",
    about = "Administer a multi-tenant project and task board"
)]
struct Cli {
    /// Act as the user with this email
    #[arg(long = "as", global = true)]
    as_email: Option<String>,

    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    #[command(subcommand)]
    User(UserCommands),

    /// Manage organizations
    #[command(subcommand)]
    Org(OrgCommands),

    /// Manage organization members
    #[command(subcommand)]
    Member(MemberCommands),

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Manage epics
    #[command(subcommand)]
    Epic(EpicCommands),

    /// Manage labels
    #[command(subcommand)]
    Label(LabelCommands),

    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// Manage comments
    #[command(subcommand)]
    Comment(CommentCommands),

    /// Track time
    #[command(subcommand)]
    Timer(TimerCommands),

    /// Show your notifications
    Notifications {
        /// Only unread ones
        #[arg(long)]
        unread: bool,

        /// Mark this notification as read
        #[arg(long)]
        read: Option<Uuid>,
    },
}

#[derive(Debug, Subcommand)]
enum UserCommands {
    /// Register a user
    New {
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum OrgCommands {
    /// Create an organization you own
    New {
        name: String,
        #[arg(long)]
        slug: Option<String>,
    },
    /// List your organizations
    List,
    /// Rename an organization
    Rename { org: String, name: String },
}

#[derive(Debug, Subcommand)]
enum MemberCommands {
    /// Add a registered user to an organization
    Add {
        org: String,
        email: String,
        #[arg(long, default_value = "member")]
        role: Role,
    },
    /// Change a member's role
    Role { org: String, email: String, role: Role },
    /// Remove a member
    Remove { org: String, email: String },
    /// List members
    List { org: String },
}

#[derive(Debug, Subcommand)]
enum ProjectCommands {
    /// Create a project
    New {
        org: String,
        key: String,
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Lead's email
        #[arg(long)]
        lead: Option<String>,
        /// Budget in minor currency units
        #[arg(long, default_value_t = 0)]
        budget: u64,
        #[arg(long)]
        start: Option<Date>,
        #[arg(long)]
        due: Option<Date>,
    },
    /// Update a project
    Update {
        project: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        budget: Option<u64>,
    },
    /// List projects of an organization
    List { org: String },
}

#[derive(Debug, Subcommand)]
enum EpicCommands {
    /// Create an epic in a project
    New { project: Uuid, name: String },
}

#[derive(Debug, Subcommand)]
enum LabelCommands {
    /// Create a label, e.g. `label new acme bug '#d73a4a'`
    New {
        org: String,
        name: String,
        color: String,
    },
}

#[derive(Debug, Subcommand)]
enum TaskCommands {
    /// Add a task to a project
    Add {
        project: Uuid,
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long, default_value = "todo")]
        status: Status,
        #[arg(long, default_value = "medium")]
        priority: Priority,
        #[arg(long)]
        points: Option<u8>,
        #[arg(long)]
        start: Option<Date>,
        #[arg(long)]
        due: Option<Date>,
        #[arg(long)]
        epic: Option<Uuid>,
        #[arg(long)]
        parent: Option<Uuid>,
        /// Assignee email (can be used multiple times)
        #[arg(short, long, action = clap::ArgAction::Append)]
        assignee: Vec<String>,
        /// Label id (can be used multiple times)
        #[arg(short, long, action = clap::ArgAction::Append)]
        label: Vec<Uuid>,
    },
    /// Show a task with its comments
    Show { task: Uuid },
    /// Change a task
    Update {
        task: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        points: Option<u8>,
        /// Move to this position; swaps with the task holding it
        #[arg(long)]
        order: Option<u64>,
        #[arg(long)]
        due: Option<Date>,
        /// Replace assignees with these emails
        #[arg(short, long, action = clap::ArgAction::Append)]
        assignee: Vec<String>,
        /// Remove every assignee
        #[arg(long, conflicts_with = "assignee")]
        unassign: bool,
    },
    /// Delete a task and its subtasks
    Delete { task: Uuid },
    /// List tasks of a project
    List {
        project: Uuid,
        #[arg(long, action = clap::ArgAction::Append)]
        status: Vec<Status>,
        #[arg(long, action = clap::ArgAction::Append)]
        priority: Vec<Priority>,
        /// Assignee email (can be used multiple times)
        #[arg(short, long, action = clap::ArgAction::Append)]
        assignee: Vec<String>,
        #[arg(short, long, action = clap::ArgAction::Append)]
        label: Vec<Uuid>,
        #[arg(long)]
        epic: Option<Uuid>,
        #[arg(short, long)]
        search: Option<String>,
        /// Tasks starting on or after this date
        #[arg(long)]
        from: Option<Date>,
        /// Tasks due on or before this date
        #[arg(long)]
        to: Option<Date>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,
    },
}

#[derive(Debug, Subcommand)]
enum CommentCommands {
    /// Comment on a task
    Add { task: Uuid, body: String },
}

#[derive(Debug, Subcommand)]
enum TimerCommands {
    /// Start a timer on a task
    Start {
        task: Uuid,
        #[arg(long)]
        billable: bool,
        /// Hourly rate in minor currency units
        #[arg(long, default_value_t = 0)]
        rate: u64,
    },
    /// Stop your running timer on a task
    Stop { task: Uuid },
    /// Log finished work ending now
    Log {
        task: Uuid,
        #[arg(long)]
        minutes: u64,
        #[arg(long)]
        billable: bool,
        #[arg(long, default_value_t = 0)]
        rate: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    telemetry::init(&config.log_level);

    std::fs::create_dir_all(&config.data_dir).unwrap_or_else(|e| {
        eprintln!("Error: Failed to create data directory: {}", e);
        std::process::exit(1);
    });

    let (hub, worker) = if config.realtime.enabled {
        let (hub, queue) = RealtimeHub::bounded(config.realtime.queue_capacity);
        let transport: Arc<dyn Transport> = match config.realtime.transport {
            TransportKind::Log => Arc::new(LogTransport),
            TransportKind::Local => Arc::new(LocalBroker::new()),
        };
        let worker = tokio::spawn(run_worker(queue, transport, config.delivery_timeout()));
        (hub, Some(worker))
    } else {
        (RealtimeHub::disabled(), None)
    };

    let storage = Arc::new(JsonFileStorage::new(config.data_dir.clone()));
    let store = match WorkItemStore::open(storage, hub) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Error: Failed to load data: {}", e);
            std::process::exit(1);
        }
    };

    let result = run(&store, &config, cli).await;

    // The worker stops once the last hub is gone.
    drop(store);
    if let Some(worker) = worker {
        let _ = worker.await;
    }

    if let Err(e) = result {
        ui::render_error(&e);
        std::process::exit(1);
    }
}

fn caller(store: &WorkItemStore, as_email: Option<&str>) -> CoreResult<Caller> {
    resolve_caller_by_email(store, as_email)
}

fn organization_id(store: &WorkItemStore, slug: &str) -> CoreResult<Uuid> {
    store
        .directory()
        .slugs
        .get(slug)
        .copied()
        .ok_or_else(|| CoreError::not_found("Organization"))
}

fn user_id(store: &WorkItemStore, email: &str) -> CoreResult<Uuid> {
    store
        .directory()
        .find_user_by_email(email)
        .map(|user| user.id)
        .ok_or_else(|| CoreError::not_found("User"))
}

fn user_ids(store: &WorkItemStore, emails: &[String]) -> CoreResult<Vec<Uuid>> {
    emails.iter().map(|email| user_id(store, email)).collect()
}

async fn run(store: &Arc<WorkItemStore>, config: &Config, cli: Cli) -> CoreResult<()> {
    let as_email = cli.as_email.as_deref();

    match cli.command {
        Commands::User(UserCommands::New { email, name }) => {
            let user = create_user(store, CreateUserParameters { email, name })?;
            println!("✓ User created: {}", user.email);
            println!("  {}", user.id.to_string().dimmed());
        }
        Commands::Org(command) => {
            let caller = caller(store, as_email)?;
            match command {
                OrgCommands::New { name, slug } => {
                    let org =
                        create_organization(store, &caller, CreateOrganizationParameters { name, slug })?;
                    println!("✓ Organization created: {} ({})", org.name, org.slug.cyan());
                }
                OrgCommands::List => {
                    let organizations = list_organizations(store, &caller);
                    if organizations.is_empty() {
                        println!("You are not a member of any organization");
                    }
                    for org in organizations {
                        let role = caller
                            .role_in(org.id)
                            .map(|r| r.as_str())
                            .unwrap_or_default();
                        println!("  {:<20} {}  {}", org.slug.cyan(), org.name.bold(), role.dimmed());
                    }
                }
                OrgCommands::Rename { org, name } => {
                    let organization_id = organization_id(store, &org)?;
                    let org = rename_organization(
                        store,
                        &caller,
                        RenameOrganizationParameters {
                            organization_id,
                            name,
                        },
                    )?;
                    println!("✓ Organization renamed: {}", org.name);
                }
            }
        }
        Commands::Member(command) => {
            let caller = caller(store, as_email)?;
            match command {
                MemberCommands::Add { org, email, role } => {
                    let membership = add_member(
                        store,
                        &caller,
                        AddMemberParameters {
                            organization_id: organization_id(store, &org)?,
                            user_id: user_id(store, &email)?,
                            role,
                        },
                    )?;
                    println!("✓ {} added to {} as {}", email, org, membership.role);
                }
                MemberCommands::Role { org, email, role } => {
                    change_role(
                        store,
                        &caller,
                        ChangeRoleParameters {
                            organization_id: organization_id(store, &org)?,
                            user_id: user_id(store, &email)?,
                            role,
                        },
                    )?;
                    println!("✓ {} is now {} in {}", email, role, org);
                }
                MemberCommands::Remove { org, email } => {
                    remove_member(
                        store,
                        &caller,
                        RemoveMemberParameters {
                            organization_id: organization_id(store, &org)?,
                            user_id: user_id(store, &email)?,
                        },
                    )?;
                    println!("✓ {} removed from {}", email, org);
                }
                MemberCommands::List { org } => {
                    let members = list_members(store, &caller, organization_id(store, &org)?)?;
                    for member in &members {
                        ui::render_member_line(member);
                    }
                }
            }
        }
        Commands::Project(command) => {
            let caller = caller(store, as_email)?;
            match command {
                ProjectCommands::New {
                    org,
                    key,
                    name,
                    description,
                    lead,
                    budget,
                    start,
                    due,
                } => {
                    let mut params = CreateProjectParameters::new(organization_id(store, &org)?, name, key);
                    params.description = description;
                    params.lead_id = lead.map(|email| user_id(store, &email)).transpose()?;
                    params.budget_cents = budget;
                    params.start_date = start;
                    params.due_date = due;

                    let project = create_project(store, &caller, params)?;
                    println!("✓ Project created: {} {}", project.key.cyan(), project.name);
                    println!("  {}", project.id.to_string().dimmed());
                }
                ProjectCommands::Update {
                    project,
                    name,
                    key,
                    status,
                    priority,
                    budget,
                } => {
                    let project = update_project(
                        store,
                        &caller,
                        project,
                        ProjectPatch {
                            name,
                            key,
                            status,
                            priority,
                            budget_cents: budget,
                            ..ProjectPatch::default()
                        },
                    )?;
                    println!("✓ Project updated: {} {}", project.key.cyan(), project.name);
                }
                ProjectCommands::List { org } => {
                    let projects = list_projects(store, &caller, organization_id(store, &org)?)?;
                    if projects.is_empty() {
                        println!("No projects yet");
                    }
                    for summary in &projects {
                        ui::render_project_line(summary);
                    }
                }
            }
        }
        Commands::Epic(EpicCommands::New { project, name }) => {
            let caller = caller(store, as_email)?;
            let epic = create_epic(store, &caller, CreateEpicParameters { project_id: project, name })?;
            println!("✓ Epic created: {}", epic.name);
            println!("  {}", epic.id.to_string().dimmed());
        }
        Commands::Label(LabelCommands::New { org, name, color }) => {
            let caller = caller(store, as_email)?;
            let label = create_label(
                store,
                &caller,
                CreateLabelParameters {
                    organization_id: organization_id(store, &org)?,
                    name,
                    color,
                },
            )?;
            println!("✓ Label created: {}", label.name);
            println!("  {}", label.id.to_string().dimmed());
        }
        Commands::Task(command) => {
            let caller = caller(store, as_email)?;
            run_task_command(store, config, caller, command).await?;
        }
        Commands::Comment(CommentCommands::Add { task, body }) => {
            let caller = caller(store, as_email)?;
            add_comment(store, &caller, AddCommentParameters { task_id: task, body })?;
            println!("✓ Comment added");
        }
        Commands::Timer(command) => {
            let caller = caller(store, as_email)?;
            match command {
                TimerCommands::Start {
                    task,
                    billable,
                    rate,
                } => {
                    record_time_entry(
                        store,
                        &caller,
                        RecordTimeEntryParameters {
                            task_id: task,
                            interval: TimeInterval::Open {
                                started_at: jiff::Timestamp::now(),
                            },
                            billable,
                            rate_cents: rate,
                        },
                    )?;
                    println!("✓ Timer started");
                }
                TimerCommands::Stop { task } => {
                    let entry = stop_timer(store, &caller, task)?;
                    println!("✓ Timer stopped after {}", ui::format_duration(entry.seconds));
                }
                TimerCommands::Log {
                    task,
                    minutes,
                    billable,
                    rate,
                } => {
                    let ended_at = jiff::Timestamp::now();
                    let seconds = minutes.saturating_mul(60);
                    let started_at = i64::try_from(seconds)
                        .ok()
                        .and_then(|s| ended_at.checked_sub(jiff::SignedDuration::from_secs(s)).ok())
                        .ok_or_else(|| CoreError::validation("minutes is out of range"))?;

                    let entry = record_time_entry(
                        store,
                        &caller,
                        RecordTimeEntryParameters {
                            task_id: task,
                            interval: TimeInterval::Closed {
                                started_at,
                                ended_at,
                                seconds: Some(seconds),
                            },
                            billable,
                            rate_cents: rate,
                        },
                    )?;
                    println!("✓ Logged {}", ui::format_duration(entry.seconds));
                }
            }
        }
        Commands::Notifications { unread, read } => {
            let caller = caller(store, as_email)?;
            if let Some(id) = read {
                mark_notification_read(store, &caller, id)?;
                println!("✓ Marked as read");
                return Ok(());
            }

            let notifications = list_notifications(store, &caller, unread);
            if notifications.is_empty() {
                println!("No notifications");
            }
            for notification in &notifications {
                ui::render_notification(notification);
            }
        }
    }

    Ok(())
}

async fn run_task_command(
    store: &Arc<WorkItemStore>,
    config: &Config,
    caller: Caller,
    command: TaskCommands,
) -> CoreResult<()> {
    match command {
        TaskCommands::Add {
            project,
            title,
            description,
            status,
            priority,
            points,
            start,
            due,
            epic,
            parent,
            assignee,
            label,
        } => {
            let mut params = CreateTaskParameters::new(project, title);
            params.description = description;
            params.status = status;
            params.priority = priority;
            params.points = points;
            params.start_date = start;
            params.due_date = due;
            params.epic_id = epic;
            params.parent_task_id = parent;
            params.assignee_ids = user_ids(store, &assignee)?;
            params.label_ids = label;

            let view = create_task(store, &caller, params)?;
            println!("✓ Task added: {}", view.task.title);
            println!("  #{}  {}", view.task.order_index, view.task.id.to_string().dimmed());
        }
        TaskCommands::Show { task } => {
            let view = get_task(store, &caller, task)?;
            let comments = list_comments(store, &caller, task)?;
            ui::render_task_detail(&view, &comments);
        }
        TaskCommands::Update {
            task,
            title,
            status,
            priority,
            points,
            order,
            due,
            assignee,
            unassign,
        } => {
            let assignee_ids = if unassign {
                Some(vec![])
            } else if assignee.is_empty() {
                None
            } else {
                Some(user_ids(store, &assignee)?)
            };
            let view = update_task(
                store,
                &caller,
                task,
                TaskPatch {
                    title,
                    status,
                    priority,
                    points: points.map(Some),
                    order_index: order,
                    due_date: due.map(Some),
                    assignee_ids,
                    ..TaskPatch::default()
                },
            )?;
            println!("✓ Task updated: {}", view.task.title);
        }
        TaskCommands::Delete { task } => {
            let report = delete_task(store, &caller, task)?;
            println!("✓ Deleted {} task(s)", report.task_ids.len());
            if report.comments + report.time_entries + report.files > 0 {
                println!(
                    "  {}",
                    format!(
                        "with {} comments, {} time entries, {} files",
                        report.comments, report.time_entries, report.files
                    )
                    .dimmed()
                );
            }
        }
        TaskCommands::List {
            project,
            status,
            priority,
            assignee,
            label,
            epic,
            search,
            from,
            to,
            page,
            limit,
        } => {
            let query = TaskQuery {
                project_id: project,
                filters: TaskFilters {
                    status,
                    priority,
                    assignee_ids: user_ids(store, &assignee)?,
                    label_ids: label,
                    epic_id: epic,
                    search,
                    start_date: from,
                    end_date: to,
                },
                page,
                limit,
            };
            let page =
                query_tasks_within(store.clone(), caller, query, config.query_timeout()).await?;
            ui::render_page(&page);
        }
    }
    Ok(())
}
