use colored::*;

use workboard::{
    CoreError, ErrorKind,
    models::{
        comment::Comment,
        notification::Notification,
        task::{Priority, Status, TaskView},
    },
    query::TaskPage,
    services::{memberships::MemberView, projects::ProjectSummary},
};

/// Get the terminal width, defaulting to 80 if unavailable
fn get_terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}

pub fn get_status_glyph(status: Status) -> ColoredString {
    match status {
        Status::Done => "✓".dimmed(),
        Status::Blocked => "●".red(),
        Status::InProgress | Status::Review => "◐".yellow(),
        Status::Backlog | Status::Todo => "○".normal(),
    }
}

fn colored_priority(priority: Priority) -> ColoredString {
    match priority {
        Priority::Urgent => priority.as_str().red().bold(),
        Priority::High => priority.as_str().red(),
        Priority::Medium => priority.as_str().normal(),
        Priority::Low => priority.as_str().dimmed(),
    }
}

/// Prints `left` and right-aligns `right` when the terminal is wide enough.
/// Widths are measured on the plain text.
fn print_aligned(left: ColoredString, left_len: usize, right: &str) {
    let terminal_width = get_terminal_width();
    let right_len = right.chars().count();

    if !right.is_empty() && left_len + right_len + 4 < terminal_width {
        let padding = terminal_width - left_len - right_len - 2;
        println!("{}{}{}", left, " ".repeat(padding), right.dimmed());
    } else if !right.is_empty() {
        println!("{}  {}", left, right.dimmed());
    } else {
        println!("{}", left);
    }
}

/// One task: order index, glyph, title and right-aligned status and priority
pub fn render_task_line(view: &TaskView) {
    let task = &view.task;
    let id_str = format!("{:>4}", task.order_index);
    let left = format!("  {}  {}  {}", id_str, " ", task.title);
    let left_len = left.chars().count();

    let styled = format!("  {}  {}  {}", id_str, get_status_glyph(task.status), task.title);
    let styled = if task.status == Status::Done {
        styled.dimmed()
    } else {
        styled.bold()
    };

    let mut right = vec![task.status.as_str().to_string()];
    if let Some(due) = task.due_date {
        right.push(format!("due {}", due.strftime("%b %d")));
    }
    if !view.assignee_ids.is_empty() {
        right.push(format!("{} assigned", view.assignee_ids.len()));
    }
    print_aligned(styled, left_len, &right.join("  ·  "));
}

pub fn render_task_detail(view: &TaskView, comments: &[Comment]) {
    let task = &view.task;
    println!(
        "\n  {} {}\n",
        get_status_glyph(task.status),
        task.title.bold()
    );
    println!("  {}  {}", "id".dimmed(), task.id);
    println!("  {}  {}", "order".dimmed(), task.order_index);
    println!(
        "  {}  {}  {}",
        "state".dimmed(),
        task.status,
        colored_priority(task.priority)
    );
    if let Some(points) = task.points {
        println!("  {}  {}", "points".dimmed(), points);
    }
    if task.start_date.is_some() || task.due_date.is_some() {
        let fmt = |d: Option<jiff::civil::Date>| d.map(|d| d.to_string()).unwrap_or_else(|| "…".into());
        println!("  {}  {} → {}", "dates".dimmed(), fmt(task.start_date), fmt(task.due_date));
    }
    if let Some(parent) = task.parent_task_id {
        println!("  {}  {}", "parent".dimmed(), parent);
    }
    if let Some(description) = &task.description {
        println!("\n  {}", description);
    }
    println!(
        "\n  {}",
        format!(
            "{} subtasks · {} comments · {} time entries",
            view.subtask_count, view.comment_count, view.time_entry_count
        )
        .dimmed()
    );

    if !comments.is_empty() {
        render_section_header("Comments");
        for comment in comments {
            println!(
                "  {}  {}",
                format_timestamp(comment.created_at).dimmed(),
                comment.body
            );
        }
    }
    println!();
}

pub fn render_page(page: &TaskPage) {
    if page.items.is_empty() {
        println!("No matching tasks");
        return;
    }
    render_view_header("Tasks", page.total);
    for view in &page.items {
        render_task_line(view);
    }
    println!(
        "\n  {}",
        format!("page {} of {}", page.page, page.total_pages.max(1)).dimmed()
    );
}

pub fn render_project_line(summary: &ProjectSummary) {
    let project = &summary.project;
    let left = format!("  {:<10}  {}", project.key, project.name);
    let left_len = left.chars().count();
    let styled = format!("  {:<10}  {}", project.key.cyan(), project.name).bold();
    let right = format!(
        "{} tasks  ·  {} epics  ·  {}",
        summary.task_count, summary.epic_count, project.status
    );
    print_aligned(styled, left_len, &right);
}

pub fn render_member_line(member: &MemberView) {
    let label = match &member.name {
        Some(name) => format!("{} <{}>", name, member.email),
        None => member.email.clone(),
    };
    println!("  {:<9} {}", member.membership.role.as_str().cyan(), label);
}

pub fn render_notification(notification: &Notification) {
    let marker = if notification.read {
        " ".normal()
    } else {
        "•".blue()
    };
    println!(
        "  {} {}  {}",
        marker,
        notification.title.bold(),
        format_timestamp(notification.created_at).dimmed()
    );
    println!("    {}", notification.body);
    println!("    {}", notification.id.to_string().dimmed());
}

/// Format a timestamp for display (e.g., "Feb 15", "Today", "Yesterday")
pub fn format_timestamp(timestamp: jiff::Timestamp) -> String {
    let zoned = jiff::Zoned::new(timestamp, jiff::tz::TimeZone::system());
    let date = zoned.date();
    let today = jiff::Zoned::now().date();

    if date == today {
        "Today".to_string()
    } else if today.yesterday().is_ok_and(|yesterday| yesterday == date) {
        "Yesterday".to_string()
    } else {
        date.strftime("%b %d").to_string()
    }
}

/// `5400` as "1h 30m"
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    match (hours, minutes) {
        (0, 0) => format!("{}s", seconds),
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

/// Render a view header with title and count
pub fn render_view_header(title: &str, count: usize) {
    let task_word = if count == 1 { "task" } else { "tasks" };
    println!("\n  {} ({} {})\n", title.cyan().bold(), count, task_word);
}

/// Render a section header (e.g., "Comments")
pub fn render_section_header(title: &str) {
    println!("\n  ─── {} ───\n", title.bold());
}

pub fn render_error(error: &CoreError) {
    eprintln!("{} {}", "Error:".red().bold(), error);
    let hint = match error.kind() {
        ErrorKind::Unauthenticated => Some("Pass --as <email> with a registered user."),
        ErrorKind::Access => Some("Your role in this organization does not allow that."),
        ErrorKind::Timeout => Some("Raise query_timeout_ms or narrow the filters."),
        _ => None,
    };
    if let Some(hint) = hint {
        eprintln!("\n{}", hint);
    }
}
