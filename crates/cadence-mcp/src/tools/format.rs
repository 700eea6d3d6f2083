//! Plain-text formatters for tool responses.

use rusqlite::Connection;
use std::fmt::Write as _;

use cadence_core::error::CoreResult;
use cadence_core::machine;
use cadence_core::model::{Project, Scope, Task, UserId};
use cadence_core::store::parties;
use cadence_core::transition::{self, TASK_TRANSITIONS};

pub(crate) fn format_datetime(us: Option<i64>) -> String {
    us.map_or_else(
        || "Not set".to_string(),
        |us| {
            chrono::DateTime::from_timestamp_micros(us).map_or_else(
                || format!("{us}us"),
                |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            )
        },
    )
}

pub(crate) fn format_user(conn: &Connection, id: Option<UserId>) -> CoreResult<String> {
    let Some(id) = id else {
        return Ok("Unassigned".to_string());
    };
    Ok(parties::find_user(conn, id)?
        .map_or_else(|| format!("User ID {id}"), |user| user.display()))
}

fn format_estimate(value: Option<i64>) -> String {
    value.map_or_else(|| "Not provided".to_string(), |v| v.to_string())
}

pub(crate) fn format_task_summary(conn: &Connection, task: &Task) -> CoreResult<String> {
    let mut out = String::new();
    let _ = writeln!(out, "ID: {}", task.id);
    let _ = writeln!(out, "Name: {}", task.name);
    let _ = writeln!(out, "State: {}", task.state);
    let _ = writeln!(
        out,
        "Project: {}",
        match task.project_id {
            Some(id) => cadence_core::store::projects::get(conn, id)?.name,
            None => "None".to_string(),
        }
    );
    let _ = writeln!(
        out,
        "Scope: {}",
        match task.scope_id {
            Some(id) => cadence_core::store::scopes::get(conn, id)?.name,
            None => "None".to_string(),
        }
    );
    let _ = writeln!(
        out,
        "Assigned to: {}",
        format_user(conn, task.responsible_user_id)?
    );
    let _ = writeln!(out, "Due: {}", format_datetime(task.due_at_us));
    let _ = writeln!(out, "Nice to Have: {}", task.nice_to_have);
    let _ = writeln!(
        out,
        "Unassisted Estimate: {} hours",
        format_estimate(task.unassisted_estimate)
    );
    let _ = writeln!(
        out,
        "AI Assisted Estimate: {} hours",
        format_estimate(task.ai_assisted_estimate)
    );
    let _ = writeln!(out, "Actual: {} hours", format_estimate(task.actual_manhours));
    Ok(out)
}

pub(crate) fn format_task_details(conn: &Connection, task: &Task) -> CoreResult<String> {
    let mut out = format_task_summary(conn, task)?;
    let _ = writeln!(
        out,
        "\nDescription:\n{}",
        task.description.as_deref().unwrap_or("No description")
    );

    let history = transition::history(conn, &TASK_TRANSITIONS, task.id.0)?;
    if !history.is_empty() {
        out.push_str("\nState History:\n");
        for row in &history {
            let user_info = row
                .user_id()
                .map_or_else(String::new, |id| format!(" (User ID: {id})"));
            let _ = writeln!(
                out,
                "  - {} at {}{user_info}",
                row.to_state,
                format_datetime(Some(row.created_at_us))
            );
        }
    }

    let allowed = machine::task::allowed_transitions(task);
    if !allowed.is_empty() {
        let names: Vec<String> = allowed.iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "\nAllowed Transitions: {}", names.join(", "));
    }

    Ok(out)
}

pub(crate) fn format_tasks(conn: &Connection, tasks: &[Task]) -> CoreResult<String> {
    if tasks.is_empty() {
        return Ok("No tasks found.".to_string());
    }
    let mut out = format!("Found {} task(s):\n\n", tasks.len());
    for task in tasks {
        out.push_str(&format_task_summary(conn, task)?);
        out.push_str("\n---\n\n");
    }
    Ok(out)
}

pub(crate) fn format_scope_summary(conn: &Connection, scope: &Scope) -> CoreResult<String> {
    let mut out = String::new();
    let _ = writeln!(out, "ID: {}", scope.id);
    let _ = writeln!(out, "Name: {}", scope.name);
    let _ = writeln!(
        out,
        "Project: {}",
        cadence_core::store::projects::get(conn, scope.project_id)?.name
    );
    let _ = writeln!(
        out,
        "Percent Done: {}%",
        cadence_core::store::scopes::percent_done(conn, scope.id)?
    );
    let _ = writeln!(
        out,
        "Unassisted Estimate: {} hours",
        scope.cached_unassisted_estimate
    );
    let _ = writeln!(
        out,
        "AI Assisted Estimate: {} hours",
        scope.cached_ai_assisted_estimate
    );
    if let Some(description) = &scope.description {
        let _ = writeln!(out, "Description: {description}");
    }
    Ok(out)
}

pub(crate) fn format_scopes(conn: &Connection, scopes: &[Scope]) -> CoreResult<String> {
    if scopes.is_empty() {
        return Ok("No scopes found.".to_string());
    }
    let mut out = format!("Found {} scope(s):\n\n", scopes.len());
    for scope in scopes {
        out.push_str(&format_scope_summary(conn, scope)?);
        out.push_str("\n---\n\n");
    }
    Ok(out)
}

pub(crate) fn format_project_summary(conn: &Connection, project: &Project) -> CoreResult<String> {
    let mut out = String::new();
    let _ = writeln!(out, "ID: {}", project.id);
    let _ = writeln!(out, "Name: {}", project.name);
    let _ = writeln!(out, "Risk State: {}", project.risk_state);
    let _ = writeln!(
        out,
        "Team: {}",
        match project.team_id {
            Some(id) => parties::get_team(conn, id)?.name,
            None => "None".to_string(),
        }
    );
    let _ = writeln!(
        out,
        "Unassisted Estimate: {} hours",
        project.cached_unassisted_estimate
    );
    let _ = writeln!(
        out,
        "AI Assisted Estimate: {} hours",
        project.cached_ai_assisted_estimate
    );
    let _ = writeln!(out, "Actual: {} hours", project.cached_actual_manhours);
    if let Some(description) = &project.description {
        let _ = writeln!(out, "Description: {description}");
    }
    Ok(out)
}

pub(crate) fn format_projects(conn: &Connection, projects: &[Project]) -> CoreResult<String> {
    if projects.is_empty() {
        return Ok("No projects found.".to_string());
    }
    let mut out = format!("Found {} project(s):\n\n", projects.len());
    for project in projects {
        out.push_str(&format_project_summary(conn, project)?);
        out.push_str("\n---\n\n");
    }
    Ok(out)
}
