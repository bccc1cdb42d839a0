//! Link rewriting
//!
//! Worker nodes describe their processes with links pointing at themselves.
//! Callers must only ever talk to the scheduler, so those links are rewritten
//! to the scheduler's own routes keyed by the task id.

use runq_core::domain::process::Link;

pub const REL_STATUS: &str = "get status";
pub const REL_STOP: &str = "stop";
pub const REL_LOGS: &str = "view logs";
pub const REL_RECIPE: &str = "view recipe";
pub const REL_WEB_URL: &str = "web url";
pub const REL_SHELL_URL: &str = "shell url";

/// What to do with a remote link of a given relation
enum Rewrite {
    /// Replace with a scheduler route (`method`, path suffix after the workspace)
    Local(&'static str, &'static str),
    /// Links to the application itself, kept as they are
    PassThrough,
}

fn rewrite_for(rel: &str) -> Option<Rewrite> {
    match rel {
        REL_STATUS => Some(Rewrite::Local("GET", "status")),
        REL_STOP => Some(Rewrite::Local("POST", "stop")),
        REL_LOGS => Some(Rewrite::Local("GET", "logs")),
        REL_RECIPE => Some(Rewrite::Local("GET", "recipe")),
        REL_WEB_URL | REL_SHELL_URL => Some(Rewrite::PassThrough),
        _ => None,
    }
}

fn local_href(base_url: &str, workspace: &str, action: &str, task_id: u64) -> String {
    format!("{}/runner/{}/{}/{}", base_url, workspace, action, task_id)
}

/// Map remote worker links onto scheduler routes
///
/// Relations without a scheduler counterpart are dropped.
pub fn rewrite_links(base_url: &str, task_id: u64, workspace: &str, remote: &[Link]) -> Vec<Link> {
    remote
        .iter()
        .filter_map(|link| match rewrite_for(&link.rel)? {
            Rewrite::Local(method, action) => Some(Link::new(
                link.rel.clone(),
                method,
                local_href(base_url, workspace, action, task_id),
            )),
            Rewrite::PassThrough => Some(link.clone()),
        })
        .collect()
}

/// Links of a task that has no remote process yet
pub fn local_links(base_url: &str, task_id: u64, workspace: &str, stoppable: bool) -> Vec<Link> {
    let mut links = vec![Link::new(
        REL_STATUS,
        "GET",
        local_href(base_url, workspace, "status", task_id),
    )];
    if stoppable {
        links.push(Link::new(
            REL_STOP,
            "POST",
            local_href(base_url, workspace, "stop", task_id),
        ));
    }
    links
}
