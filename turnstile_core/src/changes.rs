//! Resolve a CI diff into the set of workspaces it touches
//!
//! The repository convention is one top-level folder per Power BI workspace,
//! so the first path component of a changed file (after the optional root
//! folder is stripped) names the workspace. Matching against the config is
//! exact and case-sensitive. Paths that don't resolve to a configured
//! workspace are expected in a CI diff and are skipped without comment.

use std::collections::BTreeSet;

use crate::config::PermissionConfig;

/// Resolve the raw `--files` argument into the distinct set of configured
/// workspace names it implicates. An empty result is a normal outcome, not
/// an error.
pub fn resolve_targets(
    files: &str,
    separator: &str,
    folder: Option<&str>,
    config: &PermissionConfig,
) -> BTreeSet<String> {
    let mut targets = BTreeSet::new();
    for path in files.split(separator) {
        let path = path.trim();
        if path.is_empty() {
            continue;
        }
        let relative = match folder {
            Some(root) if !root.is_empty() => match path.strip_prefix(root) {
                Some(rest) => rest,
                None => continue,
            },
            _ => path,
        };
        if let Some(workspace) = workspace_segment(relative) {
            if config.contains_workspace(workspace) {
                targets.insert(workspace.to_owned());
            }
        }
    }
    targets
}

/// The first path component, unless it is hidden (`.github` and friends
/// never name a workspace).
fn workspace_segment(path: &str) -> Option<&str> {
    path.trim_start_matches('/')
        .split('/')
        .find(|segment| !segment.is_empty())
        .filter(|segment| !segment.starts_with('.'))
}
