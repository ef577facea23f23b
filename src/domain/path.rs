//! Logical path helpers

/// Split a path into its components, dropping empty and `.` segments.
/// `..` pops the previous component; it never climbs above the root.
pub fn split_path(path: &str) -> Vec<String> {
    let mut components: Vec<String> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            other => components.push(other.to_string()),
        }
    }
    components
}

/// Build an absolute, normalised path from components
pub fn join_path(components: &[String]) -> String {
    if components.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", components.join("/"))
    }
}

/// Resolve `path` against a working directory and normalise it
pub fn absolute_path(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        join_path(&split_path(path))
    } else {
        join_path(&split_path(&format!("{}/{}", cwd, path)))
    }
}

/// Split into (parent, name). The root has no name.
pub fn parent_and_name(path: &str) -> (String, Option<String>) {
    let mut components = split_path(path);
    let name = components.pop();
    (join_path(&components), name)
}
