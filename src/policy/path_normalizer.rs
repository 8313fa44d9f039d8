//! Path Normalizer (C1): resolve glob patterns to their deepest concrete
//! base path, and walk the traversal ancestors of a path that need `search`
//! permission.

use std::path::{Path, PathBuf};

/// Directories the host already makes world-traversable; ancestors in this
/// set never need an explicit `search` ACL entry (spec.md §4.1).
const WORLD_TRAVERSABLE: &[&str] = &[
    "/",
    "/Users",
    "/tmp",
    "/private",
    "/private/tmp",
    "/private/var",
    "/var",
    "/opt",
    "/usr",
    "/usr/local",
    "/Applications",
    "/Library",
    "/System",
    "/Volumes",
];

fn is_world_traversable(path: &str) -> bool {
    WORLD_TRAVERSABLE.contains(&path)
}

/// Expand a leading `~` to the given home directory.
fn expand_home(pattern: &str, home: &str) -> String {
    if pattern == "~" {
        home.to_string()
    } else if let Some(rest) = pattern.strip_prefix("~/") {
        format!("{}/{}", home.trim_end_matches('/'), rest)
    } else {
        pattern.to_string()
    }
}

fn is_glob_segment(segment: &str) -> bool {
    segment.contains(['*', '?', '['])
}

/// Strip a glob pattern down to its deepest concrete base path.
///
/// Splits on `/`, returns the prefix before the first glob-bearing segment.
/// Fully concrete patterns are returned unchanged modulo trailing-slash
/// normalization.
pub fn strip_glob_to_base_path(pattern: &str, home: &str) -> String {
    let expanded = expand_home(pattern, home);
    let is_absolute = expanded.starts_with('/');

    let segments: Vec<&str> = expanded.split('/').filter(|s| !s.is_empty()).collect();

    let mut kept = Vec::new();
    for seg in &segments {
        if is_glob_segment(seg) {
            break;
        }
        kept.push(*seg);
    }

    if kept.is_empty() {
        return if is_absolute { "/".to_string() } else { String::new() };
    }

    let mut result = if is_absolute {
        format!("/{}", kept.join("/"))
    } else {
        kept.join("/")
    };

    // Collapse trailing slashes (join never introduces them, but guard
    // against callers passing an already-trailing-slash base).
    while result.len() > 1 && result.ends_with('/') {
        result.pop();
    }

    result
}

/// Walk from `path`'s immediate parent up to `/`, yielding each ancestor
/// directory that is not in the world-traversable whitelist.
pub fn ancestors_needing_traversal(path: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current: PathBuf = PathBuf::from(path);

    loop {
        let parent = match current.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            Some(p) if p == Path::new("/") => p.to_path_buf(),
            _ => break,
        };

        let parent_str = parent.to_string_lossy().to_string();
        let parent_str = if parent_str.is_empty() {
            "/".to_string()
        } else {
            parent_str
        };

        if !is_world_traversable(&parent_str) {
            result.push(parent_str.clone());
        }

        if parent_str == "/" {
            break;
        }

        current = parent;
    }

    result
}
