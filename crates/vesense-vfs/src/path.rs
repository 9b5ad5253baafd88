//! ---
//! vs_section: "04-file-store"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Virtual file store backing camera uploads."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
//! Lexical path helpers. Paths are always absolute, `/`-separated and
//! never end in a slash except for the root.

/// Clean `path`: collapse repeated separators, resolve `.` and `..`, anchor at `/`.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Resolve `path` against the working directory `cwd`.
pub fn join(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        normalize(path)
    } else {
        normalize(&format!("{cwd}/{path}"))
    }
}

/// Prefix shared by every entry directly inside `dir` (`/` or `/a/b/`).
pub fn dir_prefix(dir: &str) -> String {
    let dir = normalize(dir);
    if dir == "/" {
        dir
    } else {
        format!("{dir}/")
    }
}

/// Containing directory of a normalized path.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Last segment of a normalized path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `path` and each of its ancestors, root excluded.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(|(idx, _)| idx)
        .skip(1)
        .map(move |idx| &path[..idx])
        .chain(std::iter::once(path).filter(|p| *p != "/"))
}

/// Remainder of `path` below `prefix`, if `path` lies under it.
pub(crate) fn strip_dir<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    path.strip_prefix(prefix).filter(|rest| !rest.is_empty())
}
