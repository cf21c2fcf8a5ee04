//! Lexical path normalisation.
//!
//! Every key in the store is an absolute, cleaned, forward-slash path. All
//! public store operations clean their inputs through [`clean`] first, so the
//! rest of the crate can assume canonical form.

/// Cleans a path to canonical absolute form.
///
/// Collapses repeated separators, resolves `.` and `..` lexically (rooted, so
/// `..` never escapes `/`), and strips any trailing separator. The empty
/// string and `"/"` both clean to `"/"`. Relative input is treated as rooted.
pub fn clean(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Returns the parent of a cleaned path. The parent of `"/"` is `"/"`.
pub fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => "/".to_string(),
    }
}

/// Returns the final component of a cleaned path; `"/"` for the root.
pub fn base(path: &str) -> &str {
    if path == "/" {
        return "/";
    }
    path.rsplit('/').next().unwrap_or("/")
}
