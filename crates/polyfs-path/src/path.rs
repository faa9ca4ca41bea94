//! Canonical path-string operations.

/// The virtual path separator.
pub const SEPARATOR: char = '/';

/// Normalize a path: collapse repeated separators, drop `.`, resolve `..`.
///
/// Absolute paths stay absolute and `..` never climbs above `/`. Relative
/// paths keep leading `..` components they cannot resolve. The empty
/// string and `.` normalize to the empty string.
pub fn normpath(path: &str) -> String {
    let absolute = path.starts_with(SEPARATOR);
    let mut stack: Vec<&str> = Vec::new();

    for component in path.split(SEPARATOR) {
        match component {
            "" | "." => {}
            ".." => match stack.last() {
                Some(&last) if last != ".." => {
                    stack.pop();
                }
                _ if absolute => {}
                _ => stack.push(".."),
            },
            name => stack.push(name),
        }
    }

    let joined = stack.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Strip leading separators, making the path relative.
pub fn relpath(path: &str) -> &str {
    path.trim_start_matches(SEPARATOR)
}

/// Ensure the path starts with a separator.
pub fn abspath(path: &str) -> String {
    if path.starts_with(SEPARATOR) {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Join two paths and normalize the result.
///
/// An absolute `tail` replaces `head` entirely.
pub fn join(head: &str, tail: &str) -> String {
    if tail.starts_with(SEPARATOR) || head.is_empty() {
        normpath(tail)
    } else {
        normpath(&format!("{head}/{tail}"))
    }
}

/// Split a path into `(dirname, basename)`.
///
/// `"foo/bar"` → `("foo", "bar")`, `"/foo"` → `("/", "foo")`,
/// `"foo"` → `("", "foo")`, `"/"` → `("/", "")`.
pub fn split(path: &str) -> (&str, &str) {
    let trimmed = if path.len() > 1 {
        path.trim_end_matches(SEPARATOR)
    } else {
        path
    };
    if trimmed.is_empty() && !path.is_empty() {
        return ("/", "");
    }
    match trimmed.rfind(SEPARATOR) {
        None => ("", trimmed),
        Some(0) => ("/", &trimmed[1..]),
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
    }
}

/// The directory part of a path.
pub fn dirname(path: &str) -> &str {
    split(path).0
}

/// The final component of a path.
pub fn basename(path: &str) -> &str {
    split(path).1
}

/// The normalized, non-empty components of a path.
pub fn components(path: &str) -> Vec<String> {
    normpath(path)
        .split(SEPARATOR)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns true if the path names the root.
pub fn is_root(path: &str) -> bool {
    matches!(normpath(path).as_str(), "" | "/")
}

/// Returns true if `prefix` contains `path`, compared component-wise.
///
/// `/a` contains `/a` and `/a/b`, but not `/ab`.
pub fn is_prefix(prefix: &str, path: &str) -> bool {
    let prefix = components(prefix);
    let path = components(path);
    prefix.len() <= path.len() && prefix.iter().zip(path.iter()).all(|(a, b)| a == b)
}

/// Returns true if both paths share the same parent directory.
pub fn is_same_dir(a: &str, b: &str) -> bool {
    let a = normpath(&abspath(a));
    let b = normpath(&abspath(b));
    dirname(&a) == dirname(&b)
}
