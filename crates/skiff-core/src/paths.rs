//! Remote path handling.
//!
//! Remote paths are always POSIX: `/`-separated, absolute. The dispatcher
//! normalises caller input once; backends can then rely on clean paths.
//! Object-store backends additionally map paths to keys (no leading `/`,
//! directories as `prefix/`).

/// Collapse duplicate slashes and strip a trailing slash (except for `/`).
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    if !path.starts_with('/') {
        out.push('/');
    }
    let mut prev_slash = out.ends_with('/');
    for c in path.chars() {
        if c == '/' {
            if !prev_slash {
                out.push('/');
            }
            prev_slash = true;
        } else {
            out.push(c);
            prev_slash = false;
        }
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Join `name` onto `base` with exactly one separator, then normalise.
pub fn join(base: &str, name: &str) -> String {
    normalize(&format!("{}/{}", base, name))
}

/// Last path segment, or the whole path when there is none.
pub fn file_name(path: &str) -> String {
    let n = normalize(path);
    n.rsplit('/').next().unwrap_or("").to_string()
}

/// Parent of a normalised path; `/` is its own parent.
pub fn parent(path: &str) -> String {
    let n = normalize(path);
    match n.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => n[..idx].to_string(),
    }
}

/// Translate a remote path into an object key (leading slash stripped).
pub fn object_key(path: &str) -> String {
    normalize(path).trim_start_matches('/').to_string()
}

/// Object key for a directory prefix: trailing `/`, empty for the root.
pub fn prefix_key(path: &str) -> String {
    let key = object_key(path);
    if key.is_empty() {
        key
    } else {
        format!("{}/", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_roots() {
        assert_eq!(normalize("a//b/"), "/a/b");
        assert_eq!(normalize("/a///b//c"), "/a/b/c");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("//"), "/");
        assert_eq!(normalize(""), "/");
    }

    #[test]
    fn join_round_trip() {
        // normalising `a//b/` and joining with `/c` yields `/a/b/c`
        assert_eq!(join(&normalize("a//b/"), "/c"), "/a/b/c");
        assert_eq!(join("/", "c"), "/c");
    }

    #[test]
    fn file_name_and_parent() {
        assert_eq!(file_name("/a/b/c.txt"), "c.txt");
        assert_eq!(parent("/a/b/c.txt"), "/a/b");
        assert_eq!(parent("/a"), "/");
        assert_eq!(parent("/"), "/");
    }

    #[test]
    fn object_keys() {
        assert_eq!(object_key("/photos/2024/img.jpg"), "photos/2024/img.jpg");
        assert_eq!(object_key("//photos"), "photos");
        assert_eq!(prefix_key("/photos"), "photos/");
        assert_eq!(prefix_key("/"), "");
    }
}
