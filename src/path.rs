//! Helpers for `/`-separated path strings.
//!
//! Filesystem keys are always normalized absolute paths: a leading
//! separator, no empty, `.` or `..` components and no trailing separator
//! (except for the root itself).

use crate::{Error, Result};

pub const SEPARATOR: char = '/';

/// Checks the absolute path contract enforced by every session lookup.
pub fn validate(pathname: &str) -> Result {
    if !pathname.starts_with(SEPARATOR) {
        return Err(Error::InvalidArgument);
    }
    if pathname.len() > 1 && pathname.ends_with(SEPARATOR) {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

/// Splits a path into components.
///
/// Empty and `.` components are dropped and `..` removes the previous
/// component, stopping at the root.
pub fn components(pathname: &str) -> Vec<String> {
    let mut out = Vec::new();
    for part in pathname.split(SEPARATOR) {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            part => out.push(part.to_owned()),
        }
    }
    out
}

/// Builds an absolute path from components.
pub fn join<S: AsRef<str>>(components: &[S]) -> String {
    let mut out = String::new();
    for component in components {
        out.push(SEPARATOR);
        out.push_str(component.as_ref());
    }
    if out.is_empty() {
        out.push(SEPARATOR);
    }
    out
}

pub fn normalize(pathname: &str) -> String {
    join(&components(pathname))
}

/// Appends one name to a normalized directory path.
pub fn child(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// The normalized parent of `pathname`. The root is its own parent.
pub fn parent(pathname: &str) -> String {
    let mut components = components(pathname);
    components.pop();
    join(&components)
}

/// The last component of `pathname`, empty for the root.
pub fn file_name(pathname: &str) -> String {
    components(pathname).pop().unwrap_or_default()
}

/// Resolves `pathname` against `cwd` and normalizes the result.
pub fn absolute(pathname: &str, cwd: &str) -> String {
    if pathname.starts_with(SEPARATOR) {
        normalize(pathname)
    } else {
        normalize(&format!("{cwd}/{pathname}"))
    }
}

/// Directory part of a normalized key, without allocating.
pub(crate) fn key_parent(key: &str) -> &str {
    match key.rfind(SEPARATOR) {
        Some(0) => "/",
        Some(i) => &key[..i],
        None => "",
    }
}

/// Whether `key` sits exactly one level below the normalized `dir`.
pub(crate) fn is_immediate_child(key: &str, dir: &str) -> bool {
    key != dir && key_parent(key) == dir
}
