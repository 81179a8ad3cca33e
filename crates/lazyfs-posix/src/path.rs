// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Lexical helpers for virtual paths

use lazyfs_core::{split_path, validate_name, FsResult, SEPARATOR};

/// Split `path` into its directory segments and final name, ignoring
/// trailing separators. The name must be a valid entry name.
pub(crate) fn parent_and_name(path: &str) -> FsResult<(Vec<String>, String)> {
    let trimmed = path.trim_end_matches(SEPARATOR);
    let (dir, name) = match trimmed.rfind(SEPARATOR) {
        Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
        None => ("", trimmed),
    };
    validate_name(name)?;
    Ok((split_path(dir), name.to_string()))
}

/// Join path elements and clean the result lexically: repeated separators
/// collapse, `.` disappears and `..` removes the preceding element.
pub fn join<S: AsRef<str>>(parts: &[S]) -> String {
    let joined = parts
        .iter()
        .map(AsRef::as_ref)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string());
    if joined.is_empty() {
        return String::new();
    }
    clean(&joined)
}

pub fn clean(path: &str) -> String {
    let rooted = path.starts_with(SEPARATOR);
    let mut out: Vec<&str> = Vec::new();
    for part in path.split(SEPARATOR) {
        match part {
            "" | "." => {}
            ".." => match out.last() {
                Some(&last) if last != ".." => {
                    out.pop();
                }
                _ if rooted => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    let body = out.join(&SEPARATOR.to_string());
    match (rooted, body.is_empty()) {
        (true, _) => format!("{SEPARATOR}{body}"),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}
