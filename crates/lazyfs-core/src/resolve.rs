// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path resolution
//!
//! Resolution works on segment lists and produces canonical locations: a
//! list of real directory names from the root, with every `.`, `..` and
//! symlink already applied. `..` is structural. It pops the last real
//! directory and re-descends from the root, so `a/link/..` lands in the
//! link target's parent and not in `a`.
//!
//! Every top-level call owns one [`Resolver`]. It remembers each symlink
//! substitution it performed together with the segments still pending at
//! that moment; meeting the same pair twice means the walk is cycling.
//! Substitutions are also capped by the configured expansion limit.

use std::collections::{HashSet, VecDeque};

use crate::config::DEFAULT_MAX_SYMLINK_EXPANSIONS;
use crate::error::{FsError, FsResult};
use crate::tree::{Node, NodeMut, Tree};
use crate::{split_path, SEPARATOR};

/// Canonical position of a resolved path
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    Dir(Vec<String>),
    File { parent: Vec<String>, name: String },
}

impl Location {
    /// Full canonical segment list.
    pub fn segments(&self) -> Vec<String> {
        match self {
            Location::Dir(path) => path.clone(),
            Location::File { parent, name } => {
                let mut path = parent.clone();
                path.push(name.clone());
                path
            }
        }
    }

    /// Absolute path string, `/` for the root.
    pub fn to_path_string(&self) -> String {
        let mut out = String::new();
        for segment in self.segments() {
            out.push(SEPARATOR);
            out.push_str(&segment);
        }
        if out.is_empty() {
            out.push(SEPARATOR);
        }
        out
    }

    /// Parent directory and final name; `None` for the root.
    pub fn split_parent(&self) -> Option<(Vec<String>, String)> {
        match self {
            Location::File { parent, name } => Some((parent.clone(), name.clone())),
            Location::Dir(path) => {
                let (name, parent) = path.split_last()?;
                Some((parent.to_vec(), name.clone()))
            }
        }
    }
}

/// Resolution state for one top-level call
pub struct Resolver<'t> {
    root: &'t Tree,
    limit: usize,
    expansions: usize,
    visited: HashSet<(Vec<String>, Vec<String>)>,
}

fn owned<S: AsRef<str>>(segments: &[S]) -> Vec<String> {
    segments.iter().map(|s| s.as_ref().to_string()).collect()
}

impl<'t> Resolver<'t> {
    pub fn new(root: &'t Tree, limit: usize) -> Self {
        Self {
            root,
            limit,
            expansions: 0,
            visited: HashSet::new(),
        }
    }

    /// Resolve every segment as a directory.
    pub fn walk_dir<S: AsRef<str>>(&mut self, segments: &[S]) -> FsResult<Vec<String>> {
        self.walk(Vec::new(), owned(segments), &[])
    }

    /// Resolve a full path. With `follow`, a symlink in the final position
    /// is replaced by what it points at; a dangling one is `NotFound`.
    pub fn locate<S: AsRef<str>>(&mut self, segments: &[S], follow: bool) -> FsResult<Location> {
        self.locate_from(Vec::new(), owned(segments), follow)
    }

    fn locate_from(&mut self, base: Vec<String>, segments: Vec<String>, follow: bool) -> FsResult<Location> {
        let names_dir = segments
            .last()
            .map_or(true, |last| matches!(last.as_str(), "" | "." | ".."));
        if names_dir {
            return Ok(Location::Dir(self.walk(base, segments, &[])?));
        }

        let mut parent_segments = segments;
        let last = parent_segments.pop().unwrap_or_default();
        let tail = [last.clone()];
        let parent = self.walk(base, parent_segments, &tail)?;
        let dir = self.root.descend(&parent)?;

        if let Some(file) = dir.file(&last) {
            if follow && file.is_symlink() {
                let target = file.link_target()?;
                if target.is_empty() {
                    return Err(FsError::NotFound);
                }
                let mut link = parent.clone();
                link.push(last);
                self.record_expansion(link, Vec::new())?;
                let base = if target.starts_with(SEPARATOR) { Vec::new() } else { parent };
                return self.locate_from(base, split_path(&target), true);
            }
            return Ok(Location::File { parent, name: last });
        }
        if let Some(child) = dir.dir(&last) {
            child.ensure_loaded();
            let mut path = parent;
            path.push(last);
            return Ok(Location::Dir(path));
        }
        Err(FsError::NotFound)
    }

    /// Descend from `base` through `segments`. `tail` is what the caller
    /// will resolve afterwards; it only feeds cycle detection.
    fn walk(&mut self, base: Vec<String>, segments: Vec<String>, tail: &[String]) -> FsResult<Vec<String>> {
        let mut resolved = base;
        let mut current = self.root.descend(&resolved)?;
        current.ensure_loaded();
        let mut pending: VecDeque<String> = segments.into();

        while let Some(segment) = pending.pop_front() {
            match segment.as_str() {
                "" | "." => {}
                ".." => {
                    if resolved.pop().is_none() {
                        return Err(FsError::NotFound);
                    }
                    current = self.root.descend(&resolved)?;
                }
                name => {
                    if let Some(dir) = current.dir(name) {
                        dir.ensure_loaded();
                        resolved.push(name.to_string());
                        current = dir;
                        continue;
                    }
                    let file = current.file(name).ok_or(FsError::NotFound)?;
                    if !file.is_symlink() {
                        return Err(FsError::NotADirectory);
                    }
                    let target = file.link_target()?;
                    // An empty target names nothing, not the link's own directory
                    if target.is_empty() {
                        return Err(FsError::NotFound);
                    }

                    let mut link = resolved.clone();
                    link.push(name.to_string());
                    let mut rest: Vec<String> = pending.iter().cloned().collect();
                    rest.extend_from_slice(tail);
                    self.record_expansion(link, rest)?;

                    if target.starts_with(SEPARATOR) {
                        resolved.clear();
                        current = self.root;
                    }
                    for part in split_path(&target).into_iter().rev() {
                        pending.push_front(part);
                    }
                }
            }
        }
        Ok(resolved)
    }

    fn record_expansion(&mut self, link: Vec<String>, rest: Vec<String>) -> FsResult<()> {
        self.expansions += 1;
        if self.expansions > self.limit {
            tracing::trace!(limit = self.limit, "symlink expansion limit reached");
            return Err(FsError::SymlinkLoop);
        }
        if !self.visited.insert((link, rest)) {
            tracing::trace!("symlink cycle detected");
            return Err(FsError::SymlinkLoop);
        }
        Ok(())
    }
}

impl Tree {
    /// Directory reached by resolving `segments` from this tree as root.
    pub fn walk_dir<S: AsRef<str>>(&self, segments: &[S]) -> FsResult<&Tree> {
        let path = Resolver::new(self, DEFAULT_MAX_SYMLINK_EXPANSIONS).walk_dir(segments)?;
        self.descend(&path)
    }

    pub fn walk_dir_mut<S: AsRef<str>>(&mut self, segments: &[S]) -> FsResult<&mut Tree> {
        let path = Resolver::new(self, DEFAULT_MAX_SYMLINK_EXPANSIONS).walk_dir(segments)?;
        self.descend_mut(&path)
    }

    pub fn locate<S: AsRef<str>>(&self, segments: &[S], follow: bool) -> FsResult<Location> {
        Resolver::new(self, DEFAULT_MAX_SYMLINK_EXPANSIONS).locate(segments, follow)
    }

    /// The file or directory at `segments`.
    pub fn get<S: AsRef<str>>(&self, segments: &[S], follow: bool) -> FsResult<Node<'_>> {
        let location = self.locate(segments, follow)?;
        self.node_at(&location)
    }

    pub fn get_mut<S: AsRef<str>>(&mut self, segments: &[S], follow: bool) -> FsResult<NodeMut<'_>> {
        let location = self.locate(segments, follow)?;
        self.node_at_mut(&location)
    }

    pub fn node_at(&self, location: &Location) -> FsResult<Node<'_>> {
        match location {
            Location::Dir(path) => self.descend(path).map(Node::Dir),
            Location::File { parent, name } => self
                .descend(parent)?
                .file(name)
                .map(Node::File)
                .ok_or(FsError::NotFound),
        }
    }

    pub fn node_at_mut(&mut self, location: &Location) -> FsResult<NodeMut<'_>> {
        match location {
            Location::Dir(path) => self.descend_mut(path).map(NodeMut::Dir),
            Location::File { parent, name } => self
                .descend_mut(parent)?
                .file_mut(name)
                .map(NodeMut::File)
                .ok_or(FsError::NotFound),
        }
    }
}
