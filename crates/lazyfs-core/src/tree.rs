// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Directory nodes and tree mutation
//!
//! A [`Tree`] exclusively owns its child files and directories by name.
//! Its children and attributes live behind a one-shot initializer: plain
//! directories start initialized, overlay directories populate themselves
//! from the host the first time anything looks at them. Reads take `&self`
//! and are safe from many threads; mutations take `&mut self`.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use crate::error::{FsError, FsResult};
use crate::node::File;
use crate::overlay::{load_dir, HostStatProvider, StatProvider};
use crate::types::{Attrs, FileType, Mode};
use crate::SEPARATOR;

/// Borrowed view of a child
#[derive(Clone, Copy, Debug)]
pub enum Node<'a> {
    File(&'a File),
    Dir(&'a Tree),
}

impl<'a> Node<'a> {
    pub fn attrs(&self) -> &'a Attrs {
        match self {
            Node::File(file) => file.attrs(),
            Node::Dir(dir) => dir.attrs(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }
}

#[derive(Debug)]
pub enum NodeMut<'a> {
    File(&'a mut File),
    Dir(&'a mut Tree),
}

/// An owned child detached from its parent
#[derive(Debug)]
pub enum Entry {
    File(File),
    Dir(Tree),
}

enum Initializer {
    /// Plain directory, created initialized
    Noop,
    Host {
        path: PathBuf,
        provider: Arc<dyn StatProvider>,
        fallback: Attrs,
    },
}

impl Initializer {
    fn run(&self) -> TreeState {
        match self {
            Initializer::Noop => TreeState::new(Attrs::default()),
            Initializer::Host {
                path,
                provider,
                fallback,
            } => load_dir(path, provider, fallback),
        }
    }
}

pub(crate) struct TreeState {
    pub(crate) attrs: Attrs,
    pub(crate) files: HashMap<String, File>,
    pub(crate) dirs: HashMap<String, Tree>,
}

impl TreeState {
    pub(crate) fn new(attrs: Attrs) -> Self {
        Self {
            attrs,
            files: HashMap::new(),
            dirs: HashMap::new(),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name) || self.dirs.contains_key(name)
    }
}

/// Reject names that cannot be a single directory entry.
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(SEPARATOR) {
        return Err(FsError::InvalidName);
    }
    Ok(())
}

/// A directory
pub struct Tree {
    init: Initializer,
    state: OnceLock<TreeState>,
}

impl Tree {
    /// Empty directory; the type bits of `mode` are forced to directory.
    pub fn new(mode: Mode, uid: u32, gid: u32) -> Self {
        let attrs = Attrs::new(mode.with_type(FileType::Directory), uid, gid);
        Self {
            init: Initializer::Noop,
            state: OnceLock::from(TreeState::new(attrs)),
        }
    }

    /// Directory mirroring a host path, populated on first access.
    pub fn from_host(path: impl Into<PathBuf>) -> Self {
        Self::from_host_with(path, HostStatProvider::shared(), Attrs::default())
    }

    /// Like [`Tree::from_host`] with an explicit provider. `fallback` is what
    /// the directory reports if the host path cannot be stat'ed.
    pub fn from_host_with(
        path: impl Into<PathBuf>,
        provider: Arc<dyn StatProvider>,
        fallback: Attrs,
    ) -> Self {
        Self {
            init: Initializer::Host {
                path: path.into(),
                provider,
                fallback,
            },
            state: OnceLock::new(),
        }
    }

    fn state(&self) -> &TreeState {
        self.state.get_or_init(|| self.init.run())
    }

    fn state_mut(&mut self) -> &mut TreeState {
        let init = &self.init;
        self.state.get_or_init(|| init.run());
        // Filled just above; `&mut self` means nothing can empty it in between
        match self.state.get_mut() {
            Some(state) => state,
            None => unreachable!("tree state initialized above"),
        }
    }

    /// Whether the initializer has already run.
    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    /// Run the initializer if it has not run yet.
    pub fn ensure_loaded(&self) {
        self.state();
    }

    pub fn attrs(&self) -> &Attrs {
        &self.state().attrs
    }

    pub fn mode(&self) -> Mode {
        self.attrs().mode
    }

    pub fn uid(&self) -> u32 {
        self.attrs().uid
    }

    pub fn gid(&self) -> u32 {
        self.attrs().gid
    }

    pub fn created(&self) -> SystemTime {
        self.attrs().created
    }

    pub fn modified(&self) -> SystemTime {
        self.attrs().modified
    }

    /// Set permission and special bits; the directory type is kept.
    pub fn set_mode(&mut self, mode: Mode) {
        self.state_mut().attrs.mode = mode.with_type(FileType::Directory);
    }

    pub fn set_owner(&mut self, uid: u32, gid: u32) {
        let attrs = &mut self.state_mut().attrs;
        attrs.uid = uid;
        attrs.gid = gid;
    }

    pub fn set_modified(&mut self, modified: SystemTime) {
        self.state_mut().attrs.modified = modified;
    }

    pub fn file(&self, name: &str) -> Option<&File> {
        self.state().files.get(name)
    }

    pub fn dir(&self, name: &str) -> Option<&Tree> {
        self.state().dirs.get(name)
    }

    pub fn file_mut(&mut self, name: &str) -> Option<&mut File> {
        self.state_mut().files.get_mut(name)
    }

    pub fn dir_mut(&mut self, name: &str) -> Option<&mut Tree> {
        self.state_mut().dirs.get_mut(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Node<'_>> {
        let state = self.state();
        if let Some(file) = state.files.get(name) {
            return Some(Node::File(file));
        }
        state.dirs.get(name).map(Node::Dir)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<NodeMut<'_>> {
        let state = self.state_mut();
        if let Some(file) = state.files.get_mut(name) {
            return Some(NodeMut::File(file));
        }
        state.dirs.get_mut(name).map(NodeMut::Dir)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state().contains(name)
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state();
        state.files.is_empty() && state.dirs.is_empty()
    }

    pub fn len(&self) -> usize {
        let state = self.state();
        state.files.len() + state.dirs.len()
    }

    /// Child names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let state = self.state();
        let mut names: Vec<&str> = state
            .files
            .keys()
            .chain(state.dirs.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }

    /// Children sorted by name.
    pub fn entries(&self) -> Vec<(&str, Node<'_>)> {
        let state = self.state();
        let mut entries: Vec<(&str, Node<'_>)> = state
            .files
            .iter()
            .map(|(name, file)| (name.as_str(), Node::File(file)))
            .chain(state.dirs.iter().map(|(name, dir)| (name.as_str(), Node::Dir(dir))))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Add an empty in-memory file.
    pub fn create_file(&mut self, name: &str, uid: u32, gid: u32, mode: Mode) -> FsResult<&mut File> {
        self.insert_file(File::new(name, mode, uid, gid))
    }

    /// Add an already built file under its own name.
    pub fn insert_file(&mut self, file: File) -> FsResult<&mut File> {
        validate_name(file.name())?;
        let state = self.state_mut();
        if state.contains(file.name()) {
            return Err(FsError::AlreadyExists);
        }
        let name = file.name().to_string();
        Ok(state.files.entry(name).or_insert(file))
    }

    /// Add an empty directory.
    pub fn create_dir(&mut self, name: &str, uid: u32, gid: u32, mode: Mode) -> FsResult<&mut Tree> {
        self.insert_dir(name, Tree::new(mode, uid, gid))
    }

    pub fn insert_dir(&mut self, name: &str, dir: Tree) -> FsResult<&mut Tree> {
        validate_name(name)?;
        let state = self.state_mut();
        if state.contains(name) {
            return Err(FsError::AlreadyExists);
        }
        Ok(state.dirs.entry(name.to_string()).or_insert(dir))
    }

    /// Unlink a child. Directories must be empty.
    pub fn remove(&mut self, name: &str) -> FsResult<Entry> {
        let state = self.state_mut();
        if let Some(file) = state.files.remove(name) {
            return Ok(Entry::File(file));
        }
        match state.dirs.get(name) {
            None => Err(FsError::NotFound),
            Some(dir) if !dir.is_empty() => Err(FsError::NotEmpty),
            Some(_) => state
                .dirs
                .remove(name)
                .map(Entry::Dir)
                .ok_or(FsError::NotFound),
        }
    }

    /// Detach a child regardless of its contents.
    pub fn take(&mut self, name: &str) -> Option<Entry> {
        let state = self.state_mut();
        if let Some(file) = state.files.remove(name) {
            return Some(Entry::File(file));
        }
        state.dirs.remove(name).map(Entry::Dir)
    }

    /// Attach a detached child under `name`. A file is renamed to match.
    pub fn insert_entry(&mut self, name: &str, entry: Entry) -> FsResult<()> {
        match entry {
            Entry::File(mut file) => {
                file.set_name(name);
                self.insert_file(file).map(|_| ())
            }
            Entry::Dir(dir) => self.insert_dir(name, dir).map(|_| ()),
        }
    }

    /// Directory at a canonical path of child directory names.
    pub fn descend<S: AsRef<str>>(&self, path: &[S]) -> FsResult<&Tree> {
        let mut current = self;
        for name in path {
            current = current.dir(name.as_ref()).ok_or(FsError::NotFound)?;
        }
        Ok(current)
    }

    pub fn descend_mut<S: AsRef<str>>(&mut self, path: &[S]) -> FsResult<&mut Tree> {
        let mut current = self;
        for name in path {
            current = current.dir_mut(name.as_ref()).ok_or(FsError::NotFound)?;
        }
        Ok(current)
    }

    /// Move a child between two directories of this tree.
    ///
    /// Both parents are canonical paths relative to `self`. Nothing changes
    /// unless the move succeeds: the target name must be free (the source's
    /// own name counts as taken). A directory cannot move beneath itself;
    /// that is reported like a collision, as [`FsError::AlreadyExists`].
    pub fn rename<S: AsRef<str>>(
        &mut self,
        old_parent: &[S],
        old_name: &str,
        new_parent: &[S],
        new_name: &str,
    ) -> FsResult<()> {
        validate_name(new_name)?;

        let source_is_dir = match self.descend(old_parent)?.lookup(old_name) {
            Some(node) => node.is_dir(),
            None => return Err(FsError::NotFound),
        };
        if self.descend(new_parent)?.contains(new_name) {
            return Err(FsError::AlreadyExists);
        }
        if source_is_dir && is_within(old_parent, old_name, new_parent) {
            return Err(FsError::AlreadyExists);
        }

        let entry = self
            .descend_mut(old_parent)?
            .take(old_name)
            .ok_or(FsError::NotFound)?;
        self.descend_mut(new_parent)?.insert_entry(new_name, entry)?;
        tracing::debug!(from = old_name, to = new_name, "entry renamed");
        Ok(())
    }
}

/// Whether `parent` is `dir_parent/dir_name` or lies below it.
fn is_within<S: AsRef<str>>(dir_parent: &[S], dir_name: &str, parent: &[S]) -> bool {
    parent.len() > dir_parent.len()
        && dir_parent
            .iter()
            .zip(parent)
            .all(|(a, b)| a.as_ref() == b.as_ref())
        && parent[dir_parent.len()].as_ref() == dir_name
}

impl Default for Tree {
    fn default() -> Self {
        Self::new(Mode::dir(0o755), 0, 0)
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Tree");
        match self.state.get() {
            Some(state) => dbg
                .field("attrs", &state.attrs)
                .field("files", &state.files.len())
                .field("dirs", &state.dirs.len()),
            None => dbg.field("initialized", &false),
        };
        dbg.finish()
    }
}
