// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Archive-extraction interface over a lazyfs tree
//!
//! [`Placer`] is what an unpacker drives: it creates directories, links,
//! fifos and device nodes at relative paths, sets ownership, permissions
//! and times from archive headers, and reads back [`Metadata`] records.
//! Contents are written through the [`PosixFs`] handles it hands out.

mod metadata;
pub mod perms;

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use lazyfs_core::{
    split_path, File, FileType, FsConfig, FsError, FsResult, HandleId, Node, NodeMut, Resolver,
    Tree, SEPARATOR,
};
use lazyfs_posix::{clean, PosixFs};

pub use crate::metadata::{EntryType, Metadata};
pub use crate::perms::{mode_to_perms, perms_to_mode};

/// Path relative to the placer root, `.` for the root itself.
fn relative(path: &str) -> String {
    clean(path.trim_start_matches(SEPARATOR))
}

/// Segments of a relative path; the root has none.
fn rel_segments(path: &str) -> Vec<String> {
    match relative(path).as_str() {
        "." => Vec::new(),
        rel => split_path(rel),
    }
}

pub struct Placer {
    tree: Arc<RwLock<Tree>>,
    fs: PosixFs,
}

impl Placer {
    pub fn new(tree: Tree, config: FsConfig) -> Self {
        Self::shared(Arc::new(RwLock::new(tree)), config)
    }

    /// Place into a tree other views may also be using.
    pub fn shared(tree: Arc<RwLock<Tree>>, config: FsConfig) -> Self {
        Self {
            fs: PosixFs::shared(Arc::clone(&tree), config),
            tree,
        }
    }

    /// The POSIX view used for file contents.
    pub fn posix(&self) -> &PosixFs {
        &self.fs
    }

    pub fn base_path(&self) -> String {
        SEPARATOR.to_string()
    }

    fn limit(&self) -> usize {
        self.fs.config().resolution.max_symlink_expansions
    }

    fn read_tree(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tree(&self) -> RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open an existing file for reading and writing, following symlinks.
    pub fn open_file(&self, path: &str) -> FsResult<HandleId> {
        self.fs.open(&relative(path))
    }

    /// Create a directory owned like its parent.
    pub fn mkdir(&self, path: &str, perms: u32) -> FsResult<()> {
        let mut segments = rel_segments(path);
        let name = segments.pop().ok_or(FsError::AlreadyExists)?;
        let mut tree = self.write_tree();
        let parent = Resolver::new(&tree, self.limit()).walk_dir(&segments)?;
        let dir = tree.descend_mut(&parent)?;
        let (uid, gid) = (dir.uid(), dir.gid());
        let mode = perms_to_mode(perms).with_type(FileType::Directory);
        dir.create_dir(&name, uid, gid, mode)?;
        tracing::debug!(path, perms, "directory placed");
        Ok(())
    }

    /// Add a file built by `build` (given the name and the configured
    /// identity) in the parent directory of `path`.
    fn place(&self, path: &str, build: impl FnOnce(String, u32, u32) -> FsResult<File>) -> FsResult<()> {
        let mut segments = rel_segments(path);
        let name = segments.pop().ok_or(FsError::AlreadyExists)?;
        let mut tree = self.write_tree();
        let parent = Resolver::new(&tree, self.limit()).walk_dir(&segments)?;
        let security = &self.fs.config().security;
        let file = build(name, security.euid, security.egid)?;
        tree.descend_mut(&parent)?.insert_file(file)?;
        Ok(())
    }

    pub fn mklink(&self, path: &str, target: &str) -> FsResult<()> {
        self.place(path, |name, uid, gid| Ok(File::symlink(name, target, uid, gid)))?;
        tracing::debug!(path, target, "symlink placed");
        Ok(())
    }

    pub fn mkfifo(&self, path: &str, perms: u32) -> FsResult<()> {
        let bits = perms_to_mode(perms).bits();
        self.place(path, |name, uid, gid| Ok(File::fifo(name, bits, uid, gid)))?;
        tracing::debug!(path, "fifo placed");
        Ok(())
    }

    pub fn mkdev_block(&self, path: &str, major: u64, minor: u64, perms: u32) -> FsResult<()> {
        self.mkdev(path, FileType::BlockDevice, major, minor, perms)
    }

    pub fn mkdev_char(&self, path: &str, major: u64, minor: u64, perms: u32) -> FsResult<()> {
        self.mkdev(path, FileType::CharDevice, major, minor, perms)
    }

    fn mkdev(&self, path: &str, kind: FileType, major: u64, minor: u64, perms: u32) -> FsResult<()> {
        let bits = perms_to_mode(perms).bits();
        self.place(path, |name, uid, gid| File::device(name, kind, major, minor, bits, uid, gid))?;
        tracing::debug!(path, ?kind, major, minor, "device placed");
        Ok(())
    }

    fn update(&self, path: &str, follow: bool, f: impl FnOnce(NodeMut<'_>)) -> FsResult<()> {
        let mut tree = self.write_tree();
        let location = Resolver::new(&tree, self.limit()).locate(&rel_segments(path), follow)?;
        f(tree.node_at_mut(&location)?);
        Ok(())
    }

    /// Set ownership without following a final symlink.
    pub fn lchown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        self.update(path, false, |node| match node {
            NodeMut::File(file) => file.set_owner(uid, gid),
            NodeMut::Dir(dir) => dir.set_owner(uid, gid),
        })
    }

    /// Replace permission and special bits, following symlinks.
    pub fn chmod(&self, path: &str, perms: u32) -> FsResult<()> {
        let perm_bits = perms_to_mode(perms).bits();
        self.update(path, true, |node| match node {
            NodeMut::File(file) => file.set_mode(file.mode().with_perms(perm_bits)),
            NodeMut::Dir(dir) => dir.set_mode(dir.mode().with_perms(perm_bits)),
        })
    }

    /// Set the modification time; `atime` is not tracked.
    pub fn set_times_nano(&self, path: &str, mtime: SystemTime, _atime: SystemTime) -> FsResult<()> {
        self.set_mtime(path, mtime, true)
    }

    /// Like [`Placer::set_times_nano`] without following a final symlink.
    pub fn set_times_lnano(&self, path: &str, mtime: SystemTime, _atime: SystemTime) -> FsResult<()> {
        self.set_mtime(path, mtime, false)
    }

    fn set_mtime(&self, path: &str, mtime: SystemTime, follow: bool) -> FsResult<()> {
        self.update(path, follow, |node| match node {
            NodeMut::File(file) => file.set_modified(mtime),
            NodeMut::Dir(dir) => dir.set_modified(mtime),
        })
    }

    fn metadata(&self, path: &str, follow: bool) -> FsResult<Metadata> {
        let tree = self.read_tree();
        let location = Resolver::new(&tree, self.limit()).locate(&rel_segments(path), follow)?;
        Metadata::from_node(relative(path), tree.node_at(&location)?)
    }

    pub fn stat(&self, path: &str) -> FsResult<Metadata> {
        self.metadata(path, true)
    }

    pub fn lstat(&self, path: &str) -> FsResult<Metadata> {
        self.metadata(path, false)
    }

    /// Sorted names in the directory at `path`.
    pub fn read_dir_names(&self, path: &str) -> FsResult<Vec<String>> {
        let tree = self.read_tree();
        let location = Resolver::new(&tree, self.limit()).locate(&rel_segments(path), true)?;
        match tree.node_at(&location)? {
            Node::Dir(dir) => Ok(dir.names().into_iter().map(str::to_string).collect()),
            Node::File(_) => Err(FsError::NotADirectory),
        }
    }

    /// `(target, true)` for a symlink, `("", false)` for anything else.
    pub fn readlink(&self, path: &str) -> FsResult<(String, bool)> {
        let tree = self.read_tree();
        Self::readlink_in(&tree, &rel_segments(path), self.limit())
    }

    fn readlink_in(tree: &Tree, segments: &[String], limit: usize) -> FsResult<(String, bool)> {
        let location = Resolver::new(tree, limit).locate(segments, false)?;
        match tree.node_at(&location)? {
            Node::File(file) if file.is_symlink() => Ok((file.link_target()?, true)),
            _ => Ok((String::new(), false)),
        }
    }

    /// Resolve `symlink`, the target of the link at `starting_at`, to a path
    /// relative to the root.
    ///
    /// Rooted targets start over at the root and surplus `..` segments stay
    /// at the root. A missing final component is not an error: the path is
    /// returned as far as it got. A `starting_at` that climbs out of the
    /// root is a breakout; revisiting a link is a loop.
    pub fn resolve_link(&self, symlink: &str, starting_at: &str) -> FsResult<String> {
        let start = relative(starting_at);
        if start == ".." || start.starts_with("../") {
            return Err(FsError::Breakout);
        }
        let tree = self.read_tree();
        let mut seen = HashSet::new();
        let resolved = self.resolve_from(&tree, symlink, rel_segments(&start), &mut seen)?;
        if resolved.is_empty() {
            return Ok(".".to_string());
        }
        Ok(resolved.join(&SEPARATOR.to_string()))
    }

    fn resolve_from(
        &self,
        tree: &Tree,
        symlink: &str,
        starting_at: Vec<String>,
        seen: &mut HashSet<Vec<String>>,
    ) -> FsResult<Vec<String>> {
        if !seen.insert(starting_at.clone()) {
            tracing::trace!(link = ?starting_at, "symlink revisited");
            return Err(FsError::SymlinkLoop);
        }

        let mut segments: Vec<&str> = symlink.split(SEPARATOR).collect();
        let mut path = if segments.first() == Some(&"") {
            segments.remove(0);
            Vec::new()
        } else {
            let mut dir = starting_at.clone();
            dir.pop();
            dir
        };

        let last = segments.len().saturating_sub(1);
        for (idx, segment) in segments.into_iter().enumerate() {
            match segment {
                "" | "." => continue,
                ".." if path.is_empty() => continue,
                ".." => {
                    path.pop();
                }
                name => path.push(name.to_string()),
            }
            if path == starting_at {
                return Err(FsError::SymlinkLoop);
            }
            match Self::readlink_in(tree, &path, self.limit()) {
                Err(FsError::NotFound) if idx == last => return Ok(path),
                Err(e) => return Err(e),
                Ok((target, true)) => path = self.resolve_from(tree, &target, path, seen)?,
                Ok(_) => {}
            }
        }
        Ok(path)
    }
}
