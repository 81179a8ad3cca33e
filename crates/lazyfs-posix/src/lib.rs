// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! POSIX-style interface over a lazyfs tree
//!
//! [`PosixFs`] addresses everything by slash-separated path, relative to
//! its root (the whole tree, or a subtree after [`PosixFs::chroot`]).
//! Open files are [`HandleId`]s carrying their own cursor.
//!
//! The tree sits behind a reader-writer lock shared by every chroot of the
//! same filesystem. The handle table lock is always taken before the tree
//! lock.

mod handle;
pub mod path;

use std::io::SeekFrom;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use lazyfs_core::{
    join_path, split_path, File, FsConfig, FsError, FsResult, HandleId, Location, Mode, Node,
    NodeMut, Resolver, Tree,
};

use crate::handle::{Handle, HandleTable};
pub use crate::path::{clean, join};

/// Summary of one file or directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mode: Mode,
    pub modified: SystemTime,
    pub is_dir: bool,
    pub uid: u32,
    pub gid: u32,
}

impl FileInfo {
    fn from_node(name: &str, node: Node<'_>) -> Self {
        let attrs = node.attrs();
        let size = match node {
            Node::File(file) => file.size(),
            Node::Dir(_) => 0,
        };
        Self {
            name: name.to_string(),
            size,
            mode: attrs.mode,
            modified: attrs.modified,
            is_dir: node.is_dir(),
            uid: attrs.uid,
            gid: attrs.gid,
        }
    }

    pub fn is_symlink(&self) -> bool {
        self.mode.is_symlink()
    }
}

/// Flags accepted by [`PosixFs::open_file`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Create the file if it does not exist
    pub create: bool,
    /// With `create`, fail if the file exists
    pub exclusive: bool,
    /// Drop existing content on open
    pub truncate: bool,
    /// Every write lands at the current end of the file
    pub append: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self::default()
    }

    /// Create or empty. Unlike [`PosixFs::create`], an existing file is
    /// opened and truncated.
    pub fn create_truncate() -> Self {
        Self {
            create: true,
            truncate: true,
            ..Self::default()
        }
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn prefixed(base: &[String], rest: Vec<String>) -> Vec<String> {
    let mut full = base.to_vec();
    full.extend(rest);
    full
}

/// A filesystem view rooted at one directory of a shared tree
pub struct PosixFs {
    tree: Arc<RwLock<Tree>>,
    /// Canonical path of this view's root inside the tree
    base: Vec<String>,
    config: FsConfig,
    handles: Mutex<HandleTable>,
}

impl PosixFs {
    pub fn new(tree: Tree, config: FsConfig) -> Self {
        Self::shared(Arc::new(RwLock::new(tree)), config)
    }

    pub fn shared(tree: Arc<RwLock<Tree>>, config: FsConfig) -> Self {
        Self {
            tree,
            base: Vec::new(),
            config,
            handles: Mutex::new(HandleTable::default()),
        }
    }

    pub fn tree(&self) -> Arc<RwLock<Tree>> {
        Arc::clone(&self.tree)
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    fn handles(&self) -> MutexGuard<'_, HandleTable> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolver<'t>(&self, root: &'t Tree) -> Resolver<'t> {
        Resolver::new(root, self.config.resolution.max_symlink_expansions)
    }

    /// Canonical directory (relative to this view) named by `segments`.
    fn walk(&self, tree: &Tree, segments: &[String]) -> FsResult<Vec<String>> {
        let root = tree.descend(&self.base)?;
        self.resolver(root).walk_dir(segments)
    }

    fn locate(&self, tree: &Tree, path: &str, follow: bool) -> FsResult<Location> {
        let root = tree.descend(&self.base)?;
        self.resolver(root).locate(&split_path(path), follow)
    }

    fn info_at(&self, tree: &Tree, path: &str, follow: bool) -> FsResult<FileInfo> {
        let location = self.locate(tree, path, follow)?;
        let node = tree.descend(&self.base)?.node_at(&location)?;
        let name = match location.split_parent() {
            Some((_, name)) => name,
            None => self.base.last().cloned().unwrap_or_else(|| self.root()),
        };
        Ok(FileInfo::from_node(&name, node))
    }

    /// Resolve `path` and apply `f` to the node it names.
    fn update_node<R>(
        &self,
        path: &str,
        follow: bool,
        f: impl FnOnce(NodeMut<'_>) -> R,
    ) -> FsResult<R> {
        let mut tree = write_lock(&self.tree);
        let location = self.locate(&tree, path, follow)?;
        let node = tree.descend_mut(&self.base)?.node_at_mut(&location)?;
        Ok(f(node))
    }

    fn open_handle(&self, parent: Vec<String>, name: String, path: &str, append: bool) -> HandleId {
        let handle = Handle::new(prefixed(&self.base, parent), name, path.to_string(), append);
        self.handles().insert(handle)
    }

    /// Create an empty file. Fails if anything already has that name.
    pub fn create(&self, path: &str) -> FsResult<HandleId> {
        let (dir, name) = path::parent_and_name(path)?;
        let parent = {
            let mut tree = write_lock(&self.tree);
            let parent = self.walk(&tree, &dir)?;
            let (uid, gid) = (self.config.security.euid, self.config.security.egid);
            tree.descend_mut(&self.base)?
                .descend_mut(&parent)?
                .create_file(&name, uid, gid, Mode::file(0o666))?;
            parent
        };
        tracing::debug!(path, "file created");
        Ok(self.open_handle(parent, name, path, false))
    }

    pub fn open(&self, path: &str) -> FsResult<HandleId> {
        self.open_file(path, OpenFlags::read_only(), 0o666)
    }

    /// Open `path`, following symlinks. `perm` only applies to a file this
    /// call creates.
    pub fn open_file(&self, path: &str, flags: OpenFlags, perm: u32) -> FsResult<HandleId> {
        let (dir, name) = path::parent_and_name(path)?;
        let mut tree = write_lock(&self.tree);
        let parent = self.walk(&tree, &dir)?;
        let existing = tree.descend(&self.base)?.descend(&parent)?.lookup(&name).map(|n| n.is_dir());

        let (parent, name) = match existing {
            Some(true) => return Err(FsError::IsADirectory),
            Some(false) if flags.create && flags.exclusive => return Err(FsError::AlreadyExists),
            Some(false) => match self.locate(&tree, path, true)? {
                Location::File { parent, name } => (parent, name),
                Location::Dir(_) => return Err(FsError::IsADirectory),
            },
            None if flags.create => {
                let (uid, gid) = (self.config.security.euid, self.config.security.egid);
                tree.descend_mut(&self.base)?
                    .descend_mut(&parent)?
                    .create_file(&name, uid, gid, Mode::file(perm))?;
                tracing::debug!(path, "file created");
                (parent, name)
            }
            None => return Err(FsError::NotFound),
        };

        if flags.truncate {
            let file = tree
                .descend_mut(&self.base)?
                .descend_mut(&parent)?
                .file_mut(&name)
                .ok_or(FsError::NotFound)?;
            file.truncate(0)?;
        }
        drop(tree);
        Ok(self.open_handle(parent, name, path, flags.append))
    }

    /// Create a uniquely named empty file in `dir`. Returns the handle and
    /// the new file's path.
    pub fn temp_file(&self, dir: &str, prefix: &str) -> FsResult<(HandleId, String)> {
        let name = format!("{prefix}{}", uuid::Uuid::new_v4().simple());
        let path = join(&[dir, name.as_str()]);
        let handle = self.create(&path)?;
        Ok((handle, path))
    }

    pub fn stat(&self, path: &str) -> FsResult<FileInfo> {
        self.info_at(&read_lock(&self.tree), path, true)
    }

    pub fn lstat(&self, path: &str) -> FsResult<FileInfo> {
        self.info_at(&read_lock(&self.tree), path, false)
    }

    /// Move a file or directory. The target name must be free.
    pub fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let (from_dir, from_name) = path::parent_and_name(from)?;
        let (to_dir, to_name) = path::parent_and_name(to)?;
        let mut tree = write_lock(&self.tree);
        let from_parent = prefixed(&self.base, self.walk(&tree, &from_dir)?);
        let to_parent = prefixed(&self.base, self.walk(&tree, &to_dir)?);
        tree.rename(&from_parent, &from_name, &to_parent, &to_name)?;
        tracing::debug!(from, to, "renamed");
        Ok(())
    }

    /// Unlink a file, symlink or empty directory.
    pub fn remove(&self, path: &str) -> FsResult<()> {
        let (dir, name) = path::parent_and_name(path)?;
        let mut tree = write_lock(&self.tree);
        let parent = self.walk(&tree, &dir)?;
        tree.descend_mut(&self.base)?.descend_mut(&parent)?.remove(&name)?;
        tracing::debug!(path, "removed");
        Ok(())
    }

    /// Create `path` and any missing parents. Existing directories, and
    /// symlinks to directories, are walked through.
    pub fn mkdir_all(&self, path: &str, perm: u32) -> FsResult<()> {
        let segments = split_path(path);
        let (uid, gid) = (self.config.security.euid, self.config.security.egid);
        let mut tree = write_lock(&self.tree);
        let mut parent: Vec<String> = Vec::new();

        for (idx, segment) in segments.iter().enumerate() {
            match self.walk(&tree, &segments[..=idx]) {
                Ok(resolved) => parent = resolved,
                Err(FsError::NotFound) => {
                    let dir = tree.descend_mut(&self.base)?.descend_mut(&parent)?;
                    dir.create_dir(segment, uid, gid, Mode::dir(perm))?;
                    parent.push(segment.clone());
                    tracing::debug!(path, created = %segment, "directory created");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Directory listing sorted by name.
    pub fn read_dir(&self, path: &str) -> FsResult<Vec<FileInfo>> {
        let tree = read_lock(&self.tree);
        let dir = self.walk(&tree, &split_path(path))?;
        let dir = tree.descend(&self.base)?.descend(&dir)?;
        Ok(dir
            .entries()
            .into_iter()
            .map(|(name, node)| FileInfo::from_node(name, node))
            .collect())
    }

    /// Create `link` pointing at `target`. The target is stored verbatim.
    pub fn symlink(&self, target: &str, link: &str) -> FsResult<()> {
        let (dir, name) = path::parent_and_name(link)?;
        let mut tree = write_lock(&self.tree);
        let parent = self.walk(&tree, &dir)?;
        let (uid, gid) = (self.config.security.euid, self.config.security.egid);
        tree.descend_mut(&self.base)?
            .descend_mut(&parent)?
            .insert_file(File::symlink(name, target, uid, gid))?;
        tracing::debug!(link, target, "symlink created");
        Ok(())
    }

    /// Target of a symlink. Anything else is `InvalidArgument`.
    pub fn readlink(&self, path: &str) -> FsResult<String> {
        let tree = read_lock(&self.tree);
        let location = self.locate(&tree, path, false)?;
        match tree.descend(&self.base)?.node_at(&location)? {
            Node::File(file) if file.is_symlink() => file.link_target(),
            _ => Err(FsError::InvalidArgument),
        }
    }

    /// Replace permission and special bits, following symlinks.
    pub fn chmod(&self, path: &str, perms: u32) -> FsResult<()> {
        self.update_node(path, true, |node| match node {
            NodeMut::File(file) => file.set_mode(file.mode().with_perms(perms)),
            NodeMut::Dir(dir) => dir.set_mode(dir.mode().with_perms(perms)),
        })
    }

    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        self.change_owner(path, uid, gid, true)
    }

    pub fn lchown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        self.change_owner(path, uid, gid, false)
    }

    fn change_owner(&self, path: &str, uid: u32, gid: u32, follow: bool) -> FsResult<()> {
        if !self.config.security.may_chown() {
            return Err(FsError::AccessDenied);
        }
        self.update_node(path, follow, |node| match node {
            NodeMut::File(file) => file.set_owner(uid, gid),
            NodeMut::Dir(dir) => dir.set_owner(uid, gid),
        })
    }

    /// Set the modification time. Access times are not tracked.
    pub fn chtimes(&self, path: &str, _atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        self.update_node(path, true, |node| match node {
            NodeMut::File(file) => file.set_modified(mtime),
            NodeMut::Dir(dir) => dir.set_modified(mtime),
        })
    }

    /// A view rooted at the directory `path`, sharing this tree. Open
    /// handles stay with the view that opened them.
    pub fn chroot(&self, path: &str) -> FsResult<PosixFs> {
        let tree = read_lock(&self.tree);
        let dir = self.walk(&tree, &split_path(path))?;
        Ok(PosixFs {
            tree: Arc::clone(&self.tree),
            base: prefixed(&self.base, dir),
            config: self.config.clone(),
            handles: Mutex::new(HandleTable::default()),
        })
    }

    pub fn root(&self) -> String {
        join_path::<&str>(&[])
    }

    /// Absolute path of this view's root inside the shared tree.
    pub fn base_path(&self) -> String {
        join_path(&self.base)
    }

    pub fn open_handles(&self) -> usize {
        self.handles().len()
    }

    /// Path `handle` was opened under.
    pub fn handle_path(&self, handle: HandleId) -> FsResult<String> {
        Ok(self.handles().get(handle)?.path.clone())
    }

    fn with_file<R>(&self, handle: &Handle, f: impl FnOnce(&File) -> FsResult<R>) -> FsResult<R> {
        let tree = read_lock(&self.tree);
        let file = tree
            .descend(&handle.parent)?
            .file(&handle.name)
            .ok_or(FsError::NotFound)?;
        f(file)
    }

    fn with_file_mut<R>(
        &self,
        handle: &Handle,
        f: impl FnOnce(&mut File) -> FsResult<R>,
    ) -> FsResult<R> {
        let mut tree = write_lock(&self.tree);
        let file = tree
            .descend_mut(&handle.parent)?
            .file_mut(&handle.name)
            .ok_or(FsError::NotFound)?;
        f(file)
    }

    /// Read at the cursor and advance it. Returns 0 at end of file.
    pub fn read(&self, handle: HandleId, buf: &mut [u8]) -> FsResult<usize> {
        let mut handles = self.handles();
        let h = handles.get_mut(handle)?;
        let n = self.with_file(h, |file| file.read_at(buf, h.position))?;
        h.position += n as u64;
        Ok(n)
    }

    /// Read at `offset` without moving the cursor.
    pub fn read_at(&self, handle: HandleId, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let handles = self.handles();
        let h = handles.get(handle)?;
        self.with_file(h, |file| file.read_at(buf, offset))
    }

    /// Write at the cursor (or the end, for append handles) and advance it.
    pub fn write(&self, handle: HandleId, data: &[u8]) -> FsResult<usize> {
        let mut handles = self.handles();
        let h = handles.get_mut(handle)?;
        let append = h.append;
        let position = h.position;
        let (n, end) = self.with_file_mut(h, |file| {
            let at = if append { file.size() } else { position };
            let n = file.write_at(data, at)?;
            Ok((n, at + n as u64))
        })?;
        h.position = end;
        Ok(n)
    }

    pub fn seek(&self, handle: HandleId, pos: SeekFrom) -> FsResult<u64> {
        let mut handles = self.handles();
        let h = handles.get_mut(handle)?;
        let size = self.with_file(h, |file| Ok(file.size()))?;
        h.seek(pos, size)
    }

    pub fn truncate(&self, handle: HandleId, size: u64) -> FsResult<()> {
        let handles = self.handles();
        let h = handles.get(handle)?;
        self.with_file_mut(h, |file| file.truncate(size))
    }

    pub fn size(&self, handle: HandleId) -> FsResult<u64> {
        let handles = self.handles();
        let h = handles.get(handle)?;
        self.with_file(h, |file| Ok(file.size()))
    }

    pub fn close(&self, handle: HandleId) -> FsResult<()> {
        self.handles().remove(handle).map(|_| ())
    }

    /// Advisory locks are accepted and ignored.
    pub fn lock(&self, handle: HandleId) -> FsResult<()> {
        self.handles().get(handle).map(|_| ())
    }

    pub fn unlock(&self, handle: HandleId) -> FsResult<()> {
        self.handles().get(handle).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazyfs_core::SecurityPolicy;

    fn fs() -> PosixFs {
        PosixFs::new(Tree::default(), FsConfig::default())
    }

    #[test]
    fn test_create_write_seek_read() {
        let fs = fs();
        let h = fs.create("/notes.txt").unwrap();
        assert_eq!(fs.write(h, b"hello world").unwrap(), 11);

        assert_eq!(fs.seek(h, SeekFrom::Start(6)).unwrap(), 6);
        let mut buf = [0u8; 16];
        let n = fs.read(h, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"world");
        assert_eq!(fs.read(h, &mut buf).unwrap(), 0);

        assert_eq!(fs.seek(h, SeekFrom::End(5)).unwrap(), 6);
        fs.close(h).unwrap();
        assert!(matches!(fs.close(h), Err(FsError::InvalidArgument)));
    }

    #[test]
    fn test_create_collides_with_files_and_dirs() {
        let fs = fs();
        fs.create("a").unwrap();
        fs.mkdir_all("d", 0o755).unwrap();
        assert!(matches!(fs.create("a"), Err(FsError::AlreadyExists)));
        assert!(matches!(fs.create("d"), Err(FsError::AlreadyExists)));
        assert!(matches!(fs.create("missing/x"), Err(FsError::NotFound)));
    }

    #[test]
    fn test_open_flags() {
        let fs = fs();
        assert!(matches!(fs.open("nope"), Err(FsError::NotFound)));

        let flags = OpenFlags { create: true, ..OpenFlags::default() };
        let h = fs.open_file("f", flags, 0o600).unwrap();
        fs.write(h, b"abc").unwrap();
        assert_eq!(fs.stat("f").unwrap().mode.perms(), 0o600);

        let exclusive = OpenFlags { exclusive: true, ..flags };
        assert!(matches!(fs.open_file("f", exclusive, 0o600), Err(FsError::AlreadyExists)));

        let append = OpenFlags { append: true, ..OpenFlags::default() };
        let h = fs.open_file("f", append, 0).unwrap();
        fs.write(h, b"def").unwrap();
        assert_eq!(fs.size(h).unwrap(), 6);

        let h = fs.open_file("f", OpenFlags::create_truncate(), 0).unwrap();
        assert_eq!(fs.size(h).unwrap(), 0);

        fs.mkdir_all("dir", 0o755).unwrap();
        assert!(matches!(fs.open("dir"), Err(FsError::IsADirectory)));
    }

    #[test]
    fn test_chown_requires_privileged_identity() {
        let config = FsConfig {
            security: SecurityPolicy { euid: 1000, egid: 1000 },
            ..FsConfig::default()
        };
        let fs = PosixFs::new(Tree::default(), config);
        fs.create("f").unwrap();
        assert!(matches!(fs.chown("f", 0, 0), Err(FsError::AccessDenied)));
        assert_eq!(fs.stat("f").unwrap().uid, 1000);

        let root = fs_with_group_zero();
        root.create("f").unwrap();
        root.chown("f", 5, 6).unwrap();
        let info = root.stat("f").unwrap();
        assert_eq!((info.uid, info.gid), (5, 6));
    }

    fn fs_with_group_zero() -> PosixFs {
        let config = FsConfig {
            security: SecurityPolicy { euid: 1000, egid: 0 },
            ..FsConfig::default()
        };
        PosixFs::new(Tree::default(), config)
    }

    #[test]
    fn test_handle_survives_only_while_file_exists() {
        let fs = fs();
        let h = fs.create("f").unwrap();
        fs.rename("f", "g").unwrap();
        assert!(matches!(fs.size(h), Err(FsError::NotFound)));
        assert_eq!(fs.handle_path(h).unwrap(), "f");
    }

    #[test]
    fn test_temp_file_names_are_unique() {
        let fs = fs();
        fs.mkdir_all("/tmp", 0o777).unwrap();
        let (_, a) = fs.temp_file("/tmp", "pack-").unwrap();
        let (_, b) = fs.temp_file("/tmp", "pack-").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("/tmp/pack-"));
        assert_eq!(fs.read_dir("/tmp").unwrap().len(), 2);
    }
}
