// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Host overlay: stat provider and lazy directory loader

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::content::MemoryContent;
use crate::error::FsResult;
use crate::node::File;
use crate::tree::{Tree, TreeState};
use crate::types::{encode_device, Attrs, FileType, Mode, PERM_MASK};

/// Kind of a host filesystem object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostKind {
    Directory,
    File,
    Symlink,
    Fifo,
    BlockDevice { major: u64, minor: u64 },
    CharDevice { major: u64, minor: u64 },
    /// Sockets and anything else the tree cannot represent
    Other,
}

impl HostKind {
    pub fn file_type(self) -> Option<FileType> {
        match self {
            HostKind::Directory => Some(FileType::Directory),
            HostKind::File => Some(FileType::Regular),
            HostKind::Symlink => Some(FileType::Symlink),
            HostKind::Fifo => Some(FileType::Fifo),
            HostKind::BlockDevice { .. } => Some(FileType::BlockDevice),
            HostKind::CharDevice { .. } => Some(FileType::CharDevice),
            HostKind::Other => None,
        }
    }
}

/// Metadata of one host path as reported by a [`StatProvider`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostStat {
    pub kind: HostKind,
    /// Permission plus setuid/setgid/sticky bits
    pub perms: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub created: SystemTime,
    pub modified: SystemTime,
}

impl HostStat {
    pub fn attrs(&self) -> Attrs {
        let kind = self.kind.file_type().unwrap_or(FileType::Regular);
        Attrs {
            mode: Mode::new(self.perms & PERM_MASK).with_type(kind),
            uid: self.uid,
            gid: self.gid,
            created: self.created,
            modified: self.modified,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostEntry {
    pub name: String,
    /// Stat of the entry itself, symlinks not followed
    pub stat: HostStat,
}

/// Source of host metadata for overlay directories
#[cfg_attr(test, mockall::automock)]
pub trait StatProvider: Send + Sync {
    /// Stat a host path, following symlinks.
    fn stat(&self, path: &Path) -> FsResult<HostStat>;

    /// List a host directory. Entries that cannot be inspected are left out.
    fn read_dir(&self, path: &Path) -> FsResult<Vec<HostEntry>>;

    fn read_link(&self, path: &Path) -> FsResult<PathBuf>;
}

/// [`StatProvider`] backed by `std::fs`
#[derive(Clone, Copy, Debug, Default)]
pub struct HostStatProvider;

impl HostStatProvider {
    pub fn shared() -> Arc<dyn StatProvider> {
        Arc::new(Self)
    }

    fn convert(meta: &std::fs::Metadata) -> HostStat {
        let (perms, uid, gid, created) = platform::extract_metadata(meta);
        HostStat {
            kind: platform::kind_of(meta),
            perms,
            size: meta.len(),
            uid,
            gid,
            created,
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }
}

impl StatProvider for HostStatProvider {
    fn stat(&self, path: &Path) -> FsResult<HostStat> {
        let meta = std::fs::metadata(path)?;
        Ok(Self::convert(&meta))
    }

    fn read_dir(&self, path: &Path) -> FsResult<Vec<HostEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::debug!(dir = %path.display(), name = ?raw, "skipping non-UTF-8 host entry");
                    continue;
                }
            };
            match std::fs::symlink_metadata(entry.path()) {
                Ok(meta) => entries.push(HostEntry {
                    name,
                    stat: Self::convert(&meta),
                }),
                Err(e) => {
                    tracing::debug!(dir = %path.display(), %name, error = %e, "skipping unreadable host entry");
                }
            }
        }
        Ok(entries)
    }

    fn read_link(&self, path: &Path) -> FsResult<PathBuf> {
        Ok(std::fs::read_link(path)?)
    }
}

#[cfg(unix)]
mod platform {
    use std::os::unix::fs::{FileTypeExt, MetadataExt};
    use std::time::{Duration, SystemTime};

    use super::HostKind;
    use crate::types::PERM_MASK;

    /// (perms, uid, gid, creation time). Falls back to the inode change time
    /// where the platform has no birth time.
    pub(super) fn extract_metadata(meta: &std::fs::Metadata) -> (u32, u32, u32, SystemTime) {
        let created = meta.created().unwrap_or_else(|_| {
            let secs = u64::try_from(meta.ctime()).unwrap_or(0);
            let nanos = u32::try_from(meta.ctime_nsec()).unwrap_or(0);
            SystemTime::UNIX_EPOCH + Duration::new(secs, nanos)
        });
        (meta.mode() & PERM_MASK, meta.uid(), meta.gid(), created)
    }

    pub(super) fn kind_of(meta: &std::fs::Metadata) -> HostKind {
        let ft = meta.file_type();
        if ft.is_dir() {
            HostKind::Directory
        } else if ft.is_symlink() {
            HostKind::Symlink
        } else if ft.is_file() {
            HostKind::File
        } else if ft.is_fifo() {
            HostKind::Fifo
        } else if ft.is_block_device() {
            let (major, minor) = split_rdev(meta.rdev());
            HostKind::BlockDevice { major, minor }
        } else if ft.is_char_device() {
            let (major, minor) = split_rdev(meta.rdev());
            HostKind::CharDevice { major, minor }
        } else {
            HostKind::Other
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub(super) fn split_rdev(dev: u64) -> (u64, u64) {
        let major = ((dev >> 32) & 0xffff_f000) | ((dev >> 8) & 0x0000_0fff);
        let minor = ((dev >> 12) & 0xffff_ff00) | (dev & 0x0000_00ff);
        (major, minor)
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub(super) fn split_rdev(dev: u64) -> (u64, u64) {
        ((dev >> 24) & 0xff, dev & 0x00ff_ffff)
    }
}

#[cfg(not(unix))]
mod platform {
    use std::time::SystemTime;

    use super::HostKind;

    pub(super) fn extract_metadata(meta: &std::fs::Metadata) -> (u32, u32, u32, SystemTime) {
        let created = meta.created().unwrap_or(SystemTime::UNIX_EPOCH);
        let perms = match (meta.is_dir(), meta.permissions().readonly()) {
            (true, _) => 0o755,
            (false, true) => 0o444,
            (false, false) => 0o644,
        };
        (perms, 0, 0, created)
    }

    pub(super) fn kind_of(meta: &std::fs::Metadata) -> HostKind {
        let ft = meta.file_type();
        if ft.is_dir() {
            HostKind::Directory
        } else if ft.is_symlink() {
            HostKind::Symlink
        } else if ft.is_file() {
            HostKind::File
        } else {
            HostKind::Other
        }
    }
}

/// Populate one overlay directory from `path`.
///
/// Host failures never surface: a failed stat yields an empty directory
/// carrying `fallback`, a failed listing keeps the stat result with no
/// children. Subdirectories are left unloaded.
pub(crate) fn load_dir(path: &Path, provider: &Arc<dyn StatProvider>, fallback: &Attrs) -> TreeState {
    let attrs = match provider.stat(path) {
        Ok(stat) => {
            let mut attrs = stat.attrs();
            attrs.mode = attrs.mode.with_type(FileType::Directory);
            attrs
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "host stat failed, overlay directory left empty");
            return TreeState::new(fallback.clone());
        }
    };

    let mut state = TreeState::new(attrs);
    let entries = match provider.read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "host listing failed, overlay directory left empty");
            return state;
        }
    };

    for entry in entries {
        let child_path = path.join(&entry.name);
        match entry.stat.kind {
            HostKind::Directory => {
                let child = Tree::from_host_with(child_path, Arc::clone(provider), state.attrs.clone());
                state.dirs.insert(entry.name, child);
            }
            HostKind::File => {
                let file = File::from_host(&entry.name, child_path, &entry.stat);
                state.files.insert(entry.name, file);
            }
            HostKind::Symlink => match provider.read_link(&child_path) {
                Ok(target) => match target.to_str() {
                    Some(target) => {
                        let content = MemoryContent::from_vec(target.as_bytes().to_vec());
                        let file = File::with_content(&entry.name, entry.stat.attrs(), Box::new(content));
                        state.files.insert(entry.name, file);
                    }
                    None => {
                        tracing::debug!(path = %child_path.display(), "skipping symlink with non-UTF-8 target");
                    }
                },
                Err(e) => {
                    tracing::debug!(path = %child_path.display(), error = %e, "skipping unreadable symlink");
                }
            },
            HostKind::Fifo => {
                let file = File::with_content(&entry.name, entry.stat.attrs(), Box::new(MemoryContent::new()));
                state.files.insert(entry.name, file);
            }
            HostKind::BlockDevice { major, minor } | HostKind::CharDevice { major, minor } => {
                let content = MemoryContent::from_vec(encode_device(major, minor).to_vec());
                let file = File::with_content(&entry.name, entry.stat.attrs(), Box::new(content));
                state.files.insert(entry.name, file);
            }
            HostKind::Other => {
                tracing::debug!(path = %child_path.display(), "skipping unsupported host entry");
            }
        }
    }

    tracing::debug!(
        path = %path.display(),
        files = state.files.len(),
        dirs = state.dirs.len(),
        "overlay directory populated"
    );
    state
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::platform::split_rdev;

    #[test]
    fn rdev_split_matches_glibc_layout() {
        // makedev(8, 1) and makedev(259, 65536)
        assert_eq!(split_rdev(0x0801), (8, 1));
        let dev = ((259u64 & 0xfff) << 8) | ((65536u64 & 0xff) | ((65536u64 & !0xff) << 12));
        assert_eq!(split_rdev(dev), (259, 65536));
    }
}
