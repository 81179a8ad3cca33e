// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for lazyfs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;
pub const S_ISUID: u32 = 0o4000;
pub const S_ISGID: u32 = 0o2000;
pub const S_ISVTX: u32 = 0o1000;

/// Permission bits plus setuid/setgid/sticky.
pub const PERM_MASK: u32 = 0o7777;

/// Size of the encoded (major, minor) pair stored in device nodes.
pub const DEVICE_RECORD_LEN: usize = 16;

/// Node type carried in the `S_IFMT` field of a [`Mode`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
}

impl FileType {
    pub fn type_bits(self) -> u32 {
        match self {
            FileType::Regular => S_IFREG,
            FileType::Directory => S_IFDIR,
            FileType::Symlink => S_IFLNK,
            FileType::BlockDevice => S_IFBLK,
            FileType::CharDevice => S_IFCHR,
            FileType::Fifo => S_IFIFO,
        }
    }
}

/// POSIX-style mode word: file type field, special bits and permissions.
///
/// A mode without any type bits is treated as a regular file, so plain
/// permission values such as `0o644` are valid file modes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mode(u32);

impl Mode {
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub fn file(perms: u32) -> Self {
        Self(S_IFREG | (perms & PERM_MASK))
    }

    pub fn dir(perms: u32) -> Self {
        Self(S_IFDIR | (perms & PERM_MASK))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn file_type(self) -> FileType {
        match self.0 & S_IFMT {
            S_IFDIR => FileType::Directory,
            S_IFLNK => FileType::Symlink,
            S_IFBLK => FileType::BlockDevice,
            S_IFCHR => FileType::CharDevice,
            S_IFIFO => FileType::Fifo,
            _ => FileType::Regular,
        }
    }

    /// Replace the type field, keeping permission and special bits.
    pub fn with_type(self, kind: FileType) -> Self {
        Self((self.0 & !S_IFMT) | kind.type_bits())
    }

    /// Permission bits plus setuid/setgid/sticky.
    pub fn perms(self) -> u32 {
        self.0 & PERM_MASK
    }

    /// Replace permission and special bits, keeping the type field.
    pub fn with_perms(self, perms: u32) -> Self {
        Self((self.0 & !PERM_MASK) | (perms & PERM_MASK))
    }

    pub fn is_dir(self) -> bool {
        self.file_type() == FileType::Directory
    }

    pub fn is_symlink(self) -> bool {
        self.file_type() == FileType::Symlink
    }

    pub fn is_device(self) -> bool {
        matches!(self.file_type(), FileType::BlockDevice | FileType::CharDevice)
    }

    pub fn is_setuid(self) -> bool {
        self.0 & S_ISUID != 0
    }

    pub fn is_setgid(self) -> bool {
        self.0 & S_ISGID != 0
    }

    pub fn is_sticky(self) -> bool {
        self.0 & S_ISVTX != 0
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mode({:06o})", self.0)
    }
}

impl fmt::Octal for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Octal::fmt(&self.0, f)
    }
}

impl From<u32> for Mode {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

/// Ownership, mode and timestamps shared by files and directories
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attrs {
    pub mode: Mode,
    pub uid: u32,
    pub gid: u32,
    pub created: SystemTime,
    pub modified: SystemTime,
}

impl Attrs {
    /// Attributes stamped with the current instant.
    pub fn new(mode: Mode, uid: u32, gid: u32) -> Self {
        let now = SystemTime::now();
        Self {
            mode,
            uid,
            gid,
            created: now,
            modified: now,
        }
    }

    pub fn touch(&mut self) {
        self.modified = SystemTime::now();
    }
}

impl Default for Attrs {
    /// What an overlay directory reports when its host path cannot be read.
    fn default() -> Self {
        Self {
            mode: Mode::dir(0o755),
            uid: 0,
            gid: 0,
            created: SystemTime::UNIX_EPOCH,
            modified: SystemTime::UNIX_EPOCH,
        }
    }
}

/// Encode a device number pair the way device nodes store it.
pub fn encode_device(major: u64, minor: u64) -> [u8; DEVICE_RECORD_LEN] {
    let mut buf = [0u8; DEVICE_RECORD_LEN];
    buf[0..8].copy_from_slice(&major.to_le_bytes());
    buf[8..16].copy_from_slice(&minor.to_le_bytes());
    buf
}

/// Decode a device record; `None` when the record is too short.
pub fn decode_device(bytes: &[u8]) -> Option<(u64, u64)> {
    let major = bytes.get(0..8)?.try_into().ok().map(u64::from_le_bytes)?;
    let minor = bytes.get(8..16)?.try_into().ok().map(u64::from_le_bytes)?;
    Some((major, minor))
}

/// Opaque handle identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

impl HandleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}
