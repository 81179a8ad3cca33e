// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! File nodes
//!
//! Symlinks, devices and fifos are ordinary files distinguished by their
//! mode: a symlink stores its UTF-8 target as content, a device stores the
//! 16-byte (major, minor) record, a fifo is empty.

use std::fmt;
use std::time::SystemTime;

use crate::content::{read_all, ContentStore, CopyOnWrite, HostContent, MemoryContent};
use crate::error::{FsError, FsResult};
use crate::overlay::HostStat;
use crate::types::{decode_device, encode_device, Attrs, FileType, Mode};

/// A file owned by exactly one directory
pub struct File {
    name: String,
    attrs: Attrs,
    content: Box<dyn ContentStore>,
}

impl File {
    /// Empty in-memory file.
    pub fn new(name: impl Into<String>, mode: Mode, uid: u32, gid: u32) -> Self {
        Self::with_content(
            name,
            Attrs::new(mode, uid, gid),
            Box::new(MemoryContent::new()),
        )
    }

    pub fn with_content(
        name: impl Into<String>,
        attrs: Attrs,
        content: Box<dyn ContentStore>,
    ) -> Self {
        Self {
            name: name.into(),
            attrs,
            content,
        }
    }

    pub fn symlink(name: impl Into<String>, target: &str, uid: u32, gid: u32) -> Self {
        Self::with_content(
            name,
            Attrs::new(Mode::new(0o777).with_type(FileType::Symlink), uid, gid),
            Box::new(MemoryContent::from_vec(target.as_bytes().to_vec())),
        )
    }

    pub fn fifo(name: impl Into<String>, perms: u32, uid: u32, gid: u32) -> Self {
        Self::new(name, Mode::new(perms).with_type(FileType::Fifo), uid, gid)
    }

    /// Block or character device node; `kind` must be a device type.
    pub fn device(
        name: impl Into<String>,
        kind: FileType,
        major: u64,
        minor: u64,
        perms: u32,
        uid: u32,
        gid: u32,
    ) -> FsResult<Self> {
        if !matches!(kind, FileType::BlockDevice | FileType::CharDevice) {
            return Err(FsError::InvalidArgument);
        }
        Ok(Self::with_content(
            name,
            Attrs::new(Mode::new(perms).with_type(kind), uid, gid),
            Box::new(MemoryContent::from_vec(encode_device(major, minor).to_vec())),
        ))
    }

    /// A regular host file, read in place until the first write copies it.
    pub(crate) fn from_host(name: &str, path: std::path::PathBuf, stat: &HostStat) -> Self {
        let host = HostContent::new(path, stat.size);
        Self::with_content(name, stat.attrs(), Box::new(CopyOnWrite::new(Box::new(host))))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn mode(&self) -> Mode {
        self.attrs.mode
    }

    pub fn file_type(&self) -> FileType {
        self.attrs.mode.file_type()
    }

    pub fn uid(&self) -> u32 {
        self.attrs.uid
    }

    pub fn gid(&self) -> u32 {
        self.attrs.gid
    }

    pub fn created(&self) -> SystemTime {
        self.attrs.created
    }

    pub fn modified(&self) -> SystemTime {
        self.attrs.modified
    }

    pub fn size(&self) -> u64 {
        self.content.size()
    }

    pub fn is_symlink(&self) -> bool {
        self.attrs.mode.is_symlink()
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.attrs.mode = mode;
    }

    pub fn set_owner(&mut self, uid: u32, gid: u32) {
        self.attrs.uid = uid;
        self.attrs.gid = gid;
    }

    pub fn set_modified(&mut self, modified: SystemTime) {
        self.attrs.modified = modified;
    }

    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.content.read_at(buf, offset)
    }

    pub fn write_at(&mut self, data: &[u8], offset: u64) -> FsResult<usize> {
        let n = self.content.write_at(data, offset)?;
        self.attrs.touch();
        Ok(n)
    }

    /// Resize the content. Zero swaps in a fresh buffer; any other size
    /// first copies stores that cannot truncate into memory.
    pub fn truncate(&mut self, size: u64) -> FsResult<()> {
        if size == 0 {
            self.content = Box::new(MemoryContent::new());
        } else {
            if !self.content.supports_truncate() {
                let copy = MemoryContent::copy_from(self.content.as_ref())?;
                self.content = Box::new(copy);
            }
            self.content.truncate(size)?;
        }
        self.attrs.touch();
        Ok(())
    }

    /// Snapshot of the full content.
    pub fn bytes(&self) -> FsResult<Vec<u8>> {
        read_all(self.content.as_ref())
    }

    pub fn link_target(&self) -> FsResult<String> {
        if !self.is_symlink() {
            return Err(FsError::InvalidArgument);
        }
        String::from_utf8(self.bytes()?).map_err(|_| FsError::InvalidArgument)
    }

    /// (major, minor) for device nodes.
    pub fn device_numbers(&self) -> FsResult<Option<(u64, u64)>> {
        if !self.attrs.mode.is_device() {
            return Ok(None);
        }
        Ok(decode_device(&self.bytes()?))
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("name", &self.name)
            .field("attrs", &self.attrs)
            .field("size", &self.size())
            .finish()
    }
}
