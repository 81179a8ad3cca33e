// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Content stores backing file data
//!
//! A file owns exactly one store. Three implementations exist:
//! - [`MemoryContent`]: a growable in-memory buffer
//! - [`HostContent`]: a host file reopened on every access
//! - [`CopyOnWrite`]: passes reads through to another store and copies it
//!   into a [`MemoryContent`] on the first write

use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{FsError, FsResult};

/// Byte-range storage for a single file
pub trait ContentStore: Send + Sync {
    fn size(&self) -> u64;

    /// Read into `buf` starting at `offset`. A short count means the end of
    /// the content was reached; offsets at or past the end read 0 bytes.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize>;

    fn write_at(&mut self, data: &[u8], offset: u64) -> FsResult<usize>;

    /// Whether [`ContentStore::truncate`] can be called on this store.
    fn supports_truncate(&self) -> bool {
        false
    }

    fn truncate(&mut self, _new_len: u64) -> FsResult<()> {
        Err(FsError::Unsupported)
    }
}

fn to_index(value: u64) -> FsResult<usize> {
    usize::try_from(value).map_err(|_| FsError::InvalidArgument)
}

/// Read the whole store into a fresh buffer.
pub fn read_all(store: &dyn ContentStore) -> FsResult<Vec<u8>> {
    let mut buf = vec![0u8; to_index(store.size())?];
    let mut filled = 0;
    while filled < buf.len() {
        let n = store.read_at(&mut buf[filled..], filled as u64)?;
        if n == 0 {
            // Store shrank underneath us
            buf.truncate(filled);
            break;
        }
        filled += n;
    }
    Ok(buf)
}

/// In-memory content buffer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryContent {
    bytes: Vec<u8>,
}

impl MemoryContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Copy another store into an independent, truncatable buffer.
    pub fn copy_from(store: &dyn ContentStore) -> FsResult<Self> {
        Ok(Self {
            bytes: read_all(store)?,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Zero-extend to `new_len`. A length the allocator refuses is an
    /// invalid argument.
    fn grow(&mut self, new_len: usize) -> FsResult<()> {
        let additional = new_len.saturating_sub(self.bytes.len());
        self.bytes
            .try_reserve_exact(additional)
            .map_err(|_| FsError::InvalidArgument)?;
        self.bytes.resize(new_len, 0);
        Ok(())
    }
}

impl ContentStore for MemoryContent {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let start = to_index(offset)?;
        if start >= self.bytes.len() {
            return Ok(0);
        }
        let end = std::cmp::min(start + buf.len(), self.bytes.len());
        let n = end - start;
        buf[..n].copy_from_slice(&self.bytes[start..end]);
        Ok(n)
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> FsResult<usize> {
        let start = to_index(offset)?;
        let end = start.checked_add(data.len()).ok_or(FsError::InvalidArgument)?;
        // Grows (zero-filling any gap) but never shrinks
        if end > self.bytes.len() {
            self.grow(end)?;
        }
        self.bytes[start..end].copy_from_slice(data);
        Ok(data.len())
    }

    fn supports_truncate(&self) -> bool {
        true
    }

    fn truncate(&mut self, new_len: u64) -> FsResult<()> {
        let new_len = to_index(new_len)?;
        if new_len > self.bytes.len() {
            self.grow(new_len)
        } else {
            self.bytes.truncate(new_len);
            Ok(())
        }
    }
}

/// Content living in a host file.
///
/// No handle is kept open: every read and write reopens the file, so the
/// only state is the path and the size recorded when the store was created
/// (grown by writes that extend the file).
#[derive(Clone, Debug)]
pub struct HostContent {
    path: PathBuf,
    size: u64,
}

impl HostContent {
    pub fn new(path: PathBuf, size: u64) -> Self {
        Self { path, size }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentStore for HostContent {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let mut file = std::fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> FsResult<usize> {
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;
        self.size = std::cmp::max(self.size, offset + data.len() as u64);
        Ok(data.len())
    }
}

/// Copy-on-write wrapper around another store.
///
/// Reads pass through. The first write copies the inner store into a
/// [`MemoryContent`], swaps it in, and applies the write to the copy; the
/// original store is never written.
pub struct CopyOnWrite {
    inner: Box<dyn ContentStore>,
    materialized: bool,
}

impl CopyOnWrite {
    pub fn new(inner: Box<dyn ContentStore>) -> Self {
        Self {
            inner,
            materialized: false,
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    fn materialize(&mut self) -> FsResult<()> {
        if self.materialized {
            return Ok(());
        }
        // A failed copy leaves the guard unset so a later write retries
        let copy = MemoryContent::copy_from(self.inner.as_ref())?;
        tracing::trace!(bytes = copy.size(), "copy-on-write store materialized");
        self.inner = Box::new(copy);
        self.materialized = true;
        Ok(())
    }
}

impl ContentStore for CopyOnWrite {
    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.inner.read_at(buf, offset)
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> FsResult<usize> {
        self.materialize()?;
        self.inner.write_at(data, offset)
    }

    fn supports_truncate(&self) -> bool {
        self.materialized && self.inner.supports_truncate()
    }

    fn truncate(&mut self, new_len: u64) -> FsResult<()> {
        if !self.materialized {
            return Err(FsError::Unsupported);
        }
        self.inner.truncate(new_len)
    }
}
