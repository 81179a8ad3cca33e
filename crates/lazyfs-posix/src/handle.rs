// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Open file handles
//!
//! A handle names its file by canonical location, so it sees every write
//! made through any other handle. Removing or renaming the file leaves the
//! handle pointing at nothing and its operations fail with `NotFound`.

use std::collections::HashMap;
use std::io::SeekFrom;

use lazyfs_core::{FsError, FsResult, HandleId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Handle {
    /// Absolute canonical directory of the file
    pub(crate) parent: Vec<String>,
    pub(crate) name: String,
    /// Path the handle was opened under, relative to the filesystem root
    pub(crate) path: String,
    pub(crate) position: u64,
    pub(crate) append: bool,
}

impl Handle {
    pub(crate) fn new(parent: Vec<String>, name: String, path: String, append: bool) -> Self {
        Self {
            parent,
            name,
            path,
            position: 0,
            append,
        }
    }

    /// Apply a seek against content of `size` bytes.
    ///
    /// `SeekFrom::End(n)` lands `n` bytes before the end. A target before
    /// the start is rejected and leaves the position untouched.
    pub(crate) fn seek(&mut self, pos: SeekFrom, size: u64) -> FsResult<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(back) => checked_sub_signed(size, back),
        };
        let target = target.ok_or(FsError::InvalidArgument)?;
        self.position = target;
        Ok(target)
    }
}

fn checked_sub_signed(base: u64, delta: i64) -> Option<u64> {
    if delta >= 0 {
        base.checked_sub(delta.unsigned_abs())
    } else {
        base.checked_add(delta.unsigned_abs())
    }
}

#[derive(Debug, Default)]
pub(crate) struct HandleTable {
    handles: HashMap<HandleId, Handle>,
    next_id: u64,
}

impl HandleTable {
    pub(crate) fn insert(&mut self, handle: Handle) -> HandleId {
        self.next_id += 1;
        let id = HandleId::new(self.next_id);
        self.handles.insert(id, handle);
        id
    }

    pub(crate) fn get(&self, id: HandleId) -> FsResult<&Handle> {
        self.handles.get(&id).ok_or(FsError::InvalidArgument)
    }

    pub(crate) fn get_mut(&mut self, id: HandleId) -> FsResult<&mut Handle> {
        self.handles.get_mut(&id).ok_or(FsError::InvalidArgument)
    }

    pub(crate) fn remove(&mut self, id: HandleId) -> FsResult<Handle> {
        self.handles.remove(&id).ok_or(FsError::InvalidArgument)
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }
}
