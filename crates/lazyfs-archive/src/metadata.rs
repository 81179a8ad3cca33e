// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::time::SystemTime;

use lazyfs_core::{FileType, FsResult, Node};
use serde::{Deserialize, Serialize};

use crate::perms::mode_to_perms;

/// Entry type as recorded in archive headers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    File,
    Dir,
    Symlink,
    /// Block device
    Device,
    CharDevice,
    NamedPipe,
}

impl From<FileType> for EntryType {
    fn from(kind: FileType) -> Self {
        match kind {
            FileType::Regular => EntryType::File,
            FileType::Directory => EntryType::Dir,
            FileType::Symlink => EntryType::Symlink,
            FileType::BlockDevice => EntryType::Device,
            FileType::CharDevice => EntryType::CharDevice,
            FileType::Fifo => EntryType::NamedPipe,
        }
    }
}

/// Archive-style description of one node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryType,
    pub perms: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub mtime: SystemTime,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub linkname: String,
    #[serde(default)]
    pub devmajor: u64,
    #[serde(default)]
    pub devminor: u64,
}

impl Metadata {
    pub(crate) fn from_node(name: String, node: Node<'_>) -> FsResult<Self> {
        let attrs = node.attrs();
        let mut md = Metadata {
            name,
            kind: EntryType::from(attrs.mode.file_type()),
            perms: mode_to_perms(attrs.mode),
            uid: attrs.uid,
            gid: attrs.gid,
            size: 0,
            mtime: attrs.modified,
            linkname: String::new(),
            devmajor: 0,
            devminor: 0,
        };
        if let Node::File(file) = node {
            md.size = file.size();
            if file.is_symlink() {
                md.linkname = file.link_target()?;
            }
            if let Some((major, minor)) = file.device_numbers()? {
                md.devmajor = major;
                md.devminor = minor;
            }
        }
        Ok(md)
    }
}
