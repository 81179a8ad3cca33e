// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! lazyfs core: an in-memory filesystem tree with a lazy copy-on-write
//! overlay of a host directory.
//!
//! The tree is built from [`Tree`] directories that own [`File`]s and
//! subdirectories by name. Overlay directories read the host the first time
//! they are touched; overlay files read through to the host until their
//! first write, which copies them into memory. Nothing is ever written back.

pub mod config;
pub mod content;
pub mod error;
pub mod node;
pub mod overlay;
pub mod resolve;
pub mod testing;
pub mod tree;
pub mod types;

#[cfg(test)]
mod test_overlay;

pub use config::{FsConfig, OverlayConfig, ResolutionPolicy, SecurityPolicy};
pub use content::{ContentStore, CopyOnWrite, HostContent, MemoryContent};
pub use error::{FsError, FsResult};
pub use node::File;
pub use overlay::{HostEntry, HostKind, HostStat, HostStatProvider, StatProvider};
pub use resolve::{Location, Resolver};
pub use tree::{validate_name, Entry, Node, NodeMut, Tree};
pub use types::{Attrs, FileType, HandleId, Mode};

/// Separator of virtual paths, independent of the host platform.
pub const SEPARATOR: char = '/';

/// Split a virtual path into segments. Leading, trailing and repeated
/// separators produce empty segments, which resolution skips.
pub fn split_path(path: &str) -> Vec<String> {
    path.split(SEPARATOR).map(str::to_string).collect()
}

/// Join canonical segments into an absolute path.
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    if segments.is_empty() {
        return SEPARATOR.to_string();
    }
    segments.iter().fold(String::new(), |mut out, segment| {
        out.push(SEPARATOR);
        out.push_str(segment.as_ref());
        out
    })
}
