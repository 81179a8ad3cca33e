// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Tests for lazy overlay loading
//!
//! Host directories come from `tempfile`; host side effects are counted
//! through a mocked [`StatProvider`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::SystemTime;

use mockall::predicate::eq;
use tempfile::TempDir;

use crate::overlay::{HostEntry, HostKind, HostStat, MockStatProvider, StatProvider};
use crate::types::{Attrs, FileType, Mode};
use crate::{split_path, FsError, Node, Tree};

fn dir_stat() -> HostStat {
    HostStat {
        kind: HostKind::Directory,
        perms: 0o750,
        size: 0,
        uid: 1000,
        gid: 100,
        created: SystemTime::UNIX_EPOCH,
        modified: SystemTime::UNIX_EPOCH,
    }
}

fn entry(name: &str, kind: HostKind) -> HostEntry {
    HostEntry {
        name: name.to_string(),
        stat: HostStat {
            kind,
            perms: 0o644,
            size: 0,
            ..dir_stat()
        },
    }
}

fn populate(root: &Path) {
    std::fs::create_dir_all(root.join("a/c")).unwrap();
    std::fs::create_dir_all(root.join("a/sibling")).unwrap();
    std::fs::write(root.join("a/c/data.txt"), b"host bytes").unwrap();
    std::fs::write(root.join("a/sibling/leaf.txt"), b"leaf").unwrap();
    std::fs::write(root.join("top.txt"), b"top").unwrap();
}

#[test]
fn test_overlay_is_lazy_until_touched() {
    let tmp = TempDir::new().unwrap();
    populate(tmp.path());

    let root = Tree::from_host(tmp.path());
    assert!(!root.is_initialized());

    let a = root.dir("a").unwrap();
    assert!(root.is_initialized());
    assert!(!a.is_initialized());
    assert!(a.dir("c").is_some());
    assert!(a.is_initialized());
    assert!(!a.dir("c").unwrap().is_initialized());
}

#[test]
fn test_first_touch_can_be_a_mutation() {
    let tmp = TempDir::new().unwrap();
    populate(tmp.path());

    let mut root = Tree::from_host(tmp.path());
    root.create_file("new.txt", 0, 0, Mode::file(0o644)).unwrap();
    assert!(root.is_initialized());
    assert_eq!(root.names(), ["a", "new.txt", "top.txt"]);
    assert!(matches!(
        root.create_file("top.txt", 0, 0, Mode::file(0o644)),
        Err(FsError::AlreadyExists)
    ));
}

#[test]
fn test_overlay_reads_host_content() {
    let tmp = TempDir::new().unwrap();
    populate(tmp.path());
    let root = Tree::from_host(tmp.path());

    match root.get(&split_path("/a/c/data.txt"), true).unwrap() {
        Node::File(file) => {
            assert_eq!(file.size(), 10);
            assert_eq!(file.bytes().unwrap(), b"host bytes");
            assert_eq!(file.file_type(), FileType::Regular);
        }
        Node::Dir(_) => panic!("expected a file"),
    }
    assert_eq!(root.names(), vec!["a", "top.txt"]);
}

#[test]
fn test_overlay_writes_stay_in_memory() {
    let tmp = TempDir::new().unwrap();
    populate(tmp.path());
    let mut root = Tree::from_host(tmp.path());

    let file = root
        .walk_dir_mut(&["a", "c"])
        .unwrap()
        .file_mut("data.txt")
        .unwrap();
    file.write_at(b"HOST", 0).unwrap();
    assert_eq!(file.bytes().unwrap(), b"HOST bytes");

    std::fs::write(tmp.path().join("a/c/data.txt"), b"rewritten on host").unwrap();
    let file = root.walk_dir(&["a", "c"]).unwrap().file("data.txt").unwrap();
    assert_eq!(file.bytes().unwrap(), b"HOST bytes");
    assert_eq!(
        std::fs::read(tmp.path().join("a/c/data.txt")).unwrap(),
        b"rewritten on host"
    );
}

#[test]
fn test_overlay_truncate_materializes_first() {
    let tmp = TempDir::new().unwrap();
    populate(tmp.path());
    let mut root = Tree::from_host(tmp.path());

    let file = root.file_mut("top.txt").unwrap();
    file.truncate(5).unwrap();
    assert_eq!(file.bytes().unwrap(), b"top\0\0");
    assert_eq!(std::fs::read(tmp.path().join("top.txt")).unwrap(), b"top");
}

#[test]
fn test_missing_host_path_is_empty_directory() {
    let tmp = TempDir::new().unwrap();
    let root = Tree::from_host(tmp.path().join("does-not-exist"));

    assert!(root.is_empty());
    assert!(root.mode().is_dir());
    assert_eq!(root.attrs(), &Attrs::default());
}

#[cfg(unix)]
#[test]
fn test_host_symlinks_become_link_files() {
    let tmp = TempDir::new().unwrap();
    populate(tmp.path());
    std::os::unix::fs::symlink("../sibling", tmp.path().join("a/c/to_sibling")).unwrap();

    let root = Tree::from_host(tmp.path());
    let link = root.walk_dir(&["a", "c"]).unwrap().file("to_sibling").unwrap();
    assert!(link.is_symlink());
    assert_eq!(link.link_target().unwrap(), "../sibling");

    let loc = root.locate(&split_path("a/c/to_sibling/leaf.txt"), true).unwrap();
    assert_eq!(loc.to_path_string(), "/a/sibling/leaf.txt");
}

#[test]
fn test_stat_failure_uses_fallback() {
    let mut provider = MockStatProvider::new();
    provider
        .expect_stat()
        .returning(|_| Err(FsError::Io(std::io::Error::from_raw_os_error(libc::EACCES))));
    provider.expect_read_dir().never();

    let fallback = Attrs {
        mode: Mode::dir(0o700),
        uid: 7,
        gid: 8,
        created: SystemTime::UNIX_EPOCH,
        modified: SystemTime::UNIX_EPOCH,
    };
    let root = Tree::from_host_with("/host", Arc::new(provider), fallback.clone());
    assert!(root.is_empty());
    assert_eq!(root.attrs(), &fallback);
}

#[test]
fn test_listing_failure_keeps_metadata() {
    let mut provider = MockStatProvider::new();
    provider.expect_stat().returning(|_| Ok(dir_stat()));
    provider
        .expect_read_dir()
        .times(1)
        .returning(|_| Err(FsError::Io(std::io::Error::from_raw_os_error(libc::EACCES))));

    let root = Tree::from_host_with("/host", Arc::new(provider), Attrs::default());
    assert!(root.is_empty());
    assert_eq!(root.uid(), 1000);
    assert_eq!(root.mode().perms(), 0o750);
    assert!(root.mode().is_dir());
}

#[test]
fn test_special_host_entries() {
    let mut provider = MockStatProvider::new();
    provider.expect_stat().returning(|_| Ok(dir_stat()));
    provider.expect_read_dir().with(eq(PathBuf::from("/host"))).returning(|_| {
        Ok(vec![
            entry("pipe", HostKind::Fifo),
            entry("sda", HostKind::BlockDevice { major: 8, minor: 0 }),
            entry("tty", HostKind::CharDevice { major: 4, minor: 1 }),
            entry("sock", HostKind::Other),
            entry("broken", HostKind::Symlink),
        ])
    });
    provider
        .expect_read_link()
        .returning(|_| Err(FsError::NotFound));

    let root = Tree::from_host_with("/host", Arc::new(provider), Attrs::default());
    assert_eq!(root.names(), vec!["pipe", "sda", "tty"]);
    assert_eq!(root.file("pipe").unwrap().file_type(), FileType::Fifo);
    assert_eq!(root.file("sda").unwrap().device_numbers().unwrap(), Some((8, 0)));
    assert_eq!(root.file("tty").unwrap().file_type(), FileType::CharDevice);
}

#[test]
fn test_subdirectory_inherits_fallback_from_parent() {
    let mut provider = MockStatProvider::new();
    provider
        .expect_stat()
        .with(eq(PathBuf::from("/host")))
        .returning(|_| Ok(dir_stat()));
    provider
        .expect_stat()
        .with(eq(PathBuf::from("/host/gone")))
        .returning(|_| Err(FsError::NotFound));
    provider
        .expect_read_dir()
        .with(eq(PathBuf::from("/host")))
        .returning(|_| Ok(vec![entry("gone", HostKind::Directory)]));

    let root = Tree::from_host_with("/host", Arc::new(provider), Attrs::default());
    let gone = root.dir("gone").unwrap();
    assert!(gone.is_empty());
    assert_eq!(gone.uid(), 1000);
    assert_eq!(gone.mode().perms(), 0o750);
}

#[test]
fn test_concurrent_first_walk_lists_host_once() {
    let mut provider = MockStatProvider::new();
    provider.expect_stat().returning(|_| Ok(dir_stat()));
    provider
        .expect_read_dir()
        .with(eq(PathBuf::from("/host")))
        .times(1)
        .returning(|_| Ok(vec![entry("sub", HostKind::Directory)]));
    provider
        .expect_read_dir()
        .with(eq(PathBuf::from("/host/sub")))
        .times(1)
        .returning(|_| {
            Ok((0..32)
                .map(|i| entry(&format!("f{i:02}"), HostKind::Fifo))
                .collect())
        });

    let provider: Arc<dyn StatProvider> = Arc::new(provider);
    let root = Tree::from_host_with("/host", provider, Attrs::default());

    thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| root.walk_dir(&["sub"]).unwrap().names().len()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 32);
        }
    });
}
