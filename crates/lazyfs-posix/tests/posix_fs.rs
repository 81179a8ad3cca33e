// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::io::SeekFrom;
use std::time::{Duration, SystemTime};

use lazyfs_core::{FsConfig, FsError, Tree};
use lazyfs_posix::{OpenFlags, PosixFs};
use tempfile::TempDir;

fn memory_fs() -> PosixFs {
    PosixFs::new(Tree::default(), FsConfig::default())
}

fn read_all(fs: &PosixFs, path: &str) -> Vec<u8> {
    let h = fs.open(path).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 4];
    loop {
        let n = fs.read(h, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    fs.close(h).unwrap();
    out
}

#[test]
fn overlay_edits_never_reach_the_host() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join("src")).unwrap();
    std::fs::write(tmp.path().join("src/main.txt"), b"original").unwrap();

    let fs = PosixFs::new(Tree::from_host(tmp.path()), FsConfig::default());
    assert_eq!(read_all(&fs, "/src/main.txt"), b"original");

    let h = fs.open_file("/src/main.txt", OpenFlags::default(), 0).unwrap();
    fs.write(h, b"ORIG").unwrap();
    fs.close(h).unwrap();
    fs.remove("/src/main.txt").unwrap();
    fs.create("/src/new.txt").unwrap();

    assert_eq!(std::fs::read(tmp.path().join("src/main.txt")).unwrap(), b"original");
    assert!(!tmp.path().join("src/new.txt").exists());
    assert!(matches!(fs.stat("/src/main.txt"), Err(FsError::NotFound)));
}

#[test]
fn stat_follows_and_lstat_does_not() {
    let fs = memory_fs();
    fs.mkdir_all("/data/real", 0o750).unwrap();
    fs.symlink("real", "/data/alias").unwrap();

    let followed = fs.stat("/data/alias").unwrap();
    assert!(followed.is_dir);
    assert_eq!(followed.name, "real");
    assert_eq!(followed.mode.perms(), 0o750);

    let link = fs.lstat("/data/alias").unwrap();
    assert!(!link.is_dir);
    assert!(link.is_symlink());
    assert_eq!(link.size, 4);
    assert_eq!(fs.readlink("/data/alias").unwrap(), "real");
}

#[test]
fn readlink_on_non_links_is_invalid() {
    let fs = memory_fs();
    fs.mkdir_all("d", 0o755).unwrap();
    fs.create("f").unwrap();
    assert!(matches!(fs.readlink("d"), Err(FsError::InvalidArgument)));
    assert!(matches!(fs.readlink("f"), Err(FsError::InvalidArgument)));
    assert!(matches!(fs.readlink("missing"), Err(FsError::NotFound)));
}

#[test]
fn mkdir_all_walks_through_symlinked_directories() {
    let fs = memory_fs();
    fs.mkdir_all("/a/b", 0o755).unwrap();
    fs.symlink("/a/b", "/short").unwrap();
    fs.mkdir_all("/short/c/d", 0o700).unwrap();

    let info = fs.stat("/a/b/c/d").unwrap();
    assert!(info.is_dir);
    assert_eq!(info.mode.perms(), 0o700);
    fs.mkdir_all("/a/b/c/d", 0o700).unwrap();

    fs.create("/a/file").unwrap();
    assert!(matches!(
        fs.mkdir_all("/a/file/x", 0o755),
        Err(FsError::NotADirectory)
    ));
}

#[test]
fn read_dir_is_sorted_and_typed() {
    let fs = memory_fs();
    fs.mkdir_all("/d/zeta", 0o755).unwrap();
    fs.create("/d/alpha").unwrap();
    fs.symlink("alpha", "/d/mid").unwrap();

    let listing = fs.read_dir("/d").unwrap();
    let names: Vec<_> = listing.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["alpha", "mid", "zeta"]);
    assert!(listing[1].is_symlink());
    assert!(listing[2].is_dir);
}

#[test]
fn remove_non_empty_directory_fails() {
    let fs = memory_fs();
    fs.mkdir_all("/d/inner", 0o755).unwrap();
    assert!(matches!(fs.remove("/d"), Err(FsError::NotEmpty)));
    fs.remove("/d/inner").unwrap();
    fs.remove("/d").unwrap();
    assert!(matches!(fs.stat("/d"), Err(FsError::NotFound)));
}

#[test]
fn rename_rejects_existing_targets() {
    let fs = memory_fs();
    fs.mkdir_all("/x", 0o755).unwrap();
    fs.create("/y").unwrap();
    assert!(matches!(fs.rename("/x", "/y"), Err(FsError::AlreadyExists)));
    assert!(matches!(fs.rename("/x", "/x"), Err(FsError::AlreadyExists)));
    fs.rename("/y", "/x/y").unwrap();
    assert!(fs.stat("/x/y").is_ok());
}

#[test]
fn chmod_keeps_type_and_chtimes_sets_mtime() {
    let fs = memory_fs();
    fs.mkdir_all("/d", 0o755).unwrap();
    fs.create("/d/f").unwrap();

    fs.chmod("/d", 0o1777).unwrap();
    let dir = fs.stat("/d").unwrap();
    assert!(dir.is_dir);
    assert!(dir.mode.is_sticky());

    fs.chmod("/d/f", 0o4755).unwrap();
    let file = fs.stat("/d/f").unwrap();
    assert!(!file.is_dir);
    assert!(file.mode.is_setuid());

    let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
    fs.chtimes("/d/f", when, when).unwrap();
    assert_eq!(fs.stat("/d/f").unwrap().modified, when);
}

#[test]
fn chroot_confines_paths() {
    let fs = memory_fs();
    fs.mkdir_all("/jail/inside", 0o755).unwrap();
    fs.create("/outside").unwrap();

    let jail = fs.chroot("/jail").unwrap();
    assert_eq!(jail.root(), "/");
    assert_eq!(jail.base_path(), "/jail");
    assert!(jail.stat("/inside").unwrap().is_dir);
    assert!(matches!(jail.stat("/../outside"), Err(FsError::NotFound)));

    let h = jail.create("/inside/note").unwrap();
    jail.write(h, b"shared").unwrap();
    assert_eq!(read_all(&fs, "/jail/inside/note"), b"shared");
}

#[test]
fn truncate_and_seek_through_handles() {
    let fs = memory_fs();
    let h = fs.create("/f").unwrap();
    fs.write(h, b"0123456789").unwrap();

    fs.truncate(h, 4).unwrap();
    assert_eq!(fs.size(h).unwrap(), 4);
    fs.truncate(h, 6).unwrap();
    let mut buf = [0xffu8; 6];
    assert_eq!(fs.read_at(h, &mut buf, 0).unwrap(), 6);
    assert_eq!(&buf, b"0123\0\0");

    assert_eq!(fs.seek(h, SeekFrom::End(1)).unwrap(), 5);
    fs.write(h, b"Z").unwrap();
    assert_eq!(read_all(&fs, "/f"), b"0123\0Z");

    assert!(matches!(fs.seek(h, SeekFrom::Current(-100)), Err(FsError::InvalidArgument)));
    fs.lock(h).unwrap();
    fs.unlock(h).unwrap();
}
