// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Translation between archive permission numbers and [`Mode`]
//!
//! Archive headers carry `0o7777`-style numbers: rwx bits plus setuid
//! (`0o4000`), setgid (`0o2000`) and sticky (`0o1000`). Anything above
//! those bits is dropped.

use lazyfs_core::types::{S_ISGID, S_ISUID, S_ISVTX};
use lazyfs_core::Mode;

const RWX: u32 = 0o777;
const ARCHIVE_SETUID: u32 = 0o4000;
const ARCHIVE_SETGID: u32 = 0o2000;
const ARCHIVE_STICKY: u32 = 0o1000;

/// Mode carrying only the permission and special bits of `perms`; the type
/// field is left empty for the caller to set.
pub fn perms_to_mode(perms: u32) -> Mode {
    let mut bits = perms & RWX;
    if perms & ARCHIVE_SETUID != 0 {
        bits |= S_ISUID;
    }
    if perms & ARCHIVE_SETGID != 0 {
        bits |= S_ISGID;
    }
    if perms & ARCHIVE_STICKY != 0 {
        bits |= S_ISVTX;
    }
    Mode::new(bits)
}

pub fn mode_to_perms(mode: Mode) -> u32 {
    let mut perms = mode.bits() & RWX;
    if mode.is_setuid() {
        perms |= ARCHIVE_SETUID;
    }
    if mode.is_setgid() {
        perms |= ARCHIVE_SETGID;
    }
    if mode.is_sticky() {
        perms |= ARCHIVE_STICKY;
    }
    perms
}
