// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for lazyfs

use std::io;

/// Core filesystem error type
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("name not allowed")]
    InvalidName,
    #[error("access denied")]
    AccessDenied,
    #[error("too many levels of symbolic links")]
    SymlinkLoop,
    #[error("path escapes the filesystem root")]
    Breakout,
    #[error("unsupported")]
    Unsupported,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// The errno an adapter should surface for this error.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::InvalidArgument => libc::EINVAL,
            FsError::InvalidName => libc::EINVAL,
            FsError::AccessDenied => libc::EPERM,
            FsError::SymlinkLoop => libc::ELOOP,
            FsError::Breakout => libc::EXDEV,
            FsError::Unsupported => libc::ENOTSUP,
            FsError::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// True for the collision class: creation clashes, rename target clashes
    /// and removal of a non-empty directory.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, FsError::AlreadyExists | FsError::NotEmpty)
    }
}

pub type FsResult<T> = Result<T, FsError>;
