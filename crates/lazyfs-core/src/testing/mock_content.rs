// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fault-injecting content store for testing error propagation
//!
//! `MockContent` delegates to an inner [`ContentStore`] and can be configured
//! to fail selected operations according to a [`FailureBehavior`] policy.
//! Call counts are shared through [`CallCounts`] so they stay observable
//! after the store has been moved into a file or a copy-on-write wrapper.

use crate::content::ContentStore;
use crate::error::FsResult;
use crate::FsError;
use libc::EIO;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

/// Custom predicate function type for fault injection
pub type FaultPredicate = Arc<dyn Fn(&str, u64) -> Option<FsError> + Send + Sync>;

/// Configurable failure behavior for mock content operations
#[derive(Default)]
pub enum FailureBehavior {
    /// Never fail - all operations succeed
    #[default]
    AlwaysSucceed,

    /// Fail after N successful calls to a specific operation
    FailAfter {
        op: &'static str,
        count: u64,
        error_fn: Arc<dyn Fn() -> FsError + Send + Sync>,
    },

    /// Fail for the first N calls to a specific operation
    FailFor {
        op: &'static str,
        count: u64,
        error_fn: Arc<dyn Fn() -> FsError + Send + Sync>,
    },

    /// Custom predicate receiving (operation_name, call_count)
    Custom(FaultPredicate),
}

/// Per-operation call counters
#[derive(Default, Debug)]
pub struct CallCounts {
    counts: Mutex<HashMap<String, u64>>,
}

impl CallCounts {
    pub fn get(&self, op: &str) -> u64 {
        self.counts.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Record a call and return how many calls preceded it.
    fn bump(&self, op: &str) -> u64 {
        let mut counts = self.counts.lock().unwrap();
        let counter = counts.entry(op.to_string()).or_insert(0);
        let previous = *counter;
        *counter += 1;
        previous
    }
}

/// Content store decorator that injects configurable failures
pub struct MockContent {
    inner: Box<dyn ContentStore>,
    behavior: Mutex<FailureBehavior>,
    calls: Arc<CallCounts>,
}

impl MockContent {
    /// Wrap a store without injecting any failures
    pub fn new(inner: Box<dyn ContentStore>) -> Self {
        Self::with_behavior(inner, FailureBehavior::AlwaysSucceed)
    }

    pub fn with_behavior(inner: Box<dyn ContentStore>, behavior: FailureBehavior) -> Self {
        Self {
            inner,
            behavior: Mutex::new(behavior),
            calls: Arc::new(CallCounts::default()),
        }
    }

    pub fn set_behavior(&self, behavior: FailureBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn counters(&self) -> Arc<CallCounts> {
        Arc::clone(&self.calls)
    }

    fn check_fault(&self, op: &str) -> FsResult<()> {
        let current = self.calls.bump(op);
        let behavior = self.behavior.lock().unwrap();
        let failure = match &*behavior {
            FailureBehavior::AlwaysSucceed => None,
            FailureBehavior::FailAfter {
                op: target,
                count,
                error_fn,
            } => (op == *target && current >= *count).then(|| error_fn()),
            FailureBehavior::FailFor {
                op: target,
                count,
                error_fn,
            } => (op == *target && current < *count).then(|| error_fn()),
            FailureBehavior::Custom(predicate) => predicate(op, current),
        };
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl ContentStore for MockContent {
    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.check_fault("read_at")?;
        self.inner.read_at(buf, offset)
    }

    fn write_at(&mut self, data: &[u8], offset: u64) -> FsResult<usize> {
        self.check_fault("write_at")?;
        self.inner.write_at(data, offset)
    }

    fn supports_truncate(&self) -> bool {
        self.inner.supports_truncate()
    }

    fn truncate(&mut self, new_len: u64) -> FsResult<()> {
        self.check_fault("truncate")?;
        self.inner.truncate(new_len)
    }
}

/// Helper function to create a simple EIO error for testing
pub fn eio_error() -> FsError {
    FsError::Io(io::Error::from_raw_os_error(EIO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryContent;

    fn memory(bytes: &[u8]) -> Box<dyn ContentStore> {
        Box::new(MemoryContent::from_vec(bytes.to_vec()))
    }

    #[test]
    fn mock_content_always_succeed() {
        let mut mock = MockContent::new(memory(b"test"));
        let mut buf = [0u8; 4];
        assert_eq!(mock.read_at(&mut buf, 0).unwrap(), 4);
        assert_eq!(mock.write_at(b"T", 0).unwrap(), 1);
        assert_eq!(mock.counters().get("read_at"), 1);
        assert_eq!(mock.counters().get("write_at"), 1);
    }

    #[test]
    fn mock_content_fail_after_count() {
        let mut mock = MockContent::with_behavior(
            memory(b"test"),
            FailureBehavior::FailAfter {
                op: "write_at",
                count: 2,
                error_fn: Arc::new(eio_error),
            },
        );

        assert!(mock.write_at(b"a", 0).is_ok());
        assert!(mock.write_at(b"b", 1).is_ok());
        assert!(matches!(mock.write_at(b"c", 2), Err(FsError::Io(_))));
        assert_eq!(mock.counters().get("write_at"), 3);
    }

    #[test]
    fn mock_content_custom_predicate_and_runtime_change() {
        let mock = MockContent::with_behavior(
            memory(b"test data"),
            FailureBehavior::Custom(Arc::new(|op: &str, count: u64| {
                (op == "read_at" && count % 2 == 1).then(eio_error)
            })),
        );
        let mut buf = [0u8; 4];
        assert!(mock.read_at(&mut buf, 0).is_ok());
        assert!(mock.read_at(&mut buf, 0).is_err());
        assert!(mock.read_at(&mut buf, 0).is_ok());

        mock.set_behavior(FailureBehavior::AlwaysSucceed);
        assert!(mock.read_at(&mut buf, 0).is_ok());
        assert_eq!(mock.counters().get("read_at"), 4);
    }
}
