// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test-only utilities and mock implementations for lazyfs
//!
//! This module provides decorators around content stores to simulate host
//! failures without needing a misbehaving disk.

#[cfg(test)]
pub mod mock_content;
