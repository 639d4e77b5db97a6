// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error type that carries the process exit code.
//!
//! Commands return `ExitError` instead of calling `std::process::exit()`,
//! so `main()` owns process termination and the tracing guard is flushed.

use std::fmt;

/// A job finished but not `successful`.
pub const EXIT_UNSUCCESSFUL: i32 = 1;
/// A job could not be started at all.
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}
