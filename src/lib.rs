// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Crate root for the attestation pseudo-filesystem.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Attestation pseudo-filesystem.
//!
//! Exposes an `attestation/` directory with five pseudo-files through which an application running
//! inside a trusted execution environment feeds the platform attestation primitives and collects
//! their artifacts:
//!
//! | File               | Access     | Contents                                         |
//! |--------------------|------------|--------------------------------------------------|
//! | `user_report_data` | read+write | data folded into reports and quotes              |
//! | `target_info`      | read+write | peer the next report is addressed to             |
//! | `my_target_info`   | read-only  | this instance's own target info                  |
//! | `report`           | read-only  | local report over the two inputs above           |
//! | `quote`            | read-only  | remotely verifiable quote over user report data  |
//!
//! The directory is not meant for concurrent use. Inputs are committed when a writable file is
//! closed and sampled when a result file is opened.

use std::sync::Arc;

use thiserror::Error;

pub mod attestation;
pub mod handle;
pub mod platform;
pub mod pseudo;
pub mod sizes;
pub mod state;

pub use attestation::{attestation_dir, AttestationFile, ATTESTATION_DIR_NAME};
pub use handle::{Access, OpenFlags, PollEvents, StrHandle};
pub use platform::sim::{SimConfig, SimConfigError, SimulatedPlatform};
pub use platform::{is_supported, Platform, PlatformError, ReportRequest, SUPPORTED_HOST_TYPE};
pub use pseudo::{Dirent, NodeType, PseudoDir, PseudoEntry, PseudoFs, PseudoNode, PseudoOps, Stat};
pub use sizes::{
    AttestationSizes, SizesError, QUOTE_MAX_SIZE, TARGET_INFO_MAX_SIZE, USER_REPORT_DATA_MAX_SIZE,
};
pub use state::{AttestationState, TestStateGuard};

/// Errors surfaced at the pseudo-file boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FsError {
    /// The operation is not permitted. Covers platform unavailability, write access to a
    /// read-only file and every platform primitive failure.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// A buffer allocation failed.
    #[error("out of memory")]
    OutOfMemory,
    /// No entry exists at the requested path.
    #[error("path /{0} not found")]
    NotFound(String),
    /// A path component that must be a directory is a file.
    #[error("path /{0} is not a directory")]
    NotDirectory(String),
    /// A directory was opened for writing.
    #[error("path /{0} is a directory")]
    IsDirectory(String),
    /// A seek would move the cursor outside the buffer.
    #[error("invalid seek offset {0}")]
    InvalidSeek(i64),
}

impl FsError {
    pub(crate) fn access(reason: impl Into<String>) -> Self {
        Self::AccessDenied(reason.into())
    }

    /// Linux errno equivalent of the error.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            FsError::AccessDenied(_) => 13,
            FsError::OutOfMemory => 12,
            FsError::NotFound(_) => 2,
            FsError::NotDirectory(_) => 20,
            FsError::IsDirectory(_) => 21,
            FsError::InvalidSeek(_) => 22,
        }
    }
}

/// Build a pseudo-filesystem whose root holds the `attestation/` directory backed by `platform`.
#[must_use]
pub fn mount(platform: Arc<dyn Platform>) -> PseudoFs {
    PseudoFs::new(PseudoDir::new(vec![PseudoEntry::directory(
        ATTESTATION_DIR_NAME,
        attestation_dir(platform),
    )]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_matches_linux() {
        assert_eq!(FsError::access("x").errno(), 13);
        assert_eq!(FsError::OutOfMemory.errno(), 12);
        assert_eq!(FsError::NotFound("x".into()).errno(), 2);
        assert_eq!(FsError::NotDirectory("x".into()).errno(), 20);
        assert_eq!(FsError::IsDirectory("x".into()).errno(), 21);
        assert_eq!(FsError::InvalidSeek(-1).errno(), 22);
    }

    #[test]
    fn errors_render_reason() {
        let err = FsError::access("platform is not Linux-SGX");
        assert_eq!(err.to_string(), "access denied: platform is not Linux-SGX");
        assert_eq!(
            FsError::NotFound("attestation/nope".into()).to_string(),
            "path /attestation/nope not found"
        );
    }
}
