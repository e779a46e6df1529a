// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Typed binding for the platform attestation primitives and identity probe.
// Author: Lukas Bower

//! Platform attestation primitives.
//!
//! The attestation pseudo-files never talk to hardware directly. They go through a [`Platform`]
//! implementation which exposes the local report primitive, the quote primitive and the host type
//! string used to gate the whole directory.

use thiserror::Error;

use crate::sizes::AttestationSizes;

pub mod sim;

/// Host type reported by the only TEE family the attestation directory supports.
pub const SUPPORTED_HOST_TYPE: &str = "Linux-SGX";

/// Errors surfaced by platform attestation primitives.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// A caller-supplied buffer does not match the size the platform expects.
    #[error("{buffer} buffer holds {provided} bytes, platform expects {expected}")]
    SizeMismatch {
        /// Name of the offending buffer.
        buffer: &'static str,
        /// Length supplied by the caller.
        provided: usize,
        /// Length required by the platform.
        expected: usize,
    },
    /// The output buffer is too small for the produced artifact.
    #[error("{buffer} buffer too small: need {required} bytes, have {available}")]
    BufferTooSmall {
        /// Name of the offending buffer.
        buffer: &'static str,
        /// Bytes required by the platform.
        required: usize,
        /// Bytes available in the caller buffer.
        available: usize,
    },
    /// The platform refused or failed the request.
    #[error("platform request failed: {0}")]
    Failed(String),
}

/// Request modes accepted by [`Platform::attestation_report`].
#[derive(Debug)]
pub enum ReportRequest<'a> {
    /// Query the buffer sizes the platform expects without producing anything.
    Sizes,
    /// Ask the platform for this instance's own target info. Both buffers are zeroed on entry and
    /// are filled in place.
    SelfTarget {
        /// Scratch user report data, receives the user data of the self-addressed report.
        user_report_data: &'a mut [u8],
        /// Scratch target info, receives this instance's identifier.
        target_info: &'a mut [u8],
    },
    /// Produce a local report over `user_report_data` addressed to `target_info`.
    Report {
        /// Application supplied data folded into the report.
        user_report_data: &'a [u8],
        /// Identifier of the peer the report is addressed to.
        target_info: &'a [u8],
        /// Output buffer receiving the report.
        report: &'a mut [u8],
    },
}

impl ReportRequest<'_> {
    /// Short name of the request mode, used in logs.
    #[must_use]
    pub fn mode(&self) -> &'static str {
        match self {
            ReportRequest::Sizes => "sizes",
            ReportRequest::SelfTarget { .. } => "self-target",
            ReportRequest::Report { .. } => "report",
        }
    }
}

/// Attestation primitives provided by the host platform.
pub trait Platform: Send + Sync {
    /// Short identity string of the running host.
    fn host_type(&self) -> &str;

    /// Run the local report primitive in the requested mode. Every mode returns the buffer sizes
    /// the platform expects.
    fn attestation_report(
        &self,
        request: ReportRequest<'_>,
    ) -> Result<AttestationSizes, PlatformError>;

    /// Produce a remotely verifiable quote over `user_report_data` into `quote`, returning the
    /// number of bytes written.
    fn attestation_quote(
        &self,
        user_report_data: &[u8],
        quote: &mut [u8],
    ) -> Result<usize, PlatformError>;
}

/// Check whether the platform identifies as the supported TEE family.
pub fn is_supported(platform: &dyn Platform) -> bool {
    platform.host_type() == SUPPORTED_HOST_TYPE
}
