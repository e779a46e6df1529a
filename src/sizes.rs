// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Platform-fixed attestation buffer sizes and their hard limits.
// Author: Lukas Bower

//! Attestation buffer sizes.

use thiserror::Error;

/// Upper bound on user report data accepted from the platform (SGX uses 64 bytes).
pub const USER_REPORT_DATA_MAX_SIZE: usize = 256;

/// Upper bound on target info accepted from the platform (SGX uses 512 bytes).
pub const TARGET_INFO_MAX_SIZE: usize = 1024;

/// Capacity of the scratch buffer handed to the quote primitive.
pub const QUOTE_MAX_SIZE: usize = 2048;

/// Invalid size triple reported by a platform probe.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SizesError {
    /// A size was reported as zero.
    #[error("platform reported zero {0} size")]
    Zero(&'static str),
    /// A size exceeds the hard maximum.
    #[error("platform reported {name} size {size} above maximum {max}")]
    TooLarge {
        /// Name of the buffer.
        name: &'static str,
        /// Size reported by the platform.
        size: usize,
        /// Hard maximum.
        max: usize,
    },
}

/// Buffer sizes the platform expects for its attestation primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttestationSizes {
    user_report_data_size: usize,
    target_info_size: usize,
    report_size: usize,
}

impl AttestationSizes {
    /// Validate and construct a size triple.
    pub fn new(
        user_report_data_size: usize,
        target_info_size: usize,
        report_size: usize,
    ) -> Result<Self, SizesError> {
        check("user_report_data", user_report_data_size, USER_REPORT_DATA_MAX_SIZE)?;
        check("target_info", target_info_size, TARGET_INFO_MAX_SIZE)?;
        check("report", report_size, usize::MAX)?;
        Ok(Self {
            user_report_data_size,
            target_info_size,
            report_size,
        })
    }

    /// Size of the user report data blob.
    #[must_use]
    pub fn user_report_data_size(&self) -> usize {
        self.user_report_data_size
    }

    /// Size of a target info blob.
    #[must_use]
    pub fn target_info_size(&self) -> usize {
        self.target_info_size
    }

    /// Size of a local report.
    #[must_use]
    pub fn report_size(&self) -> usize {
        self.report_size
    }
}

fn check(name: &'static str, size: usize, max: usize) -> Result<(), SizesError> {
    if size == 0 {
        return Err(SizesError::Zero(name));
    }
    if size > max {
        return Err(SizesError::TooLarge { name, size, max });
    }
    Ok(())
}
