// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: The attestation/ pseudo-directory and its five file nodes.
// Author: Lukas Bower

//! `attestation/` pseudo-files.
//!
//! To obtain a report, write and close `user_report_data`, write and close `target_info`, then
//! open and read `report`. To obtain a quote, write and close `user_report_data`, then open and
//! read `quote`. Result files sample the committed inputs at open time; opening one before its
//! inputs are written yields an artifact over zeroes.
//!
//! None of these files is safe for concurrent use by several writers. The application is
//! expected to serialise its attestation flow.

use std::sync::Arc;

use log::{debug, error, warn};

use crate::handle::{Access, CommitHook, OpenFlags, StrHandle};
use crate::platform::{is_supported, Platform, PlatformError, ReportRequest, SUPPORTED_HOST_TYPE};
use crate::pseudo::{PseudoDir, PseudoEntry, PseudoOps, FILE_RW_MODE, FILE_R_MODE, S_IFREG};
use crate::sizes::QUOTE_MAX_SIZE;
use crate::state::{alloc_zeroed, AttestationState};
use crate::FsError;

/// Name of the attestation directory inside its parent.
pub const ATTESTATION_DIR_NAME: &str = "attestation";

/// The five pseudo-files of the attestation directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttestationFile {
    /// Application data folded into reports and quotes.
    UserReportData,
    /// Peer the next report is addressed to.
    TargetInfo,
    /// This instance's own target info.
    MyTargetInfo,
    /// Local report over the committed inputs.
    Report,
    /// Remote quote over the committed user report data.
    Quote,
}

impl AttestationFile {
    /// Every file, in directory order.
    pub const ALL: [AttestationFile; 5] = [
        AttestationFile::UserReportData,
        AttestationFile::TargetInfo,
        AttestationFile::MyTargetInfo,
        AttestationFile::Report,
        AttestationFile::Quote,
    ];

    /// Directory entry name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            AttestationFile::UserReportData => "user_report_data",
            AttestationFile::TargetInfo => "target_info",
            AttestationFile::MyTargetInfo => "my_target_info",
            AttestationFile::Report => "report",
            AttestationFile::Quote => "quote",
        }
    }

    /// Look a file up by entry name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|file| file.name() == name)
    }

    /// Whether the file accepts writes.
    #[must_use]
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            AttestationFile::UserReportData | AttestationFile::TargetInfo
        )
    }

    /// Mode bits reported for the file.
    #[must_use]
    pub fn mode(self) -> u32 {
        if self.is_writable() {
            FILE_RW_MODE | S_IFREG
        } else {
            FILE_R_MODE | S_IFREG
        }
    }
}

/// Operation table shared by the attestation leaves.
struct AttestationNode {
    file: AttestationFile,
    platform: Arc<dyn Platform>,
}

impl AttestationNode {
    fn state(&self) -> &'static AttestationState {
        AttestationState::global()
    }

    fn open_input(&self, flags: OpenFlags) -> Result<StrHandle, FsError> {
        let file = self.file;
        let data = self.state().with_inputs(self.platform.as_ref(), |inputs, _| {
            let source = match file {
                AttestationFile::UserReportData => &inputs.user_report_data,
                _ => &inputs.target_info,
            };
            let mut data = alloc_zeroed(source.len())?;
            data.copy_from_slice(source);
            Ok(data)
        })?;
        let capacity = data.len();
        let commit: CommitHook = match file {
            AttestationFile::UserReportData => Box::new(|buf: &[u8]| {
                AttestationState::global().commit_user_report_data(buf);
            }),
            _ => Box::new(|buf: &[u8]| {
                AttestationState::global().commit_target_info(buf);
            }),
        };
        Ok(StrHandle::new(file.name(), handle_access(flags), data, capacity).with_commit(commit))
    }

    fn open_my_target_info(&self) -> Result<StrHandle, FsError> {
        let platform = self.platform.as_ref();
        let data = self.state().with_inputs(platform, |_, sizes| {
            let mut user_report_data = alloc_zeroed(sizes.user_report_data_size())?;
            let mut target_info = alloc_zeroed(sizes.target_info_size())?;
            let reported = platform
                .attestation_report(ReportRequest::SelfTarget {
                    user_report_data: &mut user_report_data,
                    target_info: &mut target_info,
                })
                .map_err(|err| platform_failure("my_target_info", &err))?;
            if reported != sizes {
                error!("platform sizes changed: cached {sizes:?}, reported {reported:?}");
                return Err(FsError::access("platform reported inconsistent sizes"));
            }
            Ok(target_info)
        })?;
        debug!("produced my_target_info ({} bytes)", data.len());
        Ok(read_only(self.file, data))
    }

    fn open_report(&self) -> Result<StrHandle, FsError> {
        let platform = self.platform.as_ref();
        let data = self.state().with_inputs(platform, |inputs, sizes| {
            let mut report = alloc_zeroed(sizes.report_size())?;
            platform
                .attestation_report(ReportRequest::Report {
                    user_report_data: &inputs.user_report_data,
                    target_info: &inputs.target_info,
                    report: &mut report,
                })
                .map_err(|err| platform_failure("report", &err))?;
            Ok(report)
        })?;
        debug!("produced report ({} bytes)", data.len());
        Ok(read_only(self.file, data))
    }

    fn open_quote(&self) -> Result<StrHandle, FsError> {
        let platform = self.platform.as_ref();
        let data = self.state().with_inputs(platform, |inputs, _| {
            let mut scratch = alloc_zeroed(QUOTE_MAX_SIZE)?;
            let len = platform
                .attestation_quote(&inputs.user_report_data, &mut scratch)
                .map_err(|err| platform_failure("quote", &err))?;
            if len > scratch.len() {
                error!("platform quote length {len} exceeds buffer {}", scratch.len());
                return Err(FsError::access("platform reported oversized quote"));
            }
            let mut quote = alloc_zeroed(len)?;
            quote.copy_from_slice(&scratch[..len]);
            Ok(quote)
        })?;
        debug!("produced quote ({} bytes)", data.len());
        Ok(read_only(self.file, data))
    }
}

impl PseudoOps for AttestationNode {
    fn open(&self, name: &str, flags: OpenFlags) -> Result<StrHandle, FsError> {
        if !is_supported(self.platform.as_ref()) {
            warn!(
                "refusing {name}: host type {:?} has no attestation support",
                self.platform.host_type()
            );
            return Err(FsError::access(format!(
                "{name} requires a {SUPPORTED_HOST_TYPE} host"
            )));
        }
        if !self.file.is_writable() && flags.wants_write() {
            warn!("refusing write open of read-only {name}");
            return Err(FsError::access(format!("{name} is read-only")));
        }
        match self.file {
            AttestationFile::UserReportData | AttestationFile::TargetInfo => {
                self.open_input(flags)
            }
            AttestationFile::MyTargetInfo => self.open_my_target_info(),
            AttestationFile::Report => self.open_report(),
            AttestationFile::Quote => self.open_quote(),
        }
    }

    fn mode(&self, _name: &str) -> Result<u32, FsError> {
        Ok(self.file.mode())
    }
}

fn handle_access(flags: OpenFlags) -> Access {
    let mut access = Access::empty();
    if flags.wants_read() {
        access |= Access::READ;
    }
    if flags.wants_write() {
        access |= Access::WRITE;
    }
    access
}

fn read_only(file: AttestationFile, data: Vec<u8>) -> StrHandle {
    let capacity = data.len();
    StrHandle::new(file.name(), Access::READ, data, capacity)
}

fn platform_failure(file: &str, err: &PlatformError) -> FsError {
    error!("platform refused {file}: {err}");
    FsError::access(format!("platform refused {file}: {err}"))
}

/// Build the `attestation/` directory descriptor backed by `platform`.
#[must_use]
pub fn attestation_dir(platform: Arc<dyn Platform>) -> PseudoDir {
    PseudoDir::new(
        AttestationFile::ALL
            .into_iter()
            .map(|file| {
                PseudoEntry::file(
                    file.name(),
                    Arc::new(AttestationNode {
                        file,
                        platform: Arc::clone(&platform),
                    }),
                )
            })
            .collect(),
    )
}
