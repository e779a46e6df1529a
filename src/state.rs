// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Process-wide attestation inputs and the cached platform sizes.
// Author: Lukas Bower

//! Process-wide attestation state.
//!
//! Holds the sizes discovered from the platform and the most recently committed
//! `user_report_data` and `target_info`. One lock covers the whole record and is held while an
//! open samples the inputs, calls the platform and fills its handle, so every artifact is built
//! from a consistent snapshot.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error, warn};
use once_cell::sync::Lazy;

use crate::platform::{Platform, ReportRequest};
use crate::sizes::AttestationSizes;
use crate::FsError;

static STATE: Lazy<AttestationState> = Lazy::new(AttestationState::new);

/// Committed attestation inputs, sized to the discovered platform sizes.
#[derive(Debug, Default)]
pub(crate) struct Inputs {
    pub(crate) user_report_data: Vec<u8>,
    pub(crate) target_info: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    sizes: Option<AttestationSizes>,
    inputs: Inputs,
}

/// Process-wide attestation record.
#[derive(Debug, Default)]
pub struct AttestationState {
    inner: Mutex<Inner>,
}

impl AttestationState {
    fn new() -> Self {
        Self::default()
    }

    /// The record shared by every attestation directory in the process.
    pub fn global() -> &'static AttestationState {
        &STATE
    }

    /// Sizes discovered so far, if any.
    pub fn sizes(&self) -> Option<AttestationSizes> {
        self.lock_or_recover().sizes
    }

    /// Snapshot of the committed user report data.
    pub fn user_report_data(&self) -> Vec<u8> {
        self.lock_or_recover().inputs.user_report_data.clone()
    }

    /// Snapshot of the committed target info.
    pub fn target_info(&self) -> Vec<u8> {
        self.lock_or_recover().inputs.target_info.clone()
    }

    /// Discover sizes on first use, then run `f` on the inputs while the lock is held.
    pub(crate) fn with_inputs<T>(
        &self,
        platform: &dyn Platform,
        f: impl FnOnce(&Inputs, AttestationSizes) -> Result<T, FsError>,
    ) -> Result<T, FsError> {
        let mut inner = self.lock_or_recover();
        let sizes = match inner.sizes {
            Some(sizes) => sizes,
            None => {
                let sizes = probe_sizes(platform)?;
                inner.inputs = Inputs {
                    user_report_data: alloc_zeroed(sizes.user_report_data_size())?,
                    target_info: alloc_zeroed(sizes.target_info_size())?,
                };
                inner.sizes = Some(sizes);
                sizes
            }
        };
        f(&inner.inputs, sizes)
    }

    /// Replace the committed user report data with `data`.
    pub fn commit_user_report_data(&self, data: &[u8]) {
        let mut inner = self.lock_or_recover();
        commit_into("user_report_data", &mut inner.inputs.user_report_data, data);
    }

    /// Replace the committed target info with `data`.
    pub fn commit_target_info(&self, data: &[u8]) {
        let mut inner = self.lock_or_recover();
        commit_into("target_info", &mut inner.inputs.target_info, data);
    }

    /// Forget discovered sizes and committed inputs. Only used in tests.
    pub fn reset(&self) {
        *self.lock_or_recover() = Inner::default();
    }

    // Every mutation leaves the record whole before any platform call runs, so a panic while the
    // lock is held never leaves it torn.
    fn lock_or_recover(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resets the global attestation state on creation and on drop.
pub struct TestStateGuard;

impl TestStateGuard {
    /// Clear the global state for the lifetime of the guard.
    #[must_use]
    pub fn new() -> Self {
        AttestationState::global().reset();
        TestStateGuard
    }
}

impl Default for TestStateGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestStateGuard {
    fn drop(&mut self) {
        AttestationState::global().reset();
    }
}

fn probe_sizes(platform: &dyn Platform) -> Result<AttestationSizes, FsError> {
    let sizes = platform
        .attestation_report(ReportRequest::Sizes)
        .map_err(|err| {
            error!("attestation sizes probe failed: {err}");
            FsError::access(format!("sizes probe failed: {err}"))
        })?;
    debug!(
        "attestation sizes: user_report_data={} target_info={} report={}",
        sizes.user_report_data_size(),
        sizes.target_info_size(),
        sizes.report_size()
    );
    Ok(sizes)
}

fn commit_into(name: &str, slot: &mut Vec<u8>, data: &[u8]) {
    if slot.is_empty() {
        warn!("dropping {name} commit: attestation sizes not discovered");
        return;
    }
    let count = slot.len().min(data.len());
    slot[..count].copy_from_slice(&data[..count]);
    debug!("committed {count} bytes of {name}");
}

/// Allocate a zeroed buffer, reporting allocation failure instead of aborting.
pub(crate) fn alloc_zeroed(len: usize) -> Result<Vec<u8>, FsError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| FsError::OutOfMemory)?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        calls: AtomicUsize,
        sizes: Result<(usize, usize, usize), ()>,
    }

    impl Probe {
        fn ok(urd: usize, ti: usize, report: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                sizes: Ok((urd, ti, report)),
            }
        }
    }

    impl Platform for Probe {
        fn host_type(&self) -> &str {
            "Linux-SGX"
        }

        fn attestation_report(
            &self,
            _request: ReportRequest<'_>,
        ) -> Result<AttestationSizes, PlatformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (urd, ti, report) = self
                .sizes
                .map_err(|()| PlatformError::Failed("probe refused".to_owned()))?;
            AttestationSizes::new(urd, ti, report)
                .map_err(|err| PlatformError::Failed(err.to_string()))
        }

        fn attestation_quote(&self, _: &[u8], _: &mut [u8]) -> Result<usize, PlatformError> {
            Err(PlatformError::Failed("unused".to_owned()))
        }
    }

    #[test]
    fn sizes_are_probed_once() {
        let state = AttestationState::new();
        let platform = Probe::ok(64, 512, 432);
        for _ in 0..3 {
            let seen = state
                .with_inputs(&platform, |inputs, sizes| {
                    assert_eq!(inputs.user_report_data, vec![0u8; 64]);
                    assert_eq!(inputs.target_info, vec![0u8; 512]);
                    Ok(sizes)
                })
                .expect("with_inputs");
            assert_eq!(seen, AttestationSizes::new(64, 512, 432).expect("sizes"));
        }
        assert_eq!(platform.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_probe_leaves_state_untouched() {
        let state = AttestationState::new();
        let platform = Probe {
            calls: AtomicUsize::new(0),
            sizes: Err(()),
        };
        let err = state
            .with_inputs(&platform, |_, _| Ok(()))
            .expect_err("probe fails");
        assert!(matches!(err, FsError::AccessDenied(_)));
        assert!(state.sizes().is_none());
        assert!(state.user_report_data().is_empty());
    }

    #[test]
    fn commits_replace_inputs_at_fixed_length() {
        let state = AttestationState::new();
        let platform = Probe::ok(4, 8, 16);
        state.with_inputs(&platform, |_, _| Ok(())).expect("init");
        state.commit_user_report_data(&[1, 2, 3, 4]);
        state.commit_target_info(&[9; 8]);
        assert_eq!(state.user_report_data(), vec![1, 2, 3, 4]);
        assert_eq!(state.target_info(), vec![9; 8]);
    }

    #[test]
    fn commit_before_discovery_is_dropped() {
        let state = AttestationState::new();
        state.commit_user_report_data(&[1, 2, 3]);
        assert!(state.user_report_data().is_empty());
    }

    #[test]
    fn reset_forgets_sizes_and_inputs() {
        let state = AttestationState::new();
        let platform = Probe::ok(4, 8, 16);
        state.with_inputs(&platform, |_, _| Ok(())).expect("init");
        state.commit_user_report_data(&[7; 4]);
        state.reset();
        assert!(state.sizes().is_none());
        assert!(state.user_report_data().is_empty());
        state.with_inputs(&platform, |_, _| Ok(())).expect("re-init");
        assert_eq!(state.user_report_data(), vec![0; 4]);
        assert_eq!(platform.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_platform_call_does_not_wedge_state() {
        let state = AttestationState::new();
        let platform = Probe::ok(4, 8, 16);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = state.with_inputs(&platform, |_, _| -> Result<(), FsError> {
                panic!("platform call aborted")
            });
        }));
        assert!(outcome.is_err());
        assert!(state.inner.is_poisoned());

        state.commit_user_report_data(&[5; 4]);
        let seen = state
            .with_inputs(&platform, |inputs, _| Ok(inputs.user_report_data.clone()))
            .expect("with_inputs after panic");
        assert_eq!(seen, vec![5; 4]);
        assert_eq!(platform.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn alloc_zeroed_reports_oom() {
        assert_eq!(alloc_zeroed(3).expect("alloc"), vec![0, 0, 0]);
        assert_eq!(alloc_zeroed(usize::MAX), Err(FsError::OutOfMemory));
    }
}
