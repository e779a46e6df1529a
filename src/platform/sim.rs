// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Deterministic SGX-shaped attestation platform configured from TOML.
// Author: Lukas Bower

//! Simulated attestation platform.
//!
//! Produces artifacts with the SGX byte layout so the attestation directory can run outside an
//! enclave. Nothing here is secure: the report MAC is a truncated SHA-256 and the quoting key is
//! derived from a configured seed.
//!
//! Report layout (`report_size` bytes):
//!
//! ```text
//! 0                     body_len          body_len+32       body_len+48
//! | body ...            | key_id (32)     | mac (16)        |
//!
//! body: attributes @48, mr_enclave @64, mr_signer @128, isv_prod_id @256, isv_svn @258,
//!       user report data in the last `user_report_data_size` bytes
//! ```
//!
//! Quote layout: 48-byte header, report body, `u32` LE signature length, Ed25519 signature over
//! header and body, 32-byte verifying key.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use ed25519_dalek::{Signer, SigningKey};
use log::debug;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::{Platform, PlatformError, ReportRequest, SUPPORTED_HOST_TYPE};
use crate::sizes::{AttestationSizes, SizesError, QUOTE_MAX_SIZE};

/// Bytes following the report body: key id and MAC.
pub const REPORT_TRAILER_LEN: usize = KEY_ID_LEN + MAC_LEN;
/// Length of the quote header.
pub const QUOTE_HEADER_LEN: usize = 48;
/// Quote format version written into the header.
pub const QUOTE_VERSION: u16 = 3;
/// Attestation key type written into the header.
pub const QUOTE_KEY_TYPE_ED25519: u16 = 0xed;

const KEY_ID_LEN: usize = 32;
const MAC_LEN: usize = 16;
const SIGNATURE_LEN: usize = 64;
const VERIFYING_KEY_LEN: usize = 32;

const ATTRIBUTES_OFFSET: usize = 48;
const MR_ENCLAVE_OFFSET: usize = 64;
const MR_SIGNER_OFFSET: usize = 128;
const ISV_PROD_ID_OFFSET: usize = 256;
const ISV_SVN_OFFSET: usize = 258;
/// End of the fixed identity fields inside the report body.
const BODY_FIXED_END: usize = 260;

const TARGET_MR_ENCLAVE_OFFSET: usize = 0;
const TARGET_ATTRIBUTES_OFFSET: usize = 32;
/// End of the identity fields inside target info.
const TARGET_FIXED_END: usize = 48;

const QE_VENDOR_ID: [u8; 16] = *b"attestfs-sim-qe\0";

/// Errors raised while loading a [`SimConfig`].
#[derive(Debug, Error)]
pub enum SimConfigError {
    /// The configuration file could not be read.
    #[error("failed to read simulator config: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration is not valid TOML for [`SimConfig`].
    #[error("failed to parse simulator config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A hex field does not decode to the expected length.
    #[error("field {field} must be {expected} hex-encoded bytes")]
    Hex {
        /// Offending field.
        field: &'static str,
        /// Expected decoded length.
        expected: usize,
    },
    /// The configured sizes are invalid.
    #[error(transparent)]
    Sizes(#[from] SizesError),
    /// The report cannot carry the fixed body layout.
    #[error("report_size {report_size} too small, need at least {required}")]
    ReportTooSmall {
        /// Configured report size.
        report_size: usize,
        /// Minimum report size for the configured user report data size.
        required: usize,
    },
    /// Target info cannot carry the identity fields.
    #[error("target_info_size {0} too small, need at least 48")]
    TargetInfoTooSmall(usize),
    /// The quote for the configured report size would not fit the quote buffer.
    #[error("report_size {report_size} yields a {quote_size} byte quote, limit is {max}")]
    QuoteTooLarge {
        /// Configured report size.
        report_size: usize,
        /// Quote length the report size implies.
        quote_size: usize,
        /// Capacity of the quote buffer.
        max: usize,
    },
}

/// Simulator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Host type reported by the platform identity probe.
    pub host_type: String,
    /// Size of user report data.
    pub user_report_data_size: usize,
    /// Size of target info.
    pub target_info_size: usize,
    /// Size of a local report.
    pub report_size: usize,
    /// Enclave measurement, 32 bytes hex.
    pub mr_enclave: String,
    /// Signer measurement, 32 bytes hex.
    pub mr_signer: String,
    /// Enclave attributes, 16 bytes hex.
    pub attributes: String,
    /// Product id.
    pub isv_prod_id: u16,
    /// Security version.
    pub isv_svn: u16,
    /// Seed of the quoting key, 32 bytes hex.
    pub signing_seed: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            host_type: SUPPORTED_HOST_TYPE.to_owned(),
            user_report_data_size: 64,
            target_info_size: 512,
            report_size: 432,
            mr_enclave: hex::encode(Sha256::digest(b"attestfs simulated enclave")),
            mr_signer: hex::encode(Sha256::digest(b"attestfs simulated signer")),
            attributes: hex::encode([0x07u8, 0, 0, 0, 0, 0, 0, 0, 0x03, 0, 0, 0, 0, 0, 0, 0]),
            isv_prod_id: 0,
            isv_svn: 0,
            signing_seed: hex::encode(Sha256::digest(b"attestfs simulated quoting key")),
        }
    }
}

impl SimConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, SimConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse a configuration from TOML text. Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, SimConfigError> {
        let cfg: SimConfig = toml::from_str(text)?;
        cfg.identity()?;
        Ok(cfg)
    }

    fn identity(&self) -> Result<Identity, SimConfigError> {
        let sizes =
            AttestationSizes::new(self.user_report_data_size, self.target_info_size, self.report_size)?;
        let required = REPORT_TRAILER_LEN + BODY_FIXED_END + sizes.user_report_data_size();
        if sizes.report_size() < required {
            return Err(SimConfigError::ReportTooSmall {
                report_size: sizes.report_size(),
                required,
            });
        }
        if sizes.target_info_size() < TARGET_FIXED_END {
            return Err(SimConfigError::TargetInfoTooSmall(sizes.target_info_size()));
        }
        let quote_size = quote_len_for(sizes.report_size());
        if quote_size > QUOTE_MAX_SIZE {
            return Err(SimConfigError::QuoteTooLarge {
                report_size: sizes.report_size(),
                quote_size,
                max: QUOTE_MAX_SIZE,
            });
        }
        Ok(Identity {
            sizes,
            mr_enclave: decode_hex("mr_enclave", &self.mr_enclave)?,
            mr_signer: decode_hex("mr_signer", &self.mr_signer)?,
            attributes: decode_hex("attributes", &self.attributes)?,
            isv_prod_id: self.isv_prod_id,
            isv_svn: self.isv_svn,
            signing_key: SigningKey::from_bytes(&decode_hex("signing_seed", &self.signing_seed)?),
        })
    }
}

/// Quote length for a report of `report_size` bytes. The caller guarantees
/// `report_size >= REPORT_TRAILER_LEN`.
fn quote_len_for(report_size: usize) -> usize {
    QUOTE_HEADER_LEN + (report_size - REPORT_TRAILER_LEN) + 4 + SIGNATURE_LEN + VERIFYING_KEY_LEN
}

fn decode_hex<const N: usize>(field: &'static str, text: &str) -> Result<[u8; N], SimConfigError> {
    let mut out = [0u8; N];
    hex::decode_to_slice(text.trim(), &mut out)
        .map_err(|_| SimConfigError::Hex { field, expected: N })?;
    Ok(out)
}

struct Identity {
    sizes: AttestationSizes,
    mr_enclave: [u8; 32],
    mr_signer: [u8; 32],
    attributes: [u8; 16],
    isv_prod_id: u16,
    isv_svn: u16,
    signing_key: SigningKey,
}

/// Simulated SGX-like platform.
pub struct SimulatedPlatform {
    host_type: String,
    identity: Identity,
    report_calls: AtomicUsize,
    quote_calls: AtomicUsize,
}

impl std::fmt::Debug for SimulatedPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedPlatform")
            .field("host_type", &self.host_type)
            .field("sizes", &self.identity.sizes)
            .finish_non_exhaustive()
    }
}

impl SimulatedPlatform {
    /// Build a simulator from a validated configuration.
    pub fn new(config: &SimConfig) -> Result<Self, SimConfigError> {
        Ok(Self {
            host_type: config.host_type.clone(),
            identity: config.identity()?,
            report_calls: AtomicUsize::new(0),
            quote_calls: AtomicUsize::new(0),
        })
    }

    /// Simulator with the default SGX-sized configuration.
    #[must_use]
    pub fn sgx() -> Self {
        Self::new(&SimConfig::default()).unwrap_or_else(|err| {
            unreachable!("default simulator config is valid: {err}")
        })
    }

    /// Sizes this platform expects.
    #[must_use]
    pub fn sizes(&self) -> AttestationSizes {
        self.identity.sizes
    }

    /// Number of `attestation_report` invocations in any mode.
    #[must_use]
    pub fn report_calls(&self) -> usize {
        self.report_calls.load(Ordering::SeqCst)
    }

    /// Number of `attestation_quote` invocations.
    #[must_use]
    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    /// Public half of the quoting key.
    #[must_use]
    pub fn verifying_key(&self) -> [u8; VERIFYING_KEY_LEN] {
        self.identity.signing_key.verifying_key().to_bytes()
    }

    /// This instance's target info, as returned by a self-target request.
    #[must_use]
    pub fn own_target_info(&self) -> Vec<u8> {
        let mut target_info = vec![0u8; self.identity.sizes.target_info_size()];
        self.fill_target_info(&mut target_info);
        target_info
    }

    /// Key id a report addressed to `target_info` carries.
    #[must_use]
    pub fn key_id_for(target_info: &[u8]) -> [u8; KEY_ID_LEN] {
        let mut key_id = [0u8; KEY_ID_LEN];
        key_id.copy_from_slice(&Sha256::digest(target_info));
        key_id
    }

    /// Length of the report body for this configuration.
    #[must_use]
    pub fn report_body_len(&self) -> usize {
        self.identity.sizes.report_size() - REPORT_TRAILER_LEN
    }

    /// Slice of a report holding the embedded user report data, or `None` if `report` is shorter
    /// than a report of this configuration.
    #[must_use]
    pub fn report_user_data<'a>(&self, report: &'a [u8]) -> Option<&'a [u8]> {
        let end = self.report_body_len();
        report.get(end - self.identity.sizes.user_report_data_size()..end)
    }

    /// Slice of a report holding the key id of its target, or `None` if `report` is too short.
    #[must_use]
    pub fn report_key_id<'a>(&self, report: &'a [u8]) -> Option<&'a [u8]> {
        let start = self.report_body_len();
        report.get(start..start + KEY_ID_LEN)
    }

    /// Slice of a quote holding the embedded user report data, or `None` if `quote` is too short.
    #[must_use]
    pub fn quote_user_data<'a>(&self, quote: &'a [u8]) -> Option<&'a [u8]> {
        let end = QUOTE_HEADER_LEN + self.report_body_len();
        quote.get(end - self.identity.sizes.user_report_data_size()..end)
    }

    fn quote_len(&self) -> usize {
        quote_len_for(self.identity.sizes.report_size())
    }

    fn fill_target_info(&self, target_info: &mut [u8]) {
        target_info.fill(0);
        target_info[TARGET_MR_ENCLAVE_OFFSET..TARGET_MR_ENCLAVE_OFFSET + 32]
            .copy_from_slice(&self.identity.mr_enclave);
        target_info[TARGET_ATTRIBUTES_OFFSET..TARGET_FIXED_END]
            .copy_from_slice(&self.identity.attributes);
    }

    fn write_body(&self, user_report_data: &[u8], body: &mut [u8]) {
        let id = &self.identity;
        body.fill(0);
        body[ATTRIBUTES_OFFSET..ATTRIBUTES_OFFSET + 16].copy_from_slice(&id.attributes);
        body[MR_ENCLAVE_OFFSET..MR_ENCLAVE_OFFSET + 32].copy_from_slice(&id.mr_enclave);
        body[MR_SIGNER_OFFSET..MR_SIGNER_OFFSET + 32].copy_from_slice(&id.mr_signer);
        body[ISV_PROD_ID_OFFSET..ISV_PROD_ID_OFFSET + 2]
            .copy_from_slice(&id.isv_prod_id.to_le_bytes());
        body[ISV_SVN_OFFSET..ISV_SVN_OFFSET + 2].copy_from_slice(&id.isv_svn.to_le_bytes());
        let start = body.len() - user_report_data.len();
        body[start..].copy_from_slice(user_report_data);
    }

    fn expect_len(
        buffer: &'static str,
        provided: usize,
        expected: usize,
    ) -> Result<(), PlatformError> {
        if provided != expected {
            return Err(PlatformError::SizeMismatch {
                buffer,
                provided,
                expected,
            });
        }
        Ok(())
    }
}

impl Platform for SimulatedPlatform {
    fn host_type(&self) -> &str {
        &self.host_type
    }

    fn attestation_report(
        &self,
        request: ReportRequest<'_>,
    ) -> Result<AttestationSizes, PlatformError> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        let sizes = self.identity.sizes;
        debug!("simulated attestation_report ({})", request.mode());
        match request {
            ReportRequest::Sizes => {}
            ReportRequest::SelfTarget {
                user_report_data,
                target_info,
            } => {
                Self::expect_len(
                    "user_report_data",
                    user_report_data.len(),
                    sizes.user_report_data_size(),
                )?;
                Self::expect_len("target_info", target_info.len(), sizes.target_info_size())?;
                self.fill_target_info(target_info);
                // A self-addressed report is taken over zeroed user data.
                user_report_data.fill(0);
            }
            ReportRequest::Report {
                user_report_data,
                target_info,
                report,
            } => {
                Self::expect_len(
                    "user_report_data",
                    user_report_data.len(),
                    sizes.user_report_data_size(),
                )?;
                Self::expect_len("target_info", target_info.len(), sizes.target_info_size())?;
                Self::expect_len("report", report.len(), sizes.report_size())?;
                let body_len = self.report_body_len();
                let (body, trailer) = report.split_at_mut(body_len);
                self.write_body(user_report_data, body);
                let key_id = Self::key_id_for(target_info);
                let mut mac = Sha256::new();
                mac.update(target_info);
                mac.update(&*body);
                trailer[..KEY_ID_LEN].copy_from_slice(&key_id);
                trailer[KEY_ID_LEN..].copy_from_slice(&mac.finalize()[..MAC_LEN]);
            }
        }
        Ok(sizes)
    }

    fn attestation_quote(
        &self,
        user_report_data: &[u8],
        quote: &mut [u8],
    ) -> Result<usize, PlatformError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        Self::expect_len(
            "user_report_data",
            user_report_data.len(),
            self.identity.sizes.user_report_data_size(),
        )?;
        let quote_len = self.quote_len();
        if quote.len() < quote_len {
            return Err(PlatformError::BufferTooSmall {
                buffer: "quote",
                required: quote_len,
                available: quote.len(),
            });
        }

        let signed_len = QUOTE_HEADER_LEN + self.report_body_len();
        let (header, rest) = quote[..signed_len].split_at_mut(QUOTE_HEADER_LEN);
        header.fill(0);
        header[0..2].copy_from_slice(&QUOTE_VERSION.to_le_bytes());
        header[2..4].copy_from_slice(&QUOTE_KEY_TYPE_ED25519.to_le_bytes());
        header[12..28].copy_from_slice(&QE_VENDOR_ID);
        self.write_body(user_report_data, rest);

        let signature = self.identity.signing_key.sign(&quote[..signed_len]).to_bytes();
        let mut cursor = signed_len;
        quote[cursor..cursor + 4].copy_from_slice(&(SIGNATURE_LEN as u32).to_le_bytes());
        cursor += 4;
        quote[cursor..cursor + SIGNATURE_LEN].copy_from_slice(&signature);
        cursor += SIGNATURE_LEN;
        quote[cursor..cursor + VERIFYING_KEY_LEN].copy_from_slice(&self.verifying_key());
        cursor += VERIFYING_KEY_LEN;
        debug!("simulated quote of {cursor} bytes");
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_sgx_sizes() {
        let platform = SimulatedPlatform::sgx();
        let sizes = platform.sizes();
        assert_eq!(
            (
                sizes.user_report_data_size(),
                sizes.target_info_size(),
                sizes.report_size()
            ),
            (64, 512, 432)
        );
        assert_eq!(platform.report_body_len(), 384);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let cfg = SimConfig::from_toml_str(
            "host_type = \"Linux\"\nisv_svn = 7\nuser_report_data_size = 32\n",
        )
        .expect("config");
        assert_eq!(cfg.host_type, "Linux");
        assert_eq!(cfg.isv_svn, 7);
        assert_eq!(cfg.user_report_data_size, 32);
        assert_eq!(cfg.target_info_size, 512);
    }

    #[test]
    fn rejects_bad_hex_and_unknown_fields() {
        let err = SimConfig::from_toml_str("mr_enclave = \"abcd\"").expect_err("short hex");
        assert!(matches!(
            err,
            SimConfigError::Hex {
                field: "mr_enclave",
                expected: 32
            }
        ));
        assert!(matches!(
            SimConfig::from_toml_str("quote_size = 12"),
            Err(SimConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_reports_too_small_for_layout() {
        let err = SimConfig::from_toml_str("report_size = 100").expect_err("small report");
        assert!(matches!(
            err,
            SimConfigError::ReportTooSmall {
                report_size: 100,
                required: 372
            }
        ));
        assert!(matches!(
            SimConfig::from_toml_str("user_report_data_size = 0"),
            Err(SimConfigError::Sizes(SizesError::Zero("user_report_data")))
        ));
    }

    #[test]
    fn rejects_reports_whose_quote_exceeds_buffer() {
        let largest = QUOTE_MAX_SIZE - (QUOTE_HEADER_LEN + 4 + SIGNATURE_LEN + VERIFYING_KEY_LEN)
            + REPORT_TRAILER_LEN;
        assert_eq!(largest, 1948);
        let cfg = SimConfig::from_toml_str(&format!("report_size = {largest}")).expect("fits");
        let platform = SimulatedPlatform::new(&cfg).expect("platform");
        let mut quote = vec![0u8; QUOTE_MAX_SIZE];
        let len = platform.attestation_quote(&[0u8; 64], &mut quote).expect("quote");
        assert_eq!(len, QUOTE_MAX_SIZE);

        let err = SimConfig::from_toml_str("report_size = 2000").expect_err("oversized quote");
        assert!(matches!(
            err,
            SimConfigError::QuoteTooLarge {
                report_size: 2000,
                quote_size: 2100,
                max: 2048
            }
        ));
    }

    #[test]
    fn layout_accessors_reject_short_buffers() {
        let platform = SimulatedPlatform::sgx();
        assert_eq!(platform.report_user_data(&[0u8; 100]), None);
        assert_eq!(platform.report_key_id(&[0u8; 400]), None);
        assert_eq!(platform.quote_user_data(&[0u8; 0]), None);
    }

    #[test]
    fn self_target_fills_identity() {
        let platform = SimulatedPlatform::sgx();
        let mut urd = vec![0xffu8; 64];
        let mut ti = vec![0u8; 512];
        platform
            .attestation_report(ReportRequest::SelfTarget {
                user_report_data: &mut urd,
                target_info: &mut ti,
            })
            .expect("self target");
        assert_eq!(ti, platform.own_target_info());
        assert_ne!(&ti[..32], &[0u8; 32]);
        assert!(ti[TARGET_FIXED_END..].iter().all(|b| *b == 0));
        assert_eq!(urd, vec![0u8; 64]);
    }

    #[test]
    fn report_embeds_user_data_and_target_key_id() {
        let platform = SimulatedPlatform::sgx();
        let urd: Vec<u8> = (1..=64).collect();
        let ti = vec![0xaa; 512];
        let mut report = vec![0u8; 432];
        platform
            .attestation_report(ReportRequest::Report {
                user_report_data: &urd,
                target_info: &ti,
                report: &mut report,
            })
            .expect("report");
        assert_eq!(platform.report_user_data(&report), Some(&urd[..]));
        assert_eq!(&report[320..384], &urd[..]);
        assert_eq!(
            platform.report_key_id(&report),
            Some(&SimulatedPlatform::key_id_for(&ti)[..])
        );
    }

    #[test]
    fn report_rejects_wrong_buffer_sizes() {
        let platform = SimulatedPlatform::sgx();
        let mut report = vec![0u8; 431];
        let err = platform
            .attestation_report(ReportRequest::Report {
                user_report_data: &[0u8; 64],
                target_info: &[0u8; 512],
                report: &mut report,
            })
            .expect_err("short report");
        assert_eq!(
            err,
            PlatformError::SizeMismatch {
                buffer: "report",
                provided: 431,
                expected: 432
            }
        );
    }

    #[test]
    fn quote_is_signed_and_shorter_than_capacity() {
        let platform = SimulatedPlatform::sgx();
        let urd = [0x5a; 64];
        let mut quote = vec![0u8; crate::sizes::QUOTE_MAX_SIZE];
        let len = platform.attestation_quote(&urd, &mut quote).expect("quote");
        assert_eq!(len, 48 + 384 + 4 + 64 + 32);
        assert_eq!(&quote[0..2], &QUOTE_VERSION.to_le_bytes());
        assert_eq!(platform.quote_user_data(&quote[..len]), Some(&urd[..]));
        assert_eq!(&quote[len - 32..len], &platform.verifying_key()[..]);
        assert_eq!(platform.quote_calls(), 1);
        assert_eq!(platform.report_calls(), 0);
    }

    #[test]
    fn quote_reports_small_buffers() {
        let platform = SimulatedPlatform::sgx();
        let mut quote = vec![0u8; 100];
        assert!(matches!(
            platform.attestation_quote(&[0u8; 64], &mut quote),
            Err(PlatformError::BufferTooSmall {
                buffer: "quote",
                available: 100,
                ..
            })
        ));
    }
}
