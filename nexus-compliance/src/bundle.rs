//! Deterministic, signed evidence bundles (spec §4.15).
//!
//! A bundle is a ZIP of nine named artifacts plus a `manifest.json` of their
//! SHA-256 checksums; the manifest itself is HMAC-SHA256 signed so a
//! tampered bundle fails verification even if a checksum happens to still
//! match (an attacker who edits a file and patches its own checksum in the
//! manifest still can't forge the signature without the key).

use hmac::{Hmac, Mac};
use nexus_core::{NexusError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

type HmacSha256 = Hmac<Sha256>;

/// Inputs for one evidence bundle; every field is a separately-sourced
/// artifact named in spec §4.15.
pub struct BundleInputs {
    pub snapshot: Vec<u8>,
    pub controls: Vec<u8>,
    pub config_sanitized: Vec<u8>,
    pub runbooks_index: Vec<u8>,
    pub changelog_excerpt: Vec<u8>,
    pub capacity_model_excerpt: Vec<u8>,
    pub perf_gates_excerpt: Vec<u8>,
    pub perf_report_summary: Vec<u8>,
    pub ops_metrics_24h_summary: Vec<u8>,
}

impl BundleInputs {
    /// Fixed file order — the same order every time, which is what makes
    /// the ZIP's central directory (and therefore its bytes) deterministic
    /// for identical inputs.
    fn files(&self) -> [(&'static str, &[u8]); 9] {
        [
            ("snapshot.json", &self.snapshot),
            ("controls.json", &self.controls),
            ("config_sanitized.json", &self.config_sanitized),
            ("runbooks_index.json", &self.runbooks_index),
            ("changelog_excerpt.md", &self.changelog_excerpt),
            ("capacity_model_excerpt.md", &self.capacity_model_excerpt),
            ("perf_gates_excerpt.json", &self.perf_gates_excerpt),
            ("perf_report_summary.md", &self.perf_report_summary),
            ("ops_metrics_24h_summary.json", &self.ops_metrics_24h_summary),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub checksums: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct EvidenceBundle {
    pub zip_bytes: Vec<u8>,
    pub manifest: Manifest,
    pub signature: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().fold(String::with_capacity(64), |mut out, byte| {
        use std::fmt::Write as _;
        let _ = write!(out, "{byte:02x}");
        out
    })
}

fn fixed_file_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0).unwrap())
}

fn sign_manifest(manifest_bytes: &[u8], hmac_key: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(hmac_key).map_err(|_| NexusError::Internal("invalid hmac key length".into()))?;
    mac.update(manifest_bytes);
    Ok(sha256_hex(&mac.finalize().into_bytes()))
}

/// Builds the ZIP, computes the manifest, signs it, and embeds
/// `manifest.json` as the bundle's last entry.
pub fn build_bundle(inputs: &BundleInputs, hmac_key: &[u8]) -> Result<EvidenceBundle> {
    let checksums: BTreeMap<String, String> = inputs.files().into_iter().map(|(name, bytes)| (name.to_string(), sha256_hex(bytes))).collect();
    let manifest = Manifest { checksums };
    let manifest_bytes = serde_json::to_vec(&manifest).map_err(|e| NexusError::Internal(e.to_string()))?;
    let signature = sign_manifest(&manifest_bytes, hmac_key)?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in inputs.files() {
        writer.start_file(name, fixed_file_options()).map_err(|e| NexusError::Internal(e.to_string()))?;
        writer.write_all(bytes).map_err(|e| NexusError::Internal(e.to_string()))?;
    }
    writer.start_file("manifest.json", fixed_file_options()).map_err(|e| NexusError::Internal(e.to_string()))?;
    writer.write_all(&manifest_bytes).map_err(|e| NexusError::Internal(e.to_string()))?;
    let cursor = writer.finish().map_err(|e| NexusError::Internal(e.to_string()))?;

    Ok(EvidenceBundle { zip_bytes: cursor.into_inner(), manifest, signature })
}

/// Recomputes every file's checksum from `zip_bytes`, compares against the
/// embedded manifest, then recomputes the HMAC over that manifest and
/// compares it to `signature` — a full tamper check, not just a hash check.
pub fn verify_bundle(zip_bytes: &[u8], signature: &str, hmac_key: &[u8]) -> Result<()> {
    let mut archive = ZipArchive::new(Cursor::new(zip_bytes)).map_err(|e| NexusError::Internal(e.to_string()))?;

    let mut manifest_bytes = Vec::new();
    archive
        .by_name("manifest.json")
        .map_err(|_| NexusError::Compliance { code: "EVIDENCE_MANIFEST_MISSING".into(), message: "bundle has no manifest.json".into() })?
        .read_to_end(&mut manifest_bytes)
        .map_err(|e| NexusError::Internal(e.to_string()))?;
    let manifest: Manifest = serde_json::from_slice(&manifest_bytes).map_err(|e| NexusError::Internal(e.to_string()))?;

    let expected_signature = sign_manifest(&manifest_bytes, hmac_key)?;
    if expected_signature != signature {
        return Err(NexusError::Compliance { code: "EVIDENCE_SIGNATURE_MISMATCH".into(), message: "evidence bundle signature does not match".into() });
    }

    for (name, expected_checksum) in &manifest.checksums {
        let mut bytes = Vec::new();
        archive
            .by_name(name)
            .map_err(|_| NexusError::Compliance { code: "EVIDENCE_FILE_MISSING".into(), message: format!("bundle is missing {name}") })?
            .read_to_end(&mut bytes)
            .map_err(|e| NexusError::Internal(e.to_string()))?;
        if &sha256_hex(&bytes) != expected_checksum {
            return Err(NexusError::Compliance { code: "EVIDENCE_CHECKSUM_MISMATCH".into(), message: format!("checksum mismatch for {name}") });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_inputs() -> BundleInputs {
        BundleInputs {
            snapshot: b"{\"id\":\"snap-1\"}".to_vec(),
            controls: b"[]".to_vec(),
            config_sanitized: b"{}".to_vec(),
            runbooks_index: b"[]".to_vec(),
            changelog_excerpt: b"# changelog".to_vec(),
            capacity_model_excerpt: b"# capacity".to_vec(),
            perf_gates_excerpt: b"{}".to_vec(),
            perf_report_summary: b"# perf".to_vec(),
            ops_metrics_24h_summary: b"{}".to_vec(),
        }
    }

    #[test]
    fn build_then_verify_round_trips() {
        let bundle = build_bundle(&sample_inputs(), b"test-hmac-key").unwrap();
        verify_bundle(&bundle.zip_bytes, &bundle.signature, b"test-hmac-key").unwrap();
    }

    #[test]
    fn identical_inputs_produce_identical_bytes() {
        let a = build_bundle(&sample_inputs(), b"test-hmac-key").unwrap();
        let b = build_bundle(&sample_inputs(), b"test-hmac-key").unwrap();
        assert_eq!(a.zip_bytes, b.zip_bytes);
    }

    #[test]
    fn tampered_file_fails_verification() {
        let mut bundle = build_bundle(&sample_inputs(), b"test-hmac-key").unwrap();
        let last = bundle.zip_bytes.len() - 1;
        bundle.zip_bytes[last] ^= 0xff;
        assert!(verify_bundle(&bundle.zip_bytes, &bundle.signature, b"test-hmac-key").is_err());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let bundle = build_bundle(&sample_inputs(), b"test-hmac-key").unwrap();
        let err = verify_bundle(&bundle.zip_bytes, &bundle.signature, b"wrong-key").unwrap_err();
        assert_eq!(err.code(), "COMPLIANCE_ERROR");
    }
}
