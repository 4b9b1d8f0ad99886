//! SLA certificates.
//!
//! A certificate is a read-only snapshot of one evaluation: what was asked
//! for (settings, target), what was measured (metrics) and what was decided.
//! Its `digest` is a SHA-256 over the RFC 8785 canonical JSON of every field
//! except `issued_at` and the digest itself, so two evaluations with the same
//! inputs and samples carry the same digest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonicalize::{canonical_digest, canonicalize, sha256_hex};
use crate::config::Settings;
use crate::decision::{Decision, GateDecision};
use crate::errors::GateResult;
use crate::metrics::{Metrics, CONFIDENCE};

pub const CERTIFICATE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaCertificate {
    pub schema_version: u32,
    pub model: String,
    pub h_star: f64,
    pub isr_threshold: f64,
    pub margin_extra_bits: f64,
    pub confidence: f64,
    pub settings: Settings,
    pub prompt_sha256: String,
    pub metrics: Metrics,
    pub decision: Decision,
    pub rationale: String,
    pub issued_at: DateTime<Utc>,
    pub digest: String,
}

/// The digested part of a certificate
#[derive(Serialize)]
struct CertificateBody<'a> {
    schema_version: u32,
    model: &'a str,
    h_star: f64,
    isr_threshold: f64,
    margin_extra_bits: f64,
    confidence: f64,
    settings: &'a Settings,
    prompt_sha256: &'a str,
    metrics: &'a Metrics,
    decision: Decision,
    rationale: &'a str,
}

impl SlaCertificate {
    fn body(&self) -> CertificateBody<'_> {
        CertificateBody {
            schema_version: self.schema_version,
            model: &self.model,
            h_star: self.h_star,
            isr_threshold: self.isr_threshold,
            margin_extra_bits: self.margin_extra_bits,
            confidence: self.confidence,
            settings: &self.settings,
            prompt_sha256: &self.prompt_sha256,
            metrics: &self.metrics,
            decision: self.decision,
            rationale: &self.rationale,
        }
    }

    /// Canonical JSON of the digested fields
    pub fn canonical_body(&self) -> GateResult<String> {
        canonicalize(&self.body())
    }

    /// Recompute the digest and compare it with the stored one
    pub fn verify(&self) -> GateResult<bool> {
        Ok(canonical_digest(&self.body())? == self.digest)
    }
}

/// Assemble the certificate for one evaluation.
pub fn build(
    prompt: &str,
    settings: &Settings,
    metrics: &Metrics,
    decision: &GateDecision,
    issued_at: DateTime<Utc>,
) -> GateResult<SlaCertificate> {
    let mut certificate = SlaCertificate {
        schema_version: CERTIFICATE_SCHEMA_VERSION,
        model: settings.model.clone(),
        h_star: settings.h_star,
        isr_threshold: settings.isr_threshold,
        margin_extra_bits: settings.margin_extra_bits,
        confidence: CONFIDENCE,
        settings: settings.clone(),
        prompt_sha256: sha256_hex(prompt),
        metrics: *metrics,
        decision: decision.decision,
        rationale: decision.rationale.clone(),
        issued_at,
        digest: String::new(),
    };
    certificate.digest = canonical_digest(&certificate.body())?;
    Ok(certificate)
}
