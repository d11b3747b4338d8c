//! Trust scoring - a pure function over verification results.
//!
//! Turns a [`VerificationReport`] plus chain metadata into a 0-100 composite
//! score and qualitative labels for third parties. No I/O and no clock
//! reads: the caller supplies the chain age, so scoring is reproducible.
//!
//! Weighting: crypto validity dominates (50), behavioral binding and live
//! divergence add up to 35, and chain activity contributes a logarithmic
//! tail capped at 15 so long histories saturate instead of dominating.

use crate::verifier::VerificationReport;
use serde::{Deserialize, Serialize};

/// How likely this identity is a throwaway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamRisk {
    Low,
    Medium,
    High,
}

/// How much verifiable history the identity has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackRecord {
    None,
    Some,
    Established,
}

/// Composite trust assessment for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustAssessment {
    /// 0-100 composite score.
    pub score: u8,
    pub spam_risk: SpamRisk,
    pub track_record: TrackRecord,
}

/// Compute the 0-100 trust score.
///
/// - +50 when the crypto tier passed
/// - +15 when the SEED hash is bound into the chain
/// - +`round(20 * (1 - min(divergence, 1)))` when a live behavioral sample
///   exists; +10 partial credit when only the bound tier passed
/// - +`min(15, round(7.5 * log10(chainLength + 1)))` for chain activity
pub fn trust_score(report: &VerificationReport, chain_length: usize) -> u8 {
    let mut score: f64 = 0.0;

    if report.crypto.passed {
        score += 50.0;
    }

    let seed_bound = report
        .bound
        .map(|bound| bound.seed_hash_matches)
        .unwrap_or(false);
    if seed_bound {
        score += 15.0;
    }

    match &report.behavioral {
        Some(behavioral) => {
            score += (20.0 * (1.0 - behavioral.divergence_score.min(1.0))).round();
        }
        None => {
            if report.bound.map(|bound| bound.passed).unwrap_or(false) {
                score += 10.0;
            }
        }
    }

    score += activity_points(chain_length);

    (score.clamp(0.0, 100.0)) as u8
}

fn activity_points(chain_length: usize) -> f64 {
    let log = ((chain_length as f64) + 1.0).log10();
    (7.5 * log).round().min(15.0)
}

/// Classify the spam risk of an identity.
pub fn spam_risk(report: &VerificationReport, chain_length: usize, age_days: f64) -> SpamRisk {
    if chain_length <= 1 && age_days < 1.0 {
        return SpamRisk::High;
    }

    let seed_bound = report
        .bound
        .map(|bound| bound.seed_hash_matches)
        .unwrap_or(false);
    let high_divergence = report
        .behavioral
        .as_ref()
        .map(|behavioral| behavioral.divergence_score > 0.5)
        .unwrap_or(false);

    if (chain_length < 5 && age_days < 7.0) || high_divergence || !seed_bound {
        return SpamRisk::Medium;
    }
    SpamRisk::Low
}

/// Classify how established the identity's track record is.
pub fn track_record(report: &VerificationReport, chain_length: usize, age_days: f64) -> TrackRecord {
    if chain_length == 0 {
        return TrackRecord::None;
    }
    if chain_length >= 10 && age_days >= 7.0 && report.behavioral.is_some() {
        return TrackRecord::Established;
    }
    if chain_length >= 2 || age_days >= 1.0 {
        return TrackRecord::Some;
    }
    TrackRecord::None
}

/// Full assessment: score plus qualitative labels.
pub fn assess(report: &VerificationReport, chain_length: usize, age_days: f64) -> TrustAssessment {
    TrustAssessment {
        score: trust_score(report, chain_length),
        spam_risk: spam_risk(report, chain_length, age_days),
        track_record: track_record(report, chain_length, age_days),
    }
}

/// Age in days of a chain, from its genesis delegation to `now`.
pub fn chain_age_days(
    chain: &[crate::record::IdentityRecord],
    now: chrono::DateTime<chrono::Utc>,
) -> f64 {
    match chain.first() {
        Some(crate::record::IdentityRecord::Genesis(genesis)) => {
            let age = now - genesis.delegation.created_at;
            (age.num_seconds() as f64 / 86_400.0).max(0.0)
        }
        _ => 0.0,
    }
}
