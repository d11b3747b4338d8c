//! Combined verification: the crypto -> bound -> full tier state machine.
//!
//! Each tier requires the previous one to pass. The report always carries
//! the crypto outcome (best effort, even on early failure); `bound` and
//! `behavioral` are present only if their tier was attempted. Absent fields
//! never mean "passed".
//!
//! Collaborator calls go through the [`IdentityStore`] and
//! [`DivergenceEvaluator`] traits; once inputs are fetched the decision tree
//! is plain synchronous logic. Storage failures propagate as errors;
//! everything else is encoded in the report.

use crate::audit::{log_event, AuditEvent, AuditEventType};
use crate::chain::ChainEngine;
use crate::continuity::{ContinuityChallenge, ContinuityProof, VerificationLevel};
use crate::error::Result;
use crate::record::IdentityRecord;
use crate::seed::latest_seed_commitment;
use crate::store::{DivergenceEvaluator, IdentityStore};
use crate::{DEFAULT_CHALLENGE_WINDOW_SECS, DEFAULT_DIVERGENCE_THRESHOLD};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tunables for the combined verifier.
#[derive(Debug, Clone, Copy)]
pub struct VerifierConfig {
    /// Full-tier pass ceiling: divergence must be strictly below this.
    pub divergence_threshold: f64,
    /// Challenge freshness window in seconds.
    pub challenge_window_secs: i64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            divergence_threshold: DEFAULT_DIVERGENCE_THRESHOLD,
            challenge_window_secs: DEFAULT_CHALLENGE_WINDOW_SECS,
        }
    }
}

/// Crypto-tier outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoVerification {
    pub chain_valid: bool,
    pub not_revoked: bool,
    /// Continuity-proof validity; present only for challenge-based
    /// verification (the async path implies it from the verified chain).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_valid: Option<bool>,
    /// First chain fault, when the chain is invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
    pub passed: bool,
}

/// Bound-tier outcome: is the SEED hash bound into the chain?
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundVerification {
    pub commitment_found: bool,
    pub seed_hash_matches: bool,
    pub passed: bool,
}

/// Full-tier outcome: live behavioral sample against the SEED reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralVerification {
    pub prompt_id: String,
    pub divergence_score: f64,
    pub threshold: f64,
    pub passed: bool,
}

/// The verifier's complete answer for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub agent_did: String,
    pub requested_level: VerificationLevel,
    pub chain_length: usize,
    pub crypto: CryptoVerification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound: Option<BoundVerification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavioral: Option<BehavioralVerification>,
    /// True iff every tier up to the requested level passed.
    pub verified: bool,
    /// Tier-specific failure message, when verification stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Orchestrates the three verification tiers over the two collaborators.
pub struct CombinedVerifier<S: IdentityStore, D: DivergenceEvaluator> {
    store: S,
    divergence: D,
    config: VerifierConfig,
}

impl<S: IdentityStore, D: DivergenceEvaluator> CombinedVerifier<S, D> {
    pub fn new(store: S, divergence: D, config: VerifierConfig) -> Self {
        Self {
            store,
            divergence,
            config,
        }
    }

    /// The verifier's configuration.
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Non-interactive verification from stored state alone.
    ///
    /// Crypto passes on a valid, unrevoked chain (signature validity is
    /// implied by the verified chain). The full tier cannot run without a
    /// live challenge and reports that as its error.
    pub fn verify(&self, agent_did: &str, level: VerificationLevel) -> Result<VerificationReport> {
        let chain = self.store.load_chain(agent_did)?;
        let crypto = self.crypto_tier(agent_did, &chain, None)?;
        self.run_remaining_tiers(agent_did, level, chain, crypto, None, None)
    }

    /// Challenge-based verification of a continuity proof.
    pub fn verify_with_challenge(
        &self,
        challenge: &ContinuityChallenge,
        proof: &ContinuityProof,
    ) -> Result<VerificationReport> {
        let agent_did = challenge.agent_did.as_str();
        let chain = self.store.load_chain(agent_did)?;

        let window = Duration::seconds(self.config.challenge_window_secs);
        let proof_check = ChainEngine::verify_continuity_proof(proof, challenge, &chain, window);
        let proof_error = proof_check.as_ref().err().map(|e| e.to_string());

        let crypto = self.crypto_tier(agent_did, &chain, Some(proof_check.is_ok()))?;
        let report = self.run_remaining_tiers(
            agent_did,
            challenge.verification_level,
            chain,
            crypto,
            Some((challenge, proof)),
            proof_error,
        )?;

        log_event(
            AuditEvent::new(
                if report.verified {
                    AuditEventType::ProofVerified
                } else {
                    AuditEventType::ProofRejected
                },
                &challenge.challenger,
            )
            .with_agent_did(agent_did)
            .with_details(report.error.clone().unwrap_or_else(|| {
                format!("level={:?}", challenge.verification_level)
            })),
        );
        Ok(report)
    }

    fn crypto_tier(
        &self,
        agent_did: &str,
        chain: &[IdentityRecord],
        signature_valid: Option<bool>,
    ) -> Result<CryptoVerification> {
        let verification = ChainEngine::verify_chain(chain);
        let not_revoked = !self.store.is_revoked(agent_did)?;
        let passed = verification.valid && not_revoked && signature_valid.unwrap_or(true);

        Ok(CryptoVerification {
            chain_valid: verification.valid,
            not_revoked,
            signature_valid,
            fault: verification.fault.map(|f| f.to_string()),
            passed,
        })
    }

    /// Run bound and full tiers after crypto, assembling the report.
    ///
    /// `challenge_context` is present only on the challenge-based path;
    /// `crypto_error` carries the proof-verification failure, if any.
    fn run_remaining_tiers(
        &self,
        agent_did: &str,
        level: VerificationLevel,
        chain: Vec<IdentityRecord>,
        crypto: CryptoVerification,
        challenge_context: Option<(&ContinuityChallenge, &ContinuityProof)>,
        crypto_error: Option<String>,
    ) -> Result<VerificationReport> {
        let mut report = VerificationReport {
            agent_did: agent_did.to_string(),
            requested_level: level,
            chain_length: chain.len(),
            crypto,
            bound: None,
            behavioral: None,
            verified: false,
            error: None,
        };

        if !report.crypto.passed {
            report.error = Some(crypto_error.unwrap_or_else(|| {
                format!(
                    "cryptographic verification failed: chain_valid={}, not_revoked={}",
                    report.crypto.chain_valid, report.crypto.not_revoked
                )
            }));
            debug!(agent_did, error = ?report.error, "crypto tier failed");
            return Ok(report);
        }

        if level == VerificationLevel::Crypto {
            report.verified = true;
            return Ok(report);
        }

        // Bound tier: the latest SEED document must hash to the latest
        // on-chain commitment.
        let seed = self.store.load_latest_seed(agent_did)?;
        let commitment = latest_seed_commitment(&chain);
        let bound = match (&seed, commitment) {
            (Some(seed), Some(commitment)) => {
                let matches = seed.hash()? == commitment.seed_hash;
                BoundVerification {
                    commitment_found: true,
                    seed_hash_matches: matches,
                    passed: matches,
                }
            }
            (_, commitment) => BoundVerification {
                commitment_found: commitment.is_some(),
                seed_hash_matches: false,
                passed: false,
            },
        };
        report.bound = Some(bound);

        if !bound.passed {
            report.error = Some(match (&seed, bound.commitment_found) {
                (None, _) => "bound verification failed: no SEED document on file".to_string(),
                (_, false) => "bound verification failed: no SEED commitment in chain".to_string(),
                _ => "bound verification failed: SEED hash does not match commitment".to_string(),
            });
            debug!(agent_did, error = ?report.error, "bound tier failed");
            return Ok(report);
        }
        let seed = match seed {
            Some(seed) => seed,
            // bound tier cannot pass without a loaded document
            None => return Ok(report),
        };

        if level == VerificationLevel::Bound {
            report.verified = true;
            return Ok(report);
        }

        // Full tier: needs an interactive challenge with a behavioral probe,
        // a response, and a matching reference answer inside the SEED.
        let (challenge, proof) = match challenge_context {
            Some(pair) => pair,
            None => {
                report.error = Some(
                    "behavioral verification requires an interactive challenge".to_string(),
                );
                return Ok(report);
            }
        };
        let prompt = match &challenge.behavioral_prompt {
            Some(prompt) => prompt,
            None => {
                report.error =
                    Some("behavioral verification failed: challenge carries no prompt".to_string());
                return Ok(report);
            }
        };
        let response = match &proof.behavioral_response {
            Some(response) => response,
            None => {
                report.error =
                    Some("behavioral verification failed: proof carries no response".to_string());
                return Ok(report);
            }
        };
        let reference = match seed.reference_answer(&prompt.prompt_id) {
            Some(reference) => reference,
            None => {
                report.error = Some(format!(
                    "behavioral verification failed: no reference answer for prompt {}",
                    prompt.prompt_id
                ));
                return Ok(report);
            }
        };

        let score = self.divergence.divergence(reference, response)?;
        let passed = score < self.config.divergence_threshold;
        report.behavioral = Some(BehavioralVerification {
            prompt_id: prompt.prompt_id.clone(),
            divergence_score: score,
            threshold: self.config.divergence_threshold,
            passed,
        });

        if !passed {
            report.error = Some(format!(
                "behavioral verification failed: divergence {score} >= threshold {}",
                self.config.divergence_threshold
            ));
            debug!(agent_did, score, "full tier failed");
            return Ok(report);
        }

        report.verified = true;
        Ok(report)
    }
}
