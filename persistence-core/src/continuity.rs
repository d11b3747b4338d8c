//! Challenge-response continuity protocol.
//!
//! A verifier issues a [`ContinuityChallenge`] carrying a fresh nonce; the
//! agent answers with a [`ContinuityProof`] that signs the nonce, attests the
//! current chain head, and optionally extends the chain with a commitment
//! record tagged as a continuity proof. A challenge older than the freshness
//! window is rejected regardless of signature validity.
//!
//! The issuing role keeps active challenges in an in-memory
//! [`ChallengeRegistry`] keyed by `(challenger, agentDid, nonce)`. Expired
//! entries are swept opportunistically on each issue/take call; there is no
//! background task. Single-process only - multi-instance deployments need an
//! external store behind the same interface.

use crate::canonical;
use crate::error::{Error, Result};
use crate::record::IdentityRecord;
use crate::DEFAULT_CHALLENGE_WINDOW_SECS;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// What the challenger demands of the proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredProof {
    /// Sign the challenge nonce.
    pub sign_nonce: bool,
    /// Attest the current chain-head hash.
    pub prove_chain_head: bool,
    /// Append a continuity-proof commitment record to the chain.
    pub extend_chain: bool,
}

impl Default for RequiredProof {
    fn default() -> Self {
        Self {
            sign_nonce: true,
            prove_chain_head: true,
            extend_chain: false,
        }
    }
}

/// Verification tier requested by a challenger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    /// Chain integrity + signatures + revocation status.
    Crypto,
    /// Crypto plus SEED hash binding.
    Bound,
    /// Bound plus a live behavioral sample under the divergence threshold.
    Full,
}

/// A behavioral probe attached to a full-tier challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralPrompt {
    /// Must match a reference answer's prompt id in the agent's SEED.
    pub prompt_id: String,
    pub text: String,
}

/// A liveness challenge issued to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuityChallenge {
    pub challenger: String,
    pub agent_did: String,
    /// 32 random bytes, hex-encoded.
    pub nonce: String,
    pub timestamp: DateTime<Utc>,
    pub required_proof: RequiredProof,
    pub verification_level: VerificationLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavioral_prompt: Option<BehavioralPrompt>,
}

impl ContinuityChallenge {
    /// Canonical hash of this challenge (what the proof binds to).
    pub fn hash(&self) -> Result<String> {
        canonical::hash_value(self)
    }

    /// Whether the challenge is older than `window` at time `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now > self.timestamp + window
    }
}

/// The agent's answer to a continuity challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuityProof {
    /// Hash of the challenge being answered.
    pub challenge_hash: String,
    /// Agent signature over the nonce.
    pub nonce_signature: String,
    /// Hash of the chain head at proof time (before any extension).
    pub chain_head_hash: String,
    /// Continuity-proof record appended when the challenge demanded
    /// `extendChain`; links to `chainHeadHash`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_record: Option<IdentityRecord>,
    /// Agent signature over the proof body (everything but this field).
    pub agent_signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavioral_response: Option<String>,
}

impl ContinuityProof {
    /// Canonical hash of the proof without its own signature.
    pub fn signing_hash(&self) -> Result<String> {
        canonical::hash_without_field(self, "agentSignature")
    }
}

/// Generate a fresh challenge nonce: 32 random bytes, hex-encoded.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

type ChallengeKey = (String, String, String);

/// In-memory registry of outstanding challenges for the issuing role.
///
/// Challenges are single-use: [`take`] removes the entry whether or not the
/// proof later verifies. Expiry is judged against each challenge's own
/// timestamp; the sweep only bounds memory.
///
/// [`take`]: ChallengeRegistry::take
#[derive(Debug)]
pub struct ChallengeRegistry {
    window: Duration,
    active: HashMap<ChallengeKey, ContinuityChallenge>,
}

impl Default for ChallengeRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CHALLENGE_WINDOW_SECS)
    }
}

impl ChallengeRegistry {
    /// Create a registry with the given freshness window in seconds.
    pub fn new(window_secs: i64) -> Self {
        Self {
            window: Duration::seconds(window_secs),
            active: HashMap::new(),
        }
    }

    /// The configured freshness window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of live (unexpired, untaken) challenges.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Issue and register a new challenge.
    pub fn issue(
        &mut self,
        challenger: impl Into<String>,
        agent_did: impl Into<String>,
        level: VerificationLevel,
        required_proof: RequiredProof,
        behavioral_prompt: Option<BehavioralPrompt>,
    ) -> ContinuityChallenge {
        self.sweep();

        let challenge = ContinuityChallenge {
            challenger: challenger.into(),
            agent_did: agent_did.into(),
            nonce: generate_nonce(),
            timestamp: Utc::now(),
            required_proof,
            verification_level: level,
            behavioral_prompt,
        };

        crate::audit::log_event(
            crate::audit::AuditEvent::new(
                crate::audit::AuditEventType::ChallengeIssued,
                &challenge.challenger,
            )
            .with_agent_did(&challenge.agent_did)
            .with_details(format!(
                "level={:?}, extend_chain={}",
                challenge.verification_level, challenge.required_proof.extend_chain
            )),
        );

        self.active.insert(
            (
                challenge.challenger.clone(),
                challenge.agent_did.clone(),
                challenge.nonce.clone(),
            ),
            challenge.clone(),
        );
        challenge
    }

    /// Remove and return the challenge matching the key.
    ///
    /// Returns `ChallengeExpired` for a known-but-stale challenge and
    /// `ChallengeNotFound` otherwise (including already-taken nonces, which
    /// is what makes challenges single-use).
    pub fn take(&mut self, challenger: &str, agent_did: &str, nonce: &str) -> Result<ContinuityChallenge> {
        self.sweep();

        let key = (
            challenger.to_string(),
            agent_did.to_string(),
            nonce.to_string(),
        );
        let challenge = self
            .active
            .remove(&key)
            .ok_or_else(|| Error::ChallengeNotFound(format!("{challenger}/{agent_did}/{nonce}")))?;

        if challenge.is_expired_at(Utc::now(), self.window) {
            return Err(Error::ChallengeExpired {
                issued_at: challenge.timestamp,
                window_secs: self.window.num_seconds(),
            });
        }
        Ok(challenge)
    }

    /// Drop expired challenges. Called from every entry point.
    pub fn sweep(&mut self) {
        let now = Utc::now();
        let window = self.window;
        let before = self.active.len();
        self.active
            .retain(|_, challenge| !challenge.is_expired_at(now, window));
        let removed = before - self.active.len();
        if removed > 0 {
            debug!(removed, remaining = self.active.len(), "swept expired challenges");
        }
    }
}
