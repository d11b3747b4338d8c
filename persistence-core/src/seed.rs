//! SEED documents and their commitment lifecycle.
//!
//! A SEED is a versioned behavioral fingerprint: weighted reasoning
//! dimensions, probe prompts, and reference answers. Committing a SEED binds
//! its canonical hash into the identity chain as a `SeedCommitment` record,
//! so behavioral identity and cryptographic identity cannot drift apart
//! undetected.
//!
//! The manager supports direct commits and a two-phase stage/commit flow for
//! workflows that compute a SEED before deciding to publish it. Staged
//! entries live in an in-process map and are swept by TTL at entry points;
//! multi-instance deployments need an external store instead.

use crate::audit::{log_event, AuditEvent, AuditEventType};
use crate::canonical;
use crate::chain::ChainEngine;
use crate::error::{Error, Result};
use crate::record::IdentityRecord;
use crate::store::IdentityStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::collections::HashMap;
use tracing::debug;

/// How long a staged SEED survives before being swept.
const STAGE_TTL_SECS: i64 = 3600;

/// A weighted reasoning dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedWeight {
    pub id: String,
    /// Weight in [0, 1].
    pub value: f64,
}

/// A probe prompt the agent can be challenged with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedPrompt {
    pub id: String,
    pub text: String,
}

/// The agent's reference answer for one probe prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReference {
    pub prompt_id: String,
    pub answer: String,
}

/// A versioned behavioral fingerprint document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedDocument {
    pub version: String,
    /// Top-level identity descriptor ("who this agent is", prose).
    pub identity: String,
    pub weights: Vec<SeedWeight>,
    pub prompts: Vec<SeedPrompt>,
    pub references: Vec<SeedReference>,
}

impl SeedDocument {
    /// Canonical hash of this document (what gets committed on-chain).
    pub fn hash(&self) -> Result<String> {
        canonical::hash_value(self)
    }

    /// The reference answer for a prompt id, if present.
    pub fn reference_answer(&self, prompt_id: &str) -> Option<&str> {
        self.references
            .iter()
            .find(|r| r.prompt_id == prompt_id)
            .map(|r| r.answer.as_str())
    }
}

/// Structural difference between two SEED versions.
///
/// Informational (audit/summary); commit gating is done by divergence score,
/// not by delta size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionDelta {
    pub weights_changed: usize,
    pub prompts_changed: usize,
    pub references_changed: usize,
    pub identity_changed: bool,
    pub summary: String,
}

/// Symmetric-difference cardinality over id sets, plus identity inequality.
pub fn calculate_evolution_delta(old: &SeedDocument, new: &SeedDocument) -> EvolutionDelta {
    let weights_changed = symmetric_difference(
        old.weights.iter().map(|w| w.id.as_str()),
        new.weights.iter().map(|w| w.id.as_str()),
    );
    let prompts_changed = symmetric_difference(
        old.prompts.iter().map(|p| p.id.as_str()),
        new.prompts.iter().map(|p| p.id.as_str()),
    );
    let references_changed = symmetric_difference(
        old.references.iter().map(|r| r.prompt_id.as_str()),
        new.references.iter().map(|r| r.prompt_id.as_str()),
    );
    let identity_changed = old.identity != new.identity;

    let summary = format!(
        "{} -> {}: {} weight(s), {} prompt(s), {} reference(s) changed{}",
        old.version,
        new.version,
        weights_changed,
        prompts_changed,
        references_changed,
        if identity_changed {
            ", identity descriptor rewritten"
        } else {
            ""
        }
    );

    EvolutionDelta {
        weights_changed,
        prompts_changed,
        references_changed,
        identity_changed,
        summary,
    }
}

fn symmetric_difference<'a>(
    old: impl Iterator<Item = &'a str>,
    new: impl Iterator<Item = &'a str>,
) -> usize {
    let old: BTreeSet<&str> = old.collect();
    let new: BTreeSet<&str> = new.collect();
    old.symmetric_difference(&new).count()
}

/// Result of checking a SEED document against the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedBinding {
    /// Bound iff a commitment exists and its hash matches.
    pub bound: bool,
    pub commitment_found: bool,
    pub hash_matches: bool,
}

/// Configuration for the commitment manager.
#[derive(Debug, Clone, Copy)]
pub struct SeedManagerConfig {
    /// Refuse commits that carry no divergence score.
    pub require_divergence_score: bool,
    /// Refuse commits whose divergence exceeds this ceiling.
    pub max_divergence_for_commit: f64,
    /// Commit automatically after a passing behavioral test.
    pub auto_commit_on_test: bool,
}

impl Default for SeedManagerConfig {
    fn default() -> Self {
        Self {
            require_divergence_score: false,
            max_divergence_for_commit: crate::DEFAULT_DIVERGENCE_THRESHOLD,
            auto_commit_on_test: false,
        }
    }
}

#[derive(Debug, Clone)]
struct StagedSeed {
    seed: SeedDocument,
    staged_at: DateTime<Utc>,
}

/// Binds SEED documents into an identity chain.
pub struct SeedCommitmentManager<S: IdentityStore> {
    config: SeedManagerConfig,
    store: S,
    staged: HashMap<String, StagedSeed>,
}

impl<S: IdentityStore> SeedCommitmentManager<S> {
    pub fn new(store: S, config: SeedManagerConfig) -> Self {
        Self {
            config,
            store,
            staged: HashMap::new(),
        }
    }

    /// The manager's configuration.
    pub fn config(&self) -> &SeedManagerConfig {
        &self.config
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of live staged entries.
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Persist a SEED, bind its hash into the chain, and persist the record.
    ///
    /// Rejects when configuration demands a divergence score and none is
    /// given, or when the score exceeds the commit ceiling.
    pub fn commit_seed(
        &mut self,
        engine: &mut ChainEngine,
        seed: &SeedDocument,
        divergence_score: Option<f64>,
    ) -> Result<IdentityRecord> {
        if self.config.require_divergence_score && divergence_score.is_none() {
            return Err(Error::DivergenceScoreRequired);
        }
        if let Some(score) = divergence_score {
            if score > self.config.max_divergence_for_commit {
                return Err(Error::DivergenceTooHigh {
                    score,
                    max: self.config.max_divergence_for_commit,
                });
            }
        }

        let agent_did = engine
            .did()
            .ok_or(Error::EngineNotInitialized("commit_seed"))?
            .to_string();

        let receipt = self.store.store_seed(&agent_did, seed)?;
        let seed_hash = seed.hash()?;

        let record = engine.add_seed_commitment(
            seed_hash.clone(),
            seed.version.clone(),
            Some(receipt.reference),
            divergence_score,
        )?;
        self.store.store_record(&agent_did, &record)?;

        log_event(
            AuditEvent::new(AuditEventType::SeedCommitted, "seed-manager")
                .with_agent_did(&agent_did)
                .with_details(format!("version {}", seed.version))
                .with_related(vec![seed_hash]),
        );

        Ok(record)
    }

    /// Stage a SEED for a later commit decision. Returns the stage id.
    pub fn stage_seed(&mut self, seed: &SeedDocument) -> Result<String> {
        self.sweep_stages();

        let nanos = Utc::now()
            .timestamp_nanos_opt()
            .ok_or_else(|| Error::Serialization("timestamp out of range".to_string()))?;
        let stage_id = format!("{}-{}", seed.version, nanos);

        self.staged.insert(
            stage_id.clone(),
            StagedSeed {
                seed: seed.clone(),
                staged_at: Utc::now(),
            },
        );
        debug!(%stage_id, "seed staged");
        Ok(stage_id)
    }

    /// Commit a previously staged SEED.
    ///
    /// The staged entry is cleared only on successful commit; a failed commit
    /// (e.g. divergence too high) leaves it staged for a retry.
    pub fn commit_staged(
        &mut self,
        engine: &mut ChainEngine,
        stage_id: &str,
        divergence_score: Option<f64>,
    ) -> Result<IdentityRecord> {
        self.sweep_stages();

        let seed = self
            .staged
            .get(stage_id)
            .map(|entry| entry.seed.clone())
            .ok_or_else(|| Error::StageNotFound(stage_id.to_string()))?;

        let record = self.commit_seed(engine, &seed, divergence_score)?;
        self.staged.remove(stage_id);
        Ok(record)
    }

    /// Check whether a SEED document is bound into the agent's chain.
    pub fn verify_seed_binding(&self, agent_did: &str, seed: &SeedDocument) -> Result<SeedBinding> {
        let chain = self.store.load_chain(agent_did)?;
        let computed = seed.hash()?;

        let latest = latest_seed_commitment(&chain);
        let commitment_found = latest.is_some();
        let hash_matches = latest.map(|r| r.seed_hash == computed).unwrap_or(false);

        Ok(SeedBinding {
            bound: commitment_found && hash_matches,
            commitment_found,
            hash_matches,
        })
    }

    /// Load the most recently committed SEED for an agent.
    ///
    /// Walks the chain backward for the latest `SeedCommitment`, loads the
    /// stored document, and checks the hash still matches the commitment.
    pub fn get_latest_committed_seed(&self, agent_did: &str) -> Result<Option<SeedDocument>> {
        let chain = self.store.load_chain(agent_did)?;
        let commitment = match latest_seed_commitment(&chain) {
            Some(record) => record.clone(),
            None => return Ok(None),
        };

        let seed = match self.store.load_latest_seed(agent_did)? {
            Some(seed) => seed,
            None => return Ok(None),
        };

        let computed = seed.hash()?;
        if computed != commitment.seed_hash {
            return Err(Error::SeedHashMismatch {
                committed: commitment.seed_hash,
                computed,
            });
        }
        Ok(Some(seed))
    }

    /// Drop staged entries older than the stage TTL.
    pub fn sweep_stages(&mut self) {
        let cutoff = Utc::now() - Duration::seconds(STAGE_TTL_SECS);
        let before = self.staged.len();
        self.staged.retain(|_, entry| entry.staged_at > cutoff);
        let removed = before - self.staged.len();
        if removed > 0 {
            debug!(removed, "swept stale staged seeds");
        }
    }
}

/// The most recent `SeedCommitment` record in a chain, if any.
pub fn latest_seed_commitment(
    chain: &[IdentityRecord],
) -> Option<&crate::record::SeedCommitmentRecord> {
    chain.iter().rev().find_map(|record| match record {
        IdentityRecord::SeedCommitment(r) => Some(r),
        _ => None,
    })
}

/// Build a small SEED document (test support).
#[cfg(test)]
pub(crate) fn test_seed(version: &str) -> SeedDocument {
    SeedDocument {
        version: version.to_string(),
        identity: "cautious research assistant".to_string(),
        weights: vec![
            SeedWeight {
                id: "curiosity".to_string(),
                value: 0.8,
            },
            SeedWeight {
                id: "precision".to_string(),
                value: 0.9,
            },
        ],
        prompts: vec![SeedPrompt {
            id: "p1".to_string(),
            text: "How do you verify a claim?".to_string(),
        }],
        references: vec![SeedReference {
            prompt_id: "p1".to_string(),
            answer: "Cross-check primary sources before answering.".to_string(),
        }],
    }
}
