//! Collaborator interfaces: durable storage and behavioral divergence.
//!
//! The core never talks to a ledger, a content-addressed network, or an
//! evaluation model directly - it goes through these two narrow traits, which
//! keeps the verification state machine a plain synchronous decision tree
//! that is unit-testable without network mocking. Implementations may block
//! or bridge to async runtimes as they see fit; failures surface as
//! `Error::Storage` and propagate.

use crate::error::{Error, Result};
use crate::record::IdentityRecord;
use crate::seed::SeedDocument;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Receipt for a stored SEED document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReceipt {
    /// Opaque reference to the stored document.
    pub reference: String,
    pub seed_hash: String,
}

/// Durable storage for identity chains and SEED documents.
pub trait IdentityStore {
    /// Append one record, returning an opaque reference.
    fn store_record(&self, agent_did: &str, record: &IdentityRecord) -> Result<String>;

    /// Load the full chain, ordered oldest to newest.
    fn load_chain(&self, agent_did: &str) -> Result<Vec<IdentityRecord>>;

    /// Persist a SEED document.
    fn store_seed(&self, agent_did: &str, seed: &SeedDocument) -> Result<SeedReceipt>;

    /// Load the most recently stored SEED, if any.
    fn load_latest_seed(&self, agent_did: &str) -> Result<Option<SeedDocument>>;

    /// Whether a revocation is on file for this agent.
    fn is_revoked(&self, agent_did: &str) -> Result<bool>;
}

/// Behavioral divergence evaluator.
///
/// Scores how far a live response deviates from the SEED's reference answer;
/// 0 is identical, 1 is unrelated.
pub trait DivergenceEvaluator {
    fn divergence(&self, reference: &str, response: &str) -> Result<f64>;
}

/// In-memory store for tests and single-process deployments.
///
/// Interior mutability so one instance can be shared by reference between
/// the seed manager and the verifier.
#[derive(Debug, Default)]
pub struct MemoryStore {
    chains: RwLock<HashMap<String, Vec<IdentityRecord>>>,
    seeds: RwLock<HashMap<String, Vec<SeedDocument>>>,
    revoked: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag an agent as revoked (out-of-band revocation registry).
    pub fn mark_revoked(&self, agent_did: &str) {
        if let Ok(mut revoked) = self.revoked.write() {
            revoked.insert(agent_did.to_string());
        }
    }
}

impl IdentityStore for MemoryStore {
    fn store_record(&self, agent_did: &str, record: &IdentityRecord) -> Result<String> {
        let mut chains = self
            .chains
            .write()
            .map_err(|_| Error::Storage("chain store lock poisoned".to_string()))?;
        let chain = chains.entry(agent_did.to_string()).or_default();
        chain.push(record.clone());

        // A stored terminal record doubles as the revocation flag.
        if record.is_terminal() {
            self.mark_revoked(agent_did);
        }
        Ok(format!("mem:{}:{}", agent_did, chain.len() - 1))
    }

    fn load_chain(&self, agent_did: &str) -> Result<Vec<IdentityRecord>> {
        let chains = self
            .chains
            .read()
            .map_err(|_| Error::Storage("chain store lock poisoned".to_string()))?;
        Ok(chains.get(agent_did).cloned().unwrap_or_default())
    }

    fn store_seed(&self, agent_did: &str, seed: &SeedDocument) -> Result<SeedReceipt> {
        let seed_hash = seed.hash()?;
        let mut seeds = self
            .seeds
            .write()
            .map_err(|_| Error::Storage("seed store lock poisoned".to_string()))?;
        let versions = seeds.entry(agent_did.to_string()).or_default();
        versions.push(seed.clone());
        Ok(SeedReceipt {
            reference: format!("mem:seed:{}:{}", agent_did, versions.len() - 1),
            seed_hash,
        })
    }

    fn load_latest_seed(&self, agent_did: &str) -> Result<Option<SeedDocument>> {
        let seeds = self
            .seeds
            .read()
            .map_err(|_| Error::Storage("seed store lock poisoned".to_string()))?;
        Ok(seeds.get(agent_did).and_then(|v| v.last().cloned()))
    }

    fn is_revoked(&self, agent_did: &str) -> Result<bool> {
        let revoked = self
            .revoked
            .read()
            .map_err(|_| Error::Storage("revocation set lock poisoned".to_string()))?;
        Ok(revoked.contains(agent_did))
    }
}

impl<T: IdentityStore + ?Sized> IdentityStore for &T {
    fn store_record(&self, agent_did: &str, record: &IdentityRecord) -> Result<String> {
        (**self).store_record(agent_did, record)
    }

    fn load_chain(&self, agent_did: &str) -> Result<Vec<IdentityRecord>> {
        (**self).load_chain(agent_did)
    }

    fn store_seed(&self, agent_did: &str, seed: &SeedDocument) -> Result<SeedReceipt> {
        (**self).store_seed(agent_did, seed)
    }

    fn load_latest_seed(&self, agent_did: &str) -> Result<Option<SeedDocument>> {
        (**self).load_latest_seed(agent_did)
    }

    fn is_revoked(&self, agent_did: &str) -> Result<bool> {
        (**self).is_revoked(agent_did)
    }
}

impl<T: DivergenceEvaluator + ?Sized> DivergenceEvaluator for &T {
    fn divergence(&self, reference: &str, response: &str) -> Result<f64> {
        (**self).divergence(reference, response)
    }
}

/// Naive evaluator: 0.0 for an exact match, 1.0 otherwise.
///
/// Stands in for a real scoring model in tests and smoke deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactMatchEvaluator;

impl DivergenceEvaluator for ExactMatchEvaluator {
    fn divergence(&self, reference: &str, response: &str) -> Result<f64> {
        Ok(if reference.trim() == response.trim() {
            0.0
        } else {
            1.0
        })
    }
}

/// Evaluator returning a fixed score, for exercising thresholds in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedDivergence(pub f64);

impl DivergenceEvaluator for FixedDivergence {
    fn divergence(&self, _reference: &str, _response: &str) -> Result<f64> {
        Ok(self.0)
    }
}
