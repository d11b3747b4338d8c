//! Identity record types - the links of an agent's identity chain.
//!
//! A chain is `[Genesis, r1, r2, ...]` where every chained record carries
//! `previousRecordHash = hash(predecessor)` and a 1-based `sequenceNumber`
//! equal to its index. Two record types are terminal (`Revocation`,
//! `SelfTermination`): once one exists, the identity is dead and nothing may
//! be appended.
//!
//! Signature rules differ per variant (a revocation is signed by the
//! *delegator*, not the agent); the exception lives in one table
//! ([`RecordKind::requires_agent_signature`]) instead of being scattered
//! through verification logic.

use crate::canonical;
use crate::delegation::GenesisDelegate;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminant for [`IdentityRecord`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Genesis,
    Commitment,
    Session,
    SeedCommitment,
    Revocation,
    SelfTermination,
}

impl RecordKind {
    /// Whether records of this kind carry an agent signature.
    ///
    /// This is the single source of truth for the per-variant signature
    /// rule: `Genesis` is covered by the acknowledgment signature and
    /// `Revocation` is signed by the delegator wallet instead.
    pub fn requires_agent_signature(self) -> bool {
        match self {
            Self::Genesis | Self::Revocation => false,
            Self::Commitment | Self::Session | Self::SeedCommitment | Self::SelfTermination => true,
        }
    }

    /// Whether this kind participates in hash/sequence linkage.
    ///
    /// Revocations are written by the delegator without access to the live
    /// chain head, so they are not chained by `previousRecordHash`.
    pub fn is_chained(self) -> bool {
        !matches!(self, Self::Genesis | Self::Revocation)
    }

    /// Whether a record of this kind ends the identity.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Revocation | Self::SelfTermination)
    }

    /// The name of the signature field on the wire.
    pub fn signature_field(self) -> &'static str {
        match self {
            Self::Genesis => "agentAcknowledgment",
            Self::Revocation => "delegatorSignature",
            _ => "agentSignature",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Genesis => "genesis",
            Self::Commitment => "commitment",
            Self::Session => "session",
            Self::SeedCommitment => "seed_commitment",
            Self::Revocation => "revocation",
            Self::SelfTermination => "self_termination",
        };
        f.write_str(name)
    }
}

/// Record 0 of every chain: the delegation plus the agent's acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisRecord {
    pub delegation: GenesisDelegate,
    /// The derived agent public key (base58).
    pub agent_pubkey: String,
    pub agent_did: String,
    /// Agent signature over `hash(delegation)` - proof the derived key
    /// accepted this delegation.
    pub agent_acknowledgment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_ref: Option<String>,
}

/// The action being committed to in a [`CommitmentRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentBody {
    pub action: String,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_hash: Option<String>,
}

/// A signed commitment to an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentRecord {
    pub agent_did: String,
    pub previous_record_hash: String,
    pub sequence_number: u64,
    pub commitment: CommitmentBody,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_ref: Option<String>,
    pub agent_signature: String,
}

/// Session metadata for a [`SessionRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBody {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub context: String,
    pub environment: String,
}

/// Marks the start of a work session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub agent_did: String,
    pub previous_record_hash: String,
    pub sequence_number: u64,
    pub session: SessionBody,
    pub agent_signature: String,
}

/// Binds a SEED document hash into the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedCommitmentRecord {
    pub agent_did: String,
    pub previous_record_hash: String,
    pub sequence_number: u64,
    pub seed_hash: String,
    pub seed_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence_score: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub agent_signature: String,
}

/// Terminal record written by the *delegator*: kills the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationRecord {
    pub agent_did: String,
    pub delegator_did: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Wallet signature over the record's signing hash (no context prefix).
    pub delegator_signature: String,
}

/// Terminal record written by the agent itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfTerminationRecord {
    pub agent_did: String,
    pub previous_record_hash: String,
    pub sequence_number: u64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub agent_signature: String,
}

/// One record in an identity chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentityRecord {
    Genesis(GenesisRecord),
    Commitment(CommitmentRecord),
    Session(SessionRecord),
    SeedCommitment(SeedCommitmentRecord),
    Revocation(RevocationRecord),
    SelfTermination(SelfTerminationRecord),
}

impl IdentityRecord {
    /// The record's kind discriminant.
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Genesis(_) => RecordKind::Genesis,
            Self::Commitment(_) => RecordKind::Commitment,
            Self::Session(_) => RecordKind::Session,
            Self::SeedCommitment(_) => RecordKind::SeedCommitment,
            Self::Revocation(_) => RecordKind::Revocation,
            Self::SelfTermination(_) => RecordKind::SelfTermination,
        }
    }

    /// The agent DID this record belongs to.
    pub fn agent_did(&self) -> &str {
        match self {
            Self::Genesis(r) => &r.agent_did,
            Self::Commitment(r) => &r.agent_did,
            Self::Session(r) => &r.agent_did,
            Self::SeedCommitment(r) => &r.agent_did,
            Self::Revocation(r) => &r.agent_did,
            Self::SelfTermination(r) => &r.agent_did,
        }
    }

    /// `sequenceNumber` for chained records, `None` otherwise.
    pub fn sequence_number(&self) -> Option<u64> {
        match self {
            Self::Commitment(r) => Some(r.sequence_number),
            Self::Session(r) => Some(r.sequence_number),
            Self::SeedCommitment(r) => Some(r.sequence_number),
            Self::SelfTermination(r) => Some(r.sequence_number),
            Self::Genesis(_) | Self::Revocation(_) => None,
        }
    }

    /// `previousRecordHash` for chained records, `None` otherwise.
    pub fn previous_record_hash(&self) -> Option<&str> {
        match self {
            Self::Commitment(r) => Some(&r.previous_record_hash),
            Self::Session(r) => Some(&r.previous_record_hash),
            Self::SeedCommitment(r) => Some(&r.previous_record_hash),
            Self::SelfTermination(r) => Some(&r.previous_record_hash),
            Self::Genesis(_) | Self::Revocation(_) => None,
        }
    }

    /// The signature string carried by this record (agent or delegator).
    pub fn signature(&self) -> &str {
        match self {
            Self::Genesis(r) => &r.agent_acknowledgment,
            Self::Commitment(r) => &r.agent_signature,
            Self::Session(r) => &r.agent_signature,
            Self::SeedCommitment(r) => &r.agent_signature,
            Self::Revocation(r) => &r.delegator_signature,
            Self::SelfTermination(r) => &r.agent_signature,
        }
    }

    /// Whether this record ends the identity.
    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    /// Canonical hash of the complete record (used for chain linkage).
    pub fn record_hash(&self) -> Result<String> {
        canonical::hash_value(self)
    }

    /// Canonical hash of the record without its signature field (the signed
    /// message).
    pub fn signing_hash(&self) -> Result<String> {
        canonical::hash_without_field(self, self.kind().signature_field())
    }
}
