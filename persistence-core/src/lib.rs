//! # Persistence Core
//!
//! Tamper-evident identity for autonomous agents - Rust core library.
//!
//! An agent's identity is a hash-chained, Ed25519-signed sequence of records
//! anchored to a one-time genesis delegation from a human or organizational
//! principal. A behavioral fingerprint (SEED) is bound into the same chain
//! via content-hash commitments, so cryptographic identity and behavioral
//! identity cannot drift apart undetected.
//!
//! ## Key Concepts
//!
//! - **Genesis delegation**: the founding document, signed by a principal's
//!   wallet; the agent keypair is *derived* from it (HKDF), so recovery
//!   needs no stored secret.
//! - **Identity chain**: append-only records (commitments, sessions, SEED
//!   commitments) linked by canonical hashes and sequence numbers, ended
//!   exactly once by a revocation or self-termination.
//! - **Continuity proof**: a signed answer to a fresh nonce challenge,
//!   attesting that the keyholder is alive and controls the chain head.
//! - **Three-tier verification**: crypto -> bound -> full-behavioral, each
//!   tier requiring the previous to pass.
//! - **Trust score**: a pure 0-100 composite over verification results and
//!   chain activity.
//!
//! ## Example
//!
//! ```rust,ignore
//! use persistence_core::{ChainEngine, SeedCommitmentManager, MemoryStore};
//!
//! let mut engine = ChainEngine::new();
//! engine.initialize_from_genesis(delegation)?;
//! engine.add_commitment("deploy", "release pipeline", None, None)?;
//!
//! let mut seeds = SeedCommitmentManager::new(store, Default::default());
//! seeds.commit_seed(&mut engine, &seed, Some(0.08))?;
//! ```

pub mod audit;
pub mod canonical;
pub mod chain;
pub mod continuity;
pub mod crypto;
pub mod delegation;
pub mod error;
pub mod record;
pub mod seed;
pub mod store;
pub mod trust;
pub mod verifier;
pub mod wire;

// Re-exports for convenience
pub use chain::{genesis_public_key, ChainEngine, ChainVerification};
pub use continuity::{
    BehavioralPrompt, ChallengeRegistry, ContinuityChallenge, ContinuityProof, RequiredProof,
    VerificationLevel,
};
pub use crypto::{PublicKey, Signature, SigningKey};
pub use delegation::{
    derive_keypair, did_for_key, AgentKeypair, AgentProfile, DelegatorInfo, GenesisBlockRef,
    GenesisDelegate,
};
pub use error::{ChainFault, Error, ErrorCode, Result};
pub use record::{IdentityRecord, RecordKind};
pub use seed::{
    calculate_evolution_delta, EvolutionDelta, SeedBinding, SeedCommitmentManager, SeedDocument,
    SeedManagerConfig,
};
pub use store::{DivergenceEvaluator, IdentityStore, MemoryStore, SeedReceipt};
pub use trust::{assess, chain_age_days, trust_score, SpamRisk, TrackRecord, TrustAssessment};
pub use verifier::{
    BehavioralVerification, BoundVerification, CombinedVerifier, CryptoVerification,
    VerificationReport, VerifierConfig,
};
pub use wire::MAX_RECORD_SIZE;

/// Context string for Ed25519 signatures (prevents cross-protocol attacks).
///
/// All agent signatures are computed over `SIGNATURE_CONTEXT || message`.
/// Delegator wallet signatures are the one exception: wallets sign raw.
pub const SIGNATURE_CONTEXT: &[u8] = b"persistence-identity-v1";

/// HKDF info string for agent keypair derivation.
pub const KEY_DERIVATION_INFO: &[u8] = b"persistence-agent-identity-v1";

/// DID method prefix for derived agent identities.
pub const DID_PREFIX: &str = "did:persistence:";

/// Default freshness window for continuity challenges, in seconds.
pub const DEFAULT_CHALLENGE_WINDOW_SECS: i64 = 300;

/// Default divergence threshold for full-tier behavioral verification.
pub const DEFAULT_DIVERGENCE_THRESHOLD: f64 = 0.35;
