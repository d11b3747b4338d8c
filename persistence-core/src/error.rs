//! Error types for the persistence identity core.
//!
//! Verification failures are *values*, not panics: every verification path
//! returns the specific reason it failed so callers can decide user-visible
//! behavior. The only hard failure class is programmer misuse
//! (`EngineNotInitialized`).

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for persistence-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed reason a chain failed verification.
///
/// Indices are positions in the chain (0 = genesis). Verification walks the
/// chain in order and reports the first violated invariant, so a fault at
/// index `i` says nothing about records after `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFault {
    /// The chain has no records at all.
    EmptyChain,
    /// Record 0 is not a genesis record.
    MissingGenesis,
    /// A genesis record appeared after record 0.
    MisplacedGenesis(usize),
    /// The genesis acknowledgment does not verify against the agent key.
    InvalidGenesisAcknowledgment,
    /// `previousRecordHash` at this index does not match the predecessor.
    ChainBreak(usize),
    /// `sequenceNumber` at this index does not equal the index.
    SequenceMismatch(usize),
    /// The agent signature at this index does not verify.
    InvalidSignature(usize),
    /// A revocation's delegator signature does not verify against the
    /// delegator wallet key from the genesis delegation.
    InvalidDelegatorSignature(usize),
    /// A record appears after a terminal (revocation/self-termination) record.
    RecordAfterTerminal(usize),
}

impl std::fmt::Display for ChainFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyChain => write!(f, "chain is empty"),
            Self::MissingGenesis => write!(f, "record 0 is not a genesis record"),
            Self::MisplacedGenesis(i) => write!(f, "genesis record at index {i}"),
            Self::InvalidGenesisAcknowledgment => {
                write!(f, "genesis acknowledgment signature invalid")
            }
            Self::ChainBreak(i) => write!(f, "previous-record hash mismatch at index {i}"),
            Self::SequenceMismatch(i) => write!(f, "sequence number mismatch at index {i}"),
            Self::InvalidSignature(i) => write!(f, "agent signature invalid at index {i}"),
            Self::InvalidDelegatorSignature(i) => {
                write!(f, "delegator signature invalid at index {i}")
            }
            Self::RecordAfterTerminal(i) => {
                write!(f, "record at index {i} follows a terminal record")
            }
        }
    }
}

/// Canonical error codes.
///
/// All persistence-core errors map to these codes. Protocol-specific
/// representations (HTTP statuses, JSON-RPC codes) are derived by callers.
///
/// Code ranges:
/// - 1000-1099: Key derivation errors
/// - 1100-1199: Signature / crypto errors
/// - 1200-1299: Record structure / serialization errors
/// - 1300-1399: Challenge / temporal errors
/// - 1400-1499: Chain validation errors
/// - 1500-1599: Identity lifecycle errors
/// - 1600-1699: SEED binding errors
/// - 1700-1799: Collaborator errors
/// - 1800-1899: API misuse errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Key derivation (1000-1099)
    KeyDerivationFailed = 1000,

    // Signature / crypto (1100-1199)
    SignatureInvalid = 1100,
    CryptoFailure = 1101,

    // Record structure (1200-1299)
    MalformedRecord = 1200,
    RecordTooLarge = 1201,
    MissingRequiredField = 1202,

    // Challenge / temporal (1300-1399)
    ChallengeExpired = 1300,
    ChallengeNotFound = 1301,
    NonceMismatch = 1302,
    ChainHeadMismatch = 1303,

    // Chain validation (1400-1499)
    ChainBroken = 1400,
    SequenceMismatch = 1401,
    GenesisInvalid = 1402,
    DelegatorSignatureInvalid = 1403,

    // Identity lifecycle (1500-1599)
    IdentityRevoked = 1500,
    IdentityTerminated = 1501,

    // SEED binding (1600-1699)
    SeedHashMismatch = 1600,
    DivergenceTooHigh = 1601,
    DivergenceScoreRequired = 1602,
    StageNotFound = 1603,

    // Collaborators (1700-1799)
    StorageFailure = 1700,

    // API misuse (1800-1899)
    EngineNotInitialized = 1800,
}

impl ErrorCode {
    /// Get the numeric code value.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Get the machine-readable name (kebab-case).
    pub fn name(self) -> &'static str {
        match self {
            Self::KeyDerivationFailed => "key-derivation-failed",
            Self::SignatureInvalid => "signature-invalid",
            Self::CryptoFailure => "crypto-failure",
            Self::MalformedRecord => "malformed-record",
            Self::RecordTooLarge => "record-too-large",
            Self::MissingRequiredField => "missing-required-field",
            Self::ChallengeExpired => "challenge-expired",
            Self::ChallengeNotFound => "challenge-not-found",
            Self::NonceMismatch => "nonce-mismatch",
            Self::ChainHeadMismatch => "chain-head-mismatch",
            Self::ChainBroken => "chain-broken",
            Self::SequenceMismatch => "sequence-mismatch",
            Self::GenesisInvalid => "genesis-invalid",
            Self::DelegatorSignatureInvalid => "delegator-signature-invalid",
            Self::IdentityRevoked => "identity-revoked",
            Self::IdentityTerminated => "identity-terminated",
            Self::SeedHashMismatch => "seed-hash-mismatch",
            Self::DivergenceTooHigh => "divergence-too-high",
            Self::DivergenceScoreRequired => "divergence-score-required",
            Self::StageNotFound => "stage-not-found",
            Self::StorageFailure => "storage-failure",
            Self::EngineNotInitialized => "engine-not-initialized",
        }
    }

    /// Get a human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::KeyDerivationFailed => "Agent keypair derivation failed",
            Self::SignatureInvalid => "Signature verification failed",
            Self::CryptoFailure => "Cryptographic operation failed",
            Self::MalformedRecord => "Record structure is invalid",
            Self::RecordTooLarge => "Record size exceeds limit",
            Self::MissingRequiredField => "Required field is missing",
            Self::ChallengeExpired => "Continuity challenge has expired",
            Self::ChallengeNotFound => "Continuity challenge not found",
            Self::NonceMismatch => "Proof does not match the challenge",
            Self::ChainHeadMismatch => "Attested chain head does not match",
            Self::ChainBroken => "Identity chain verification failed",
            Self::SequenceMismatch => "Record sequence number is wrong",
            Self::GenesisInvalid => "Genesis record is invalid",
            Self::DelegatorSignatureInvalid => "Delegator signature is invalid",
            Self::IdentityRevoked => "Identity has been revoked",
            Self::IdentityTerminated => "Identity chain carries a terminal record",
            Self::SeedHashMismatch => "SEED hash does not match the committed hash",
            Self::DivergenceTooHigh => "Behavioral divergence exceeds the threshold",
            Self::DivergenceScoreRequired => "A divergence score is required to commit",
            Self::StageNotFound => "Staged SEED not found",
            Self::StorageFailure => "Storage collaborator failed",
            Self::EngineNotInitialized => "Chain engine has no identity loaded",
        }
    }
}

/// Errors that can occur in persistence-core operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Agent keypair derivation failed (malformed delegator signature encoding).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// A signature did not verify.
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    /// Cryptographic operation failed (bad key bytes, bad encoding).
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// Chain verification failed with a typed fault.
    #[error("chain invalid: {0}")]
    ChainInvalid(ChainFault),

    /// The identity has a revocation on file.
    #[error("identity revoked: {0}")]
    Revoked(String),

    /// The chain already carries a terminal record; no appends allowed.
    #[error("identity terminated: {0}")]
    IdentityTerminated(String),

    /// The challenge is older than the freshness window.
    #[error("challenge expired (issued {issued_at}, window {window_secs}s)")]
    ChallengeExpired {
        issued_at: DateTime<Utc>,
        window_secs: i64,
    },

    /// No active challenge matches the given key.
    #[error("challenge not found: {0}")]
    ChallengeNotFound(String),

    /// The proof does not correspond to the challenge (hash or nonce).
    #[error("nonce mismatch: {0}")]
    NonceMismatch(String),

    /// The attested chain head does not match the verified chain.
    #[error("chain head mismatch: expected {expected}, got {actual}")]
    ChainHeadMismatch { expected: String, actual: String },

    /// The SEED document hash differs from the committed hash.
    #[error("seed hash mismatch: committed {committed}, computed {computed}")]
    SeedHashMismatch { committed: String, computed: String },

    /// The divergence score exceeds the configured commit ceiling.
    #[error("divergence {score} exceeds maximum {max}")]
    DivergenceTooHigh { score: f64, max: f64 },

    /// Configuration requires a divergence score and none was supplied.
    #[error("divergence score required to commit this seed")]
    DivergenceScoreRequired,

    /// No staged SEED with the given id.
    #[error("staged seed not found: {0}")]
    StageNotFound(String),

    /// Storage collaborator failure, opaque to the core.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Operation requires an initialized engine (programmer misuse).
    #[error("chain engine not initialized: {0} requires a loaded identity")]
    EngineNotInitialized(&'static str),

    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Encoded record exceeds the wire size limit.
    #[error("record size {size} bytes exceeds maximum {max} bytes")]
    RecordTooLarge { size: usize, max: usize },

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Error::Deserialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for Error {
    fn from(e: ed25519_dalek::SignatureError) -> Self {
        Error::Crypto(e.to_string())
    }
}

impl Error {
    /// Map this error to a canonical error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::KeyDerivation(_) => ErrorCode::KeyDerivationFailed,
            Self::SignatureInvalid(_) => ErrorCode::SignatureInvalid,
            Self::Crypto(_) => ErrorCode::CryptoFailure,
            Self::ChainInvalid(fault) => match fault {
                ChainFault::ChainBreak(_) => ErrorCode::ChainBroken,
                ChainFault::SequenceMismatch(_) => ErrorCode::SequenceMismatch,
                ChainFault::InvalidSignature(_) => ErrorCode::SignatureInvalid,
                ChainFault::InvalidDelegatorSignature(_) => ErrorCode::DelegatorSignatureInvalid,
                ChainFault::RecordAfterTerminal(_) => ErrorCode::IdentityTerminated,
                ChainFault::EmptyChain
                | ChainFault::MissingGenesis
                | ChainFault::MisplacedGenesis(_)
                | ChainFault::InvalidGenesisAcknowledgment => ErrorCode::GenesisInvalid,
            },
            Self::Revoked(_) => ErrorCode::IdentityRevoked,
            Self::IdentityTerminated(_) => ErrorCode::IdentityTerminated,
            Self::ChallengeExpired { .. } => ErrorCode::ChallengeExpired,
            Self::ChallengeNotFound(_) => ErrorCode::ChallengeNotFound,
            Self::NonceMismatch(_) => ErrorCode::NonceMismatch,
            Self::ChainHeadMismatch { .. } => ErrorCode::ChainHeadMismatch,
            Self::SeedHashMismatch { .. } => ErrorCode::SeedHashMismatch,
            Self::DivergenceTooHigh { .. } => ErrorCode::DivergenceTooHigh,
            Self::DivergenceScoreRequired => ErrorCode::DivergenceScoreRequired,
            Self::StageNotFound(_) => ErrorCode::StageNotFound,
            Self::Storage(_) => ErrorCode::StorageFailure,
            Self::EngineNotInitialized(_) => ErrorCode::EngineNotInitialized,
            Self::Serialization(_) | Self::Deserialization(_) => ErrorCode::MalformedRecord,
            Self::RecordTooLarge { .. } => ErrorCode::RecordTooLarge,
            Self::MissingField(_) => ErrorCode::MissingRequiredField,
        }
    }

    /// Get the machine-readable error name (kebab-case).
    pub fn name(&self) -> &'static str {
        self.code().name()
    }

    /// Get a human-readable description of the error class.
    pub fn description(&self) -> &'static str {
        self.code().description()
    }
}
