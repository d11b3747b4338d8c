//! Audit logging infrastructure.
//!
//! Security-relevant lifecycle events (record appends, challenge issuance,
//! proof outcomes, SEED commits, revocations) are emitted through a global
//! [`AuditLogger`]. The default is a no-op; services install
//! [`StdoutLogger`] (JSON lines) or their own sink at startup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Types of identity lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    /// A record was appended to an identity chain
    RecordAppended,
    /// A continuity challenge was issued
    ChallengeIssued,
    /// A continuity proof verified successfully
    ProofVerified,
    /// A continuity proof was rejected
    ProofRejected,
    /// A SEED document was committed to the chain
    SeedCommitted,
    /// The identity was revoked or self-terminated
    IdentityRevoked,
    /// An identity was recovered from a stored chain
    IdentityRecovered,
}

/// An audit event for identity lifecycle operations.
///
/// Persist these to an audit log for compliance and forensic analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID (time-ordered)
    pub id: String,

    /// Event type
    pub event_type: AuditEventType,

    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// Who/what triggered this event
    pub actor: String,

    /// Agent DID involved (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_did: Option<String>,

    /// Additional context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Related identifiers (record hashes, nonces, stage ids)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_ids: Option<Vec<String>>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(event_type: AuditEventType, actor: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().simple().to_string(),
            event_type,
            timestamp: Utc::now(),
            actor: actor.into(),
            agent_did: None,
            details: None,
            related_ids: None,
        }
    }

    /// Attach the agent DID.
    pub fn with_agent_did(mut self, did: impl Into<String>) -> Self {
        self.agent_did = Some(did.into());
        self
    }

    /// Attach free-form details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attach related identifiers.
    pub fn with_related(mut self, ids: Vec<String>) -> Self {
        self.related_ids = Some(ids);
        self
    }
}

/// Trait for audit loggers.
pub trait AuditLogger: Send + Sync + std::fmt::Debug {
    /// Log an audit event.
    fn log(&self, event: AuditEvent);
}

/// A logger that writes events to stdout as JSON lines.
///
/// Suitable for containerized environments where logs are scraped by an
/// external agent.
#[derive(Debug, Default)]
pub struct StdoutLogger;

impl StdoutLogger {
    pub fn new() -> Self {
        Self
    }
}

impl AuditLogger for StdoutLogger {
    fn log(&self, event: AuditEvent) {
        if let Ok(json) = serde_json::to_string(&event) {
            println!("{}", json);
        } else {
            eprintln!("Failed to serialize audit event: {:?}", event);
        }
    }
}

/// A logger that does nothing (testing, or auditing disabled).
#[derive(Debug, Default)]
pub struct NoOpLogger;

impl AuditLogger for NoOpLogger {
    fn log(&self, _event: AuditEvent) {}
}

// Global logger so events don't have to be threaded through every call.
// Initialized to "none" (no-op) by default.
static GLOBAL_LOGGER: RwLock<Option<Arc<dyn AuditLogger>>> = RwLock::new(None);

/// Set the global audit logger.
pub fn set_global_logger(logger: Arc<dyn AuditLogger>) {
    let mut lock = GLOBAL_LOGGER.write().unwrap();
    *lock = Some(logger);
}

/// Log an event using the global logger.
pub fn log_event(event: AuditEvent) {
    if let Ok(lock) = GLOBAL_LOGGER.read() {
        if let Some(logger) = lock.as_ref() {
            logger.log(event);
        }
    }
}
