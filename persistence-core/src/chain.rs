//! Identity chain engine - builds, extends, recovers, and verifies chains.
//!
//! The engine owns the agent keypair for one identity. Record appends are
//! strictly sequential within an engine instance; callers that share an
//! engine across threads must serialize chain-extending calls, or sequence
//! numbers would race.
//!
//! Verification is a value, never a panic: [`ChainEngine::verify_chain`]
//! walks the chain in order and reports the first violated invariant as a
//! typed [`ChainFault`]. Only operating on an uninitialized engine is a
//! distinct hard failure (`EngineNotInitialized`).

use crate::audit::{log_event, AuditEvent, AuditEventType};
use crate::continuity::{ContinuityChallenge, ContinuityProof};
use crate::crypto::{decode_signature_bytes, PublicKey, Signature};
use crate::delegation::{derive_keypair, AgentKeypair, GenesisDelegate};
use crate::error::{ChainFault, Error, Result};
use crate::record::{
    CommitmentBody, CommitmentRecord, GenesisRecord, IdentityRecord, RevocationRecord,
    SeedCommitmentRecord, SessionBody, SessionRecord, SelfTerminationRecord,
};
use chrono::{Duration, Utc};
use tracing::{debug, info};

/// Outcome of a chain verification walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainVerification {
    pub valid: bool,
    /// First violated invariant, present iff `valid` is false.
    pub fault: Option<ChainFault>,
}

impl ChainVerification {
    fn ok() -> Self {
        Self {
            valid: true,
            fault: None,
        }
    }

    fn fail(fault: ChainFault) -> Self {
        Self {
            valid: false,
            fault: Some(fault),
        }
    }

    /// Convert into a `Result`, for callers that treat invalidity as an error.
    pub fn into_result(self) -> Result<()> {
        match self.fault {
            None => Ok(()),
            Some(fault) => Err(Error::ChainInvalid(fault)),
        }
    }
}

/// Engine owning one agent identity: its keypair and its record chain.
///
/// Modeled as an explicit owned struct (never a singleton) so a process can
/// hold several identities, which is also what makes the engine testable.
#[derive(Debug, Default)]
pub struct ChainEngine {
    keypair: Option<AgentKeypair>,
    genesis: Option<GenesisDelegate>,
    chain: Vec<IdentityRecord>,
}

impl ChainEngine {
    /// Create an empty, uninitialized engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// The agent DID, once initialized.
    pub fn did(&self) -> Option<&str> {
        self.keypair.as_ref().map(|k| k.did())
    }

    /// The agent public key, once initialized.
    pub fn public_key(&self) -> Option<PublicKey> {
        self.keypair.as_ref().map(|k| k.public_key())
    }

    /// The current chain (oldest first).
    pub fn chain(&self) -> &[IdentityRecord] {
        &self.chain
    }

    /// Hash of the current chain head.
    pub fn head_hash(&self) -> Result<String> {
        self.chain
            .last()
            .ok_or(Error::EngineNotInitialized("head_hash"))?
            .record_hash()
    }

    /// Whether the chain carries a terminal record.
    pub fn is_terminated(&self) -> bool {
        self.chain.iter().any(|r| r.is_terminal())
    }

    /// Derive the keypair from a delegation and start a fresh chain.
    ///
    /// The genesis record carries the agent's acknowledgment: a signature
    /// over `hash(delegation)` by the freshly derived key, proving the key
    /// accepted exactly this delegation.
    pub fn initialize_from_genesis(
        &mut self,
        delegation: GenesisDelegate,
    ) -> Result<IdentityRecord> {
        let keypair = derive_keypair(&delegation)?;

        let delegation_hash = crate::canonical::hash_value(&delegation)?;
        let acknowledgment = keypair.sign(delegation_hash.as_bytes()).to_base64();

        let genesis = IdentityRecord::Genesis(GenesisRecord {
            delegation: delegation.clone(),
            agent_pubkey: keypair.public_key().to_base58(),
            agent_did: keypair.did().to_string(),
            agent_acknowledgment: acknowledgment,
            storage_ref: None,
            anchor_ref: None,
        });

        info!(did = keypair.did(), "identity initialized from genesis");
        log_event(
            AuditEvent::new(AuditEventType::RecordAppended, "chain-engine")
                .with_agent_did(keypair.did())
                .with_details("genesis record created"),
        );

        self.keypair = Some(keypair);
        self.genesis = Some(delegation);
        self.chain = vec![genesis.clone()];
        Ok(genesis)
    }

    /// Recover an identity from a delegation and a previously stored chain.
    ///
    /// Re-derives the keypair (no stored secret needed), verifies the chain,
    /// checks it belongs to the derived identity, and rejects dead
    /// identities. On success the engine adopts the chain as current state.
    pub fn recover_from_chain(
        &mut self,
        delegation: GenesisDelegate,
        chain: Vec<IdentityRecord>,
    ) -> Result<()> {
        let keypair = derive_keypair(&delegation)?;

        Self::verify_chain(&chain).into_result()?;

        // verify_chain guarantees a genesis record at index 0
        let genesis_did = chain[0].agent_did();
        if genesis_did != keypair.did() {
            return Err(Error::Crypto(format!(
                "chain belongs to {genesis_did}, delegation derives {}",
                keypair.did()
            )));
        }

        if let Some(terminal) = chain.iter().find(|r| r.is_terminal()) {
            return Err(Error::IdentityTerminated(format!(
                "{} record on file",
                terminal.kind()
            )));
        }

        info!(
            did = keypair.did(),
            records = chain.len(),
            "identity recovered from stored chain"
        );
        log_event(
            AuditEvent::new(AuditEventType::IdentityRecovered, "chain-engine")
                .with_agent_did(keypair.did())
                .with_details(format!("{} records", chain.len())),
        );

        self.keypair = Some(keypair);
        self.genesis = Some(delegation);
        self.chain = chain;
        Ok(())
    }

    /// Append a commitment record.
    pub fn add_commitment(
        &mut self,
        action: impl Into<String>,
        context: impl Into<String>,
        counterparty: Option<String>,
        data_hash: Option<String>,
    ) -> Result<IdentityRecord> {
        let (previous_record_hash, sequence_number) = self.next_link("add_commitment")?;
        let keypair = self.signer("add_commitment")?;

        let record = IdentityRecord::Commitment(CommitmentRecord {
            agent_did: keypair.did().to_string(),
            previous_record_hash,
            sequence_number,
            commitment: CommitmentBody {
                action: action.into(),
                context: context.into(),
                counterparty,
                data_hash,
            },
            timestamp: Utc::now(),
            block_ref: None,
            agent_signature: String::new(),
        });

        self.sign_and_append(record)
    }

    /// Append a session record marking the start of a work session.
    pub fn start_session(
        &mut self,
        session_id: impl Into<String>,
        context: impl Into<String>,
        environment: impl Into<String>,
    ) -> Result<IdentityRecord> {
        let (previous_record_hash, sequence_number) = self.next_link("start_session")?;
        let keypair = self.signer("start_session")?;

        let record = IdentityRecord::Session(SessionRecord {
            agent_did: keypair.did().to_string(),
            previous_record_hash,
            sequence_number,
            session: SessionBody {
                session_id: session_id.into(),
                started_at: Utc::now(),
                context: context.into(),
                environment: environment.into(),
            },
            agent_signature: String::new(),
        });

        self.sign_and_append(record)
    }

    /// Append a SEED commitment record binding a behavioral document hash.
    pub fn add_seed_commitment(
        &mut self,
        seed_hash: impl Into<String>,
        seed_version: impl Into<String>,
        storage_ref: Option<String>,
        divergence_score: Option<f64>,
    ) -> Result<IdentityRecord> {
        let (previous_record_hash, sequence_number) = self.next_link("add_seed_commitment")?;
        let keypair = self.signer("add_seed_commitment")?;

        let record = IdentityRecord::SeedCommitment(SeedCommitmentRecord {
            agent_did: keypair.did().to_string(),
            previous_record_hash,
            sequence_number,
            seed_hash: seed_hash.into(),
            seed_version: seed_version.into(),
            storage_ref,
            divergence_score,
            timestamp: Utc::now(),
            agent_signature: String::new(),
        });

        self.sign_and_append(record)
    }

    /// Append a self-termination record, permanently ending the identity.
    pub fn self_terminate(&mut self, reason: impl Into<String>) -> Result<IdentityRecord> {
        let (previous_record_hash, sequence_number) = self.next_link("self_terminate")?;
        let keypair = self.signer("self_terminate")?;
        let did = keypair.did().to_string();

        let record = IdentityRecord::SelfTermination(SelfTerminationRecord {
            agent_did: did.clone(),
            previous_record_hash,
            sequence_number,
            reason: reason.into(),
            timestamp: Utc::now(),
            agent_signature: String::new(),
        });

        let record = self.sign_and_append(record)?;
        log_event(
            AuditEvent::new(AuditEventType::IdentityRevoked, "chain-engine")
                .with_agent_did(&did)
                .with_details("self-terminated"),
        );
        Ok(record)
    }

    /// Accept a delegator-signed revocation into the chain.
    ///
    /// The wallet signature is verified before the record is appended; once
    /// accepted, the identity is dead and all further appends fail.
    pub fn ingest_revocation(&mut self, revocation: RevocationRecord) -> Result<IdentityRecord> {
        let genesis = self
            .genesis
            .as_ref()
            .ok_or(Error::EngineNotInitialized("ingest_revocation"))?;
        if self.is_terminated() {
            return Err(Error::IdentityTerminated(
                "identity already carries a terminal record".to_string(),
            ));
        }
        if Some(revocation.agent_did.as_str()) != self.did() {
            return Err(Error::SignatureInvalid(
                "revocation names a different agent".to_string(),
            ));
        }

        let record = IdentityRecord::Revocation(revocation.clone());
        verify_revocation(&record, &revocation, genesis)
            .map_err(|_| Error::ChainInvalid(ChainFault::InvalidDelegatorSignature(self.chain.len())))?;

        log_event(
            AuditEvent::new(AuditEventType::IdentityRevoked, "chain-engine")
                .with_agent_did(&revocation.agent_did)
                .with_details(
                    revocation
                        .reason
                        .clone()
                        .unwrap_or_else(|| "no reason given".to_string()),
                ),
        );

        self.chain.push(record.clone());
        Ok(record)
    }

    /// Answer a continuity challenge.
    ///
    /// Signs the challenge nonce, attests the current chain head, and - when
    /// the challenge demands it - extends the chain with a commitment record
    /// tagged `continuity_proof`. The whole proof body is then signed.
    pub fn prove_continuity(
        &mut self,
        challenge: &ContinuityChallenge,
    ) -> Result<ContinuityProof> {
        let keypair = self.signer("prove_continuity")?;
        let nonce_signature = keypair.sign(challenge.nonce.as_bytes()).to_base64();
        let chain_head_hash = self.head_hash()?;
        let challenge_hash = challenge.hash()?;

        let new_record = if challenge.required_proof.extend_chain {
            Some(self.add_commitment(
                "continuity_proof",
                format!("continuity challenge from {}", challenge.challenger),
                Some(challenge.challenger.clone()),
                Some(challenge_hash.clone()),
            )?)
        } else {
            None
        };

        let mut proof = ContinuityProof {
            challenge_hash,
            nonce_signature,
            chain_head_hash,
            new_record,
            agent_signature: String::new(),
            seed_hash: None,
            behavioral_response: None,
        };

        let keypair = self.signer("prove_continuity")?;
        let signing_hash = proof.signing_hash()?;
        proof.agent_signature = keypair.sign(signing_hash.as_bytes()).to_base64();

        debug!(
            did = keypair.did(),
            extended = proof.new_record.is_some(),
            "continuity proof produced"
        );
        Ok(proof)
    }

    /// Verify a continuity proof against its challenge and the agent's chain.
    ///
    /// The chain must independently verify; the proof must bind to exactly
    /// this challenge (hash and nonce), attest the correct chain head, and
    /// carry a valid aggregate signature. The freshness window applies
    /// regardless of signature validity.
    pub fn verify_continuity_proof(
        proof: &ContinuityProof,
        challenge: &ContinuityChallenge,
        chain: &[IdentityRecord],
        window: Duration,
    ) -> Result<()> {
        Self::verify_chain(chain).into_result()?;

        if challenge.is_expired_at(Utc::now(), window) {
            return Err(Error::ChallengeExpired {
                issued_at: challenge.timestamp,
                window_secs: window.num_seconds(),
            });
        }

        if proof.challenge_hash != challenge.hash()? {
            return Err(Error::NonceMismatch(
                "proof answers a different challenge".to_string(),
            ));
        }

        let agent_key = genesis_public_key(chain)?;

        if challenge.required_proof.sign_nonce {
            let signature = Signature::from_base64(&proof.nonce_signature)?;
            agent_key
                .verify(challenge.nonce.as_bytes(), &signature)
                .map_err(|_| Error::NonceMismatch("nonce signature invalid".to_string()))?;
        }

        if challenge.required_proof.prove_chain_head {
            verify_chain_head(proof, chain)?;
        }

        if let Some(new_record) = &proof.new_record {
            if new_record.previous_record_hash() != Some(proof.chain_head_hash.as_str()) {
                return Err(Error::ChainHeadMismatch {
                    expected: proof.chain_head_hash.clone(),
                    actual: new_record
                        .previous_record_hash()
                        .unwrap_or("<unchained record>")
                        .to_string(),
                });
            }
            let signature = Signature::from_base64(new_record.signature())?;
            agent_key.verify(new_record.signing_hash()?.as_bytes(), &signature)?;
        }

        let signature = Signature::from_base64(&proof.agent_signature)?;
        agent_key
            .verify(proof.signing_hash()?.as_bytes(), &signature)
            .map_err(|_| Error::SignatureInvalid("proof signature invalid".to_string()))?;

        Ok(())
    }

    /// Verify a complete chain, reporting the first violated invariant.
    ///
    /// Checks, in order: genesis shape and acknowledgment; then for every
    /// subsequent record, terminal-record placement, linkage hash, sequence
    /// number, and signature validity (agent signature for chained records,
    /// delegator wallet signature for revocations).
    pub fn verify_chain(chain: &[IdentityRecord]) -> ChainVerification {
        let genesis = match chain.first() {
            None => return ChainVerification::fail(ChainFault::EmptyChain),
            Some(IdentityRecord::Genesis(g)) => g,
            Some(_) => return ChainVerification::fail(ChainFault::MissingGenesis),
        };

        let agent_key = match PublicKey::from_base58(&genesis.agent_pubkey) {
            Ok(key) => key,
            Err(_) => return ChainVerification::fail(ChainFault::InvalidGenesisAcknowledgment),
        };

        // The acknowledgment must be the derived key's signature over the
        // delegation hash, and the recorded DID must match the recorded key.
        let delegation_hash = match crate::canonical::hash_value(&genesis.delegation) {
            Ok(hash) => hash,
            Err(_) => return ChainVerification::fail(ChainFault::InvalidGenesisAcknowledgment),
        };
        let acknowledgment = match Signature::from_base64(&genesis.agent_acknowledgment) {
            Ok(sig) => sig,
            Err(_) => return ChainVerification::fail(ChainFault::InvalidGenesisAcknowledgment),
        };
        if agent_key
            .verify(delegation_hash.as_bytes(), &acknowledgment)
            .is_err()
            || genesis.agent_did != crate::delegation::did_for_key(&agent_key)
        {
            return ChainVerification::fail(ChainFault::InvalidGenesisAcknowledgment);
        }

        for (i, record) in chain.iter().enumerate().skip(1) {
            if chain[i - 1].is_terminal() {
                return ChainVerification::fail(ChainFault::RecordAfterTerminal(i));
            }

            match record {
                IdentityRecord::Genesis(_) => {
                    return ChainVerification::fail(ChainFault::MisplacedGenesis(i));
                }
                IdentityRecord::Revocation(revocation) => {
                    if verify_revocation(record, revocation, &genesis.delegation).is_err() {
                        return ChainVerification::fail(ChainFault::InvalidDelegatorSignature(i));
                    }
                }
                _ => {
                    let expected_prev = match chain[i - 1].record_hash() {
                        Ok(hash) => hash,
                        Err(_) => return ChainVerification::fail(ChainFault::ChainBreak(i)),
                    };
                    if record.previous_record_hash() != Some(expected_prev.as_str()) {
                        return ChainVerification::fail(ChainFault::ChainBreak(i));
                    }

                    if record.sequence_number() != Some(i as u64) {
                        return ChainVerification::fail(ChainFault::SequenceMismatch(i));
                    }

                    if verify_agent_signature(record, &agent_key).is_err() {
                        return ChainVerification::fail(ChainFault::InvalidSignature(i));
                    }
                }
            }
        }

        ChainVerification::ok()
    }

    fn signer(&self, op: &'static str) -> Result<&AgentKeypair> {
        self.keypair.as_ref().ok_or(Error::EngineNotInitialized(op))
    }

    /// Linkage values for the next record: head hash and sequence number.
    fn next_link(&self, op: &'static str) -> Result<(String, u64)> {
        let head = self.chain.last().ok_or(Error::EngineNotInitialized(op))?;
        if self.is_terminated() {
            return Err(Error::IdentityTerminated(format!(
                "cannot {op} after a terminal record"
            )));
        }
        Ok((head.record_hash()?, self.chain.len() as u64))
    }

    fn sign_and_append(&mut self, mut record: IdentityRecord) -> Result<IdentityRecord> {
        let keypair = self.signer("sign_and_append")?;
        let signing_hash = record.signing_hash()?;
        let signature = keypair.sign(signing_hash.as_bytes()).to_base64();
        attach_agent_signature(&mut record, signature);

        debug!(
            did = record.agent_did(),
            kind = %record.kind(),
            sequence = record.sequence_number(),
            "record appended"
        );
        log_event(
            AuditEvent::new(AuditEventType::RecordAppended, "chain-engine")
                .with_agent_did(record.agent_did())
                .with_details(record.kind().to_string())
                .with_related(vec![record.record_hash()?]),
        );

        self.chain.push(record.clone());
        Ok(record)
    }
}

/// Public key of the agent, read from the genesis record of a chain.
pub fn genesis_public_key(chain: &[IdentityRecord]) -> Result<PublicKey> {
    match chain.first() {
        Some(IdentityRecord::Genesis(g)) => PublicKey::from_base58(&g.agent_pubkey),
        _ => Err(Error::ChainInvalid(ChainFault::MissingGenesis)),
    }
}

/// Check the proof's attested head against the verified chain.
///
/// When the loaded chain already contains the proof's extension record, the
/// attested head is the record before it; otherwise it is the chain's last
/// record. This keeps the attestation meaningful whether or not the storage
/// collaborator has caught up with the extension.
fn verify_chain_head(proof: &ContinuityProof, chain: &[IdentityRecord]) -> Result<()> {
    let head_hash = match chain.last() {
        Some(record) => record.record_hash()?,
        None => return Err(Error::ChainInvalid(ChainFault::EmptyChain)),
    };

    let expected = match &proof.new_record {
        Some(new_record) if chain.len() >= 2 && head_hash == new_record.record_hash()? => {
            chain[chain.len() - 2].record_hash()?
        }
        _ => head_hash,
    };

    if proof.chain_head_hash != expected {
        return Err(Error::ChainHeadMismatch {
            expected,
            actual: proof.chain_head_hash.clone(),
        });
    }
    Ok(())
}

fn attach_agent_signature(record: &mut IdentityRecord, signature: String) {
    match record {
        IdentityRecord::Commitment(r) => r.agent_signature = signature,
        IdentityRecord::Session(r) => r.agent_signature = signature,
        IdentityRecord::SeedCommitment(r) => r.agent_signature = signature,
        IdentityRecord::SelfTermination(r) => r.agent_signature = signature,
        // Genesis carries an acknowledgment; revocations are delegator-signed.
        IdentityRecord::Genesis(_) | IdentityRecord::Revocation(_) => {}
    }
}

fn verify_agent_signature(record: &IdentityRecord, agent_key: &PublicKey) -> Result<()> {
    let signature = Signature::from_base64(record.signature())?;
    agent_key.verify(record.signing_hash()?.as_bytes(), &signature)
}

/// Verify a revocation's delegator wallet signature.
///
/// The wallet signs the record's signing hash raw (no context prefix), and
/// the claimed `delegatorDid` must match the delegation on file. An
/// unverifiable revocation invalidates the chain rather than killing the
/// identity.
fn verify_revocation(
    record: &IdentityRecord,
    revocation: &crate::record::RevocationRecord,
    delegation: &GenesisDelegate,
) -> Result<()> {
    if revocation.delegator_did != delegation.delegator.did {
        return Err(Error::SignatureInvalid(
            "revocation names a different delegator".to_string(),
        ));
    }

    let wallet_key = delegation.delegator_public_key()?;
    let sig_bytes = decode_signature_bytes(&revocation.delegator_signature)?;
    let sig_arr: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| Error::Crypto("invalid delegator signature length".to_string()))?;
    let signature = Signature::from_bytes(&sig_arr);

    wallet_key.verify_raw(record.signing_hash()?.as_bytes(), &signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegation::{test_delegation, test_delegation_with_wallet};
    use crate::record::RevocationRecord;

    fn initialized_engine() -> ChainEngine {
        let mut engine = ChainEngine::new();
        engine
            .initialize_from_genesis(test_delegation("scout", "scout-7f3a"))
            .unwrap();
        engine
    }

    #[test]
    fn test_initialize_creates_genesis_chain() {
        let engine = initialized_engine();
        assert_eq!(engine.chain().len(), 1);
        assert!(matches!(engine.chain()[0], IdentityRecord::Genesis(_)));
        assert!(ChainEngine::verify_chain(engine.chain()).valid);
    }

    #[test]
    fn test_sequential_appends_verify() {
        let mut engine = initialized_engine();
        engine
            .add_commitment("deploy", "release", None, None)
            .unwrap();
        engine
            .start_session("sess-1", "interactive", "prod")
            .unwrap();
        engine
            .add_seed_commitment("a".repeat(64), "1.0.0", None, Some(0.1))
            .unwrap();

        assert_eq!(engine.chain().len(), 4);
        let verification = ChainEngine::verify_chain(engine.chain());
        assert!(verification.valid, "fault: {:?}", verification.fault);
    }

    #[test]
    fn test_sequence_numbers_are_indices() {
        let mut engine = initialized_engine();
        for i in 1..=3u64 {
            let record = engine.add_commitment("act", "ctx", None, None).unwrap();
            assert_eq!(record.sequence_number(), Some(i));
        }
    }

    #[test]
    fn test_uninitialized_engine_is_programmer_error() {
        let mut engine = ChainEngine::new();
        match engine.add_commitment("act", "ctx", None, None) {
            Err(Error::EngineNotInitialized(_)) => {}
            other => panic!("expected EngineNotInitialized, got {:?}", other),
        }
    }

    #[test]
    fn test_append_after_self_termination_rejected() {
        let mut engine = initialized_engine();
        engine.self_terminate("mission complete").unwrap();

        match engine.add_commitment("act", "ctx", None, None) {
            Err(Error::IdentityTerminated(_)) => {}
            other => panic!("expected IdentityTerminated, got {:?}", other),
        }
    }

    #[test]
    fn test_tampered_record_invalidates_from_that_point() {
        let mut engine = initialized_engine();
        engine.add_commitment("a", "ctx", None, None).unwrap();
        engine.add_commitment("b", "ctx", None, None).unwrap();
        engine.add_commitment("c", "ctx", None, None).unwrap();

        let mut chain = engine.chain().to_vec();
        if let IdentityRecord::Commitment(r) = &mut chain[2] {
            r.commitment.action = "tampered".to_string();
        }

        let verification = ChainEngine::verify_chain(&chain);
        assert!(!verification.valid);
        // The tampered record itself fails its signature check; nothing
        // before index 2 is implicated.
        assert!(matches!(
            verification.fault,
            Some(ChainFault::InvalidSignature(2)) | Some(ChainFault::ChainBreak(3))
        ));
    }

    #[test]
    fn test_sequence_gap_detected() {
        let mut engine = initialized_engine();
        engine.add_commitment("a", "ctx", None, None).unwrap();
        engine.add_commitment("b", "ctx", None, None).unwrap();

        let mut chain = engine.chain().to_vec();
        // Forge seq=3 where seq=2 belongs; re-link and re-sign so only the
        // sequence invariant is violated.
        chain[2] = match chain[2].clone() {
            IdentityRecord::Commitment(mut r) => {
                r.sequence_number = 3;
                IdentityRecord::Commitment(r)
            }
            _ => unreachable!(),
        };
        let keypair = derive_keypair(engine.genesis.as_ref().unwrap()).unwrap();
        let signing_hash = chain[2].signing_hash().unwrap();
        if let IdentityRecord::Commitment(r) = &mut chain[2] {
            r.agent_signature = keypair.sign(signing_hash.as_bytes()).to_base64();
        }

        let verification = ChainEngine::verify_chain(&chain);
        assert_eq!(verification.fault, Some(ChainFault::SequenceMismatch(2)));
    }

    #[test]
    fn test_recover_adopts_valid_chain() {
        let mut engine = ChainEngine::new();
        let delegation = test_delegation("scout", "scout-7f3a");
        engine.initialize_from_genesis(delegation.clone()).unwrap();
        engine.add_commitment("a", "ctx", None, None).unwrap();
        let chain = engine.chain().to_vec();
        let did = engine.did().unwrap().to_string();

        let mut recovered = ChainEngine::new();
        recovered.recover_from_chain(delegation, chain).unwrap();
        assert_eq!(recovered.did(), Some(did.as_str()));
        assert_eq!(recovered.chain().len(), 2);

        // Recovery is a live identity: appends continue the sequence.
        let record = recovered.add_commitment("b", "ctx", None, None).unwrap();
        assert_eq!(record.sequence_number(), Some(2));
    }

    #[test]
    fn test_recover_rejects_foreign_chain() {
        let mut engine = ChainEngine::new();
        engine
            .initialize_from_genesis(test_delegation("scout", "scout-7f3a"))
            .unwrap();
        let chain = engine.chain().to_vec();

        let mut other = ChainEngine::new();
        let result = other.recover_from_chain(test_delegation("probe", "probe-1a2b"), chain);
        assert!(result.is_err());
    }

    #[test]
    fn test_recover_rejects_terminated_identity() {
        let mut engine = ChainEngine::new();
        let delegation = test_delegation("scout", "scout-7f3a");
        engine.initialize_from_genesis(delegation.clone()).unwrap();
        engine.self_terminate("done").unwrap();
        let chain = engine.chain().to_vec();

        let mut recovered = ChainEngine::new();
        match recovered.recover_from_chain(delegation, chain) {
            Err(Error::IdentityTerminated(_)) => {}
            other => panic!("expected IdentityTerminated, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_revocation_verifies() {
        let (delegation, wallet) = test_delegation_with_wallet("scout", "scout-7f3a");
        let mut engine = ChainEngine::new();
        engine.initialize_from_genesis(delegation.clone()).unwrap();
        let did = engine.did().unwrap().to_string();

        let mut revocation = RevocationRecord {
            agent_did: did,
            delegator_did: delegation.delegator.did.clone(),
            reason: Some("compromised".to_string()),
            timestamp: Utc::now(),
            delegator_signature: String::new(),
        };
        let unsigned = IdentityRecord::Revocation(revocation.clone());
        let signing_hash = unsigned.signing_hash().unwrap();
        revocation.delegator_signature =
            bs58::encode(wallet.sign_raw(signing_hash.as_bytes()).to_bytes()).into_string();

        let mut chain = engine.chain().to_vec();
        chain.push(IdentityRecord::Revocation(revocation));

        let verification = ChainEngine::verify_chain(&chain);
        assert!(verification.valid, "fault: {:?}", verification.fault);
    }

    #[test]
    fn test_forged_revocation_rejected() {
        let delegation = test_delegation("scout", "scout-7f3a");
        let mut engine = ChainEngine::new();
        engine.initialize_from_genesis(delegation.clone()).unwrap();

        // An attacker without the delegator wallet signs with their own key.
        let attacker = crate::crypto::SigningKey::generate();
        let mut revocation = RevocationRecord {
            agent_did: engine.did().unwrap().to_string(),
            delegator_did: delegation.delegator.did.clone(),
            reason: None,
            timestamp: Utc::now(),
            delegator_signature: String::new(),
        };
        let signing_hash = IdentityRecord::Revocation(revocation.clone())
            .signing_hash()
            .unwrap();
        revocation.delegator_signature =
            bs58::encode(attacker.sign_raw(signing_hash.as_bytes()).to_bytes()).into_string();

        let mut chain = engine.chain().to_vec();
        chain.push(IdentityRecord::Revocation(revocation));

        let verification = ChainEngine::verify_chain(&chain);
        assert_eq!(
            verification.fault,
            Some(ChainFault::InvalidDelegatorSignature(1))
        );
    }

    #[test]
    fn test_ingested_revocation_ends_identity() {
        let (delegation, wallet) = test_delegation_with_wallet("scout", "scout-7f3a");
        let mut engine = ChainEngine::new();
        engine.initialize_from_genesis(delegation.clone()).unwrap();

        let mut revocation = RevocationRecord {
            agent_did: engine.did().unwrap().to_string(),
            delegator_did: delegation.delegator.did.clone(),
            reason: Some("decommissioned".to_string()),
            timestamp: Utc::now(),
            delegator_signature: String::new(),
        };
        let signing_hash = IdentityRecord::Revocation(revocation.clone())
            .signing_hash()
            .unwrap();
        revocation.delegator_signature =
            bs58::encode(wallet.sign_raw(signing_hash.as_bytes()).to_bytes()).into_string();

        engine.ingest_revocation(revocation).unwrap();
        assert!(engine.is_terminated());
        assert!(ChainEngine::verify_chain(engine.chain()).valid);

        match engine.add_commitment("act", "ctx", None, None) {
            Err(Error::IdentityTerminated(_)) => {}
            other => panic!("expected IdentityTerminated, got {:?}", other),
        }
    }

    #[test]
    fn test_forged_revocation_not_ingested() {
        let delegation = test_delegation("scout", "scout-7f3a");
        let mut engine = ChainEngine::new();
        engine.initialize_from_genesis(delegation.clone()).unwrap();

        let attacker = crate::crypto::SigningKey::generate();
        let mut revocation = RevocationRecord {
            agent_did: engine.did().unwrap().to_string(),
            delegator_did: delegation.delegator.did.clone(),
            reason: None,
            timestamp: Utc::now(),
            delegator_signature: String::new(),
        };
        let signing_hash = IdentityRecord::Revocation(revocation.clone())
            .signing_hash()
            .unwrap();
        revocation.delegator_signature =
            bs58::encode(attacker.sign_raw(signing_hash.as_bytes()).to_bytes()).into_string();

        assert!(engine.ingest_revocation(revocation).is_err());
        assert!(!engine.is_terminated());
    }

    #[test]
    fn test_record_after_revocation_rejected() {
        let (delegation, wallet) = test_delegation_with_wallet("scout", "scout-7f3a");
        let mut engine = ChainEngine::new();
        engine.initialize_from_genesis(delegation.clone()).unwrap();
        engine.add_commitment("a", "ctx", None, None).unwrap();

        let mut revocation = RevocationRecord {
            agent_did: engine.did().unwrap().to_string(),
            delegator_did: delegation.delegator.did.clone(),
            reason: None,
            timestamp: Utc::now(),
            delegator_signature: String::new(),
        };
        let signing_hash = IdentityRecord::Revocation(revocation.clone())
            .signing_hash()
            .unwrap();
        revocation.delegator_signature =
            bs58::encode(wallet.sign_raw(signing_hash.as_bytes()).to_bytes()).into_string();

        let mut chain = engine.chain().to_vec();
        chain.push(IdentityRecord::Revocation(revocation));
        // Splice a (previously valid) commitment after the revocation.
        let orphan = engine.chain()[1].clone();
        chain.push(orphan);

        let verification = ChainEngine::verify_chain(&chain);
        assert_eq!(verification.fault, Some(ChainFault::RecordAfterTerminal(3)));
    }

    #[test]
    fn test_empty_chain_fault() {
        assert_eq!(
            ChainEngine::verify_chain(&[]).fault,
            Some(ChainFault::EmptyChain)
        );
    }
}
