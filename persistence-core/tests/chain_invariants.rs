//! Chain verification invariant tests.
//!
//! These construct forged records by hand, bypassing the engine's
//! enforcement, to confirm the verifier provides defense-in-depth: correct
//! linkage and sequence numbers are not enough without valid signatures, and
//! vice versa.

mod common;

use chrono::Utc;
use persistence_core::record::{
    CommitmentBody, CommitmentRecord, RevocationRecord, SelfTerminationRecord,
};
use persistence_core::{
    derive_keypair, ChainEngine, ChainFault, Error, IdentityRecord, SigningKey,
};

/// Build a commitment record signed by `signer`, linked after `previous`.
fn forge_commitment(
    agent_did: &str,
    previous: &IdentityRecord,
    sequence_number: u64,
    signer: &SigningKey,
) -> IdentityRecord {
    let mut record = IdentityRecord::Commitment(CommitmentRecord {
        agent_did: agent_did.to_string(),
        previous_record_hash: previous.record_hash().unwrap(),
        sequence_number,
        commitment: CommitmentBody {
            action: "forged".to_string(),
            context: "test".to_string(),
            counterparty: None,
            data_hash: None,
        },
        timestamp: Utc::now(),
        block_ref: None,
        agent_signature: String::new(),
    });
    let signing_hash = record.signing_hash().unwrap();
    let signature = signer.sign(signing_hash.as_bytes()).to_base64();
    if let IdentityRecord::Commitment(r) = &mut record {
        r.agent_signature = signature;
    }
    record
}

#[test]
fn chain_built_by_engine_verifies() {
    let (delegation, _) = common::delegation("scout", "scout-7f3a");
    let mut engine = ChainEngine::new();
    engine.initialize_from_genesis(delegation).unwrap();

    for i in 0..5 {
        engine
            .add_commitment(format!("action-{i}"), "ctx", None, None)
            .unwrap();
    }

    let verification = ChainEngine::verify_chain(engine.chain());
    assert!(verification.valid, "fault: {:?}", verification.fault);
}

#[test]
fn sequence_gap_reports_mismatch_at_offending_index() {
    let (delegation, _) = common::delegation("scout", "scout-7f3a");
    let mut engine = ChainEngine::new();
    engine.initialize_from_genesis(delegation.clone()).unwrap();
    engine.add_commitment("a", "ctx", None, None).unwrap();

    // Hand-forge the next record with seq=3 where seq=2 belongs; linkage and
    // signature are otherwise valid, so only the sequence invariant trips.
    let keypair = derive_keypair(&delegation).unwrap();
    let mut chain = engine.chain().to_vec();
    let forged = {
        let mut record = IdentityRecord::Commitment(CommitmentRecord {
            agent_did: keypair.did().to_string(),
            previous_record_hash: chain.last().unwrap().record_hash().unwrap(),
            sequence_number: 3,
            commitment: CommitmentBody {
                action: "skip".to_string(),
                context: "test".to_string(),
                counterparty: None,
                data_hash: None,
            },
            timestamp: Utc::now(),
            block_ref: None,
            agent_signature: String::new(),
        });
        let signing_hash = record.signing_hash().unwrap();
        let signature = keypair.sign(signing_hash.as_bytes()).to_base64();
        if let IdentityRecord::Commitment(r) = &mut record {
            r.agent_signature = signature;
        }
        record
    };
    chain.push(forged);

    let verification = ChainEngine::verify_chain(&chain);
    assert_eq!(verification.fault, Some(ChainFault::SequenceMismatch(2)));
}

#[test]
fn record_signed_by_foreign_key_is_rejected() {
    let (delegation, _) = common::delegation("scout", "scout-7f3a");
    let mut engine = ChainEngine::new();
    engine.initialize_from_genesis(delegation).unwrap();
    let did = engine.did().unwrap().to_string();

    // Correct linkage and sequence, wrong signer.
    let attacker = SigningKey::generate();
    let forged = forge_commitment(&did, &engine.chain()[0], 1, &attacker);

    let mut chain = engine.chain().to_vec();
    chain.push(forged);

    let verification = ChainEngine::verify_chain(&chain);
    assert_eq!(verification.fault, Some(ChainFault::InvalidSignature(1)));
}

#[test]
fn broken_linkage_is_rejected_at_break_point() {
    let (delegation, _) = common::delegation("scout", "scout-7f3a");
    let mut engine = ChainEngine::new();
    engine.initialize_from_genesis(delegation.clone()).unwrap();
    engine.add_commitment("a", "ctx", None, None).unwrap();
    engine.add_commitment("b", "ctx", None, None).unwrap();

    let mut chain = engine.chain().to_vec();
    if let IdentityRecord::Commitment(r) = &mut chain[2] {
        r.previous_record_hash = "0".repeat(64);
    }

    let verification = ChainEngine::verify_chain(&chain);
    assert_eq!(verification.fault, Some(ChainFault::ChainBreak(2)));
}

#[test]
fn tampering_never_invalidates_earlier_records() {
    let (delegation, _) = common::delegation("scout", "scout-7f3a");
    let mut engine = ChainEngine::new();
    engine.initialize_from_genesis(delegation).unwrap();
    for i in 0..4 {
        engine
            .add_commitment(format!("action-{i}"), "ctx", None, None)
            .unwrap();
    }

    // Tamper with record 3 of 5; the reported fault must be at index >= 3.
    let mut chain = engine.chain().to_vec();
    if let IdentityRecord::Commitment(r) = &mut chain[3] {
        r.commitment.action = "tampered".to_string();
    }

    let verification = ChainEngine::verify_chain(&chain);
    assert!(!verification.valid);
    match verification.fault.unwrap() {
        ChainFault::InvalidSignature(i)
        | ChainFault::ChainBreak(i)
        | ChainFault::SequenceMismatch(i) => assert!(i >= 3),
        other => panic!("unexpected fault {other:?}"),
    }

    // The untampered prefix still verifies on its own.
    let prefix = ChainEngine::verify_chain(&chain[..3]);
    assert!(prefix.valid);
}

#[test]
fn truncated_chain_without_genesis_is_rejected() {
    let (delegation, _) = common::delegation("scout", "scout-7f3a");
    let mut engine = ChainEngine::new();
    engine.initialize_from_genesis(delegation).unwrap();
    engine.add_commitment("a", "ctx", None, None).unwrap();

    let verification = ChainEngine::verify_chain(&engine.chain()[1..]);
    assert_eq!(verification.fault, Some(ChainFault::MissingGenesis));
}

#[test]
fn duplicated_genesis_is_rejected() {
    let (delegation, _) = common::delegation("scout", "scout-7f3a");
    let mut engine = ChainEngine::new();
    engine.initialize_from_genesis(delegation).unwrap();

    let mut chain = engine.chain().to_vec();
    chain.push(chain[0].clone());

    let verification = ChainEngine::verify_chain(&chain);
    assert_eq!(verification.fault, Some(ChainFault::MisplacedGenesis(1)));
}

#[test]
fn revocation_requires_delegator_wallet_signature() {
    let (delegation, wallet) = common::delegation("scout", "scout-7f3a");
    let mut engine = ChainEngine::new();
    engine.initialize_from_genesis(delegation.clone()).unwrap();
    let did = engine.did().unwrap().to_string();

    let sign_revocation = |record: &RevocationRecord, key: &SigningKey| {
        let unsigned = IdentityRecord::Revocation(record.clone());
        let signing_hash = unsigned.signing_hash().unwrap();
        bs58::encode(key.sign_raw(signing_hash.as_bytes()).to_bytes()).into_string()
    };

    let mut revocation = RevocationRecord {
        agent_did: did.clone(),
        delegator_did: delegation.delegator.did.clone(),
        reason: Some("policy violation".to_string()),
        timestamp: Utc::now(),
        delegator_signature: String::new(),
    };

    // Signed by the real wallet: the chain verifies, the identity is dead.
    revocation.delegator_signature = sign_revocation(&revocation, &wallet);
    let mut chain = engine.chain().to_vec();
    chain.push(IdentityRecord::Revocation(revocation.clone()));
    assert!(ChainEngine::verify_chain(&chain).valid);

    // Signed by anyone else: the revocation does not stand.
    let attacker = SigningKey::generate();
    revocation.delegator_signature = sign_revocation(&revocation, &attacker);
    let mut forged_chain = engine.chain().to_vec();
    forged_chain.push(IdentityRecord::Revocation(revocation));
    assert_eq!(
        ChainEngine::verify_chain(&forged_chain).fault,
        Some(ChainFault::InvalidDelegatorSignature(1))
    );
}

#[test]
fn self_termination_is_terminal() {
    let (delegation, _) = common::delegation("scout", "scout-7f3a");
    let mut engine = ChainEngine::new();
    engine.initialize_from_genesis(delegation.clone()).unwrap();
    engine.self_terminate("mission complete").unwrap();

    // The engine refuses further appends.
    assert!(matches!(
        engine.add_commitment("a", "ctx", None, None),
        Err(Error::IdentityTerminated(_))
    ));
    assert!(matches!(
        engine.start_session("s", "ctx", "env"),
        Err(Error::IdentityTerminated(_))
    ));

    // A hand-spliced record after the terminal one fails verification.
    let keypair = derive_keypair(&delegation).unwrap();
    let mut chain = engine.chain().to_vec();
    let head = chain.last().unwrap().clone();
    chain.push({
        let mut record = IdentityRecord::SelfTermination(SelfTerminationRecord {
            agent_did: keypair.did().to_string(),
            previous_record_hash: head.record_hash().unwrap(),
            sequence_number: 2,
            reason: "again".to_string(),
            timestamp: Utc::now(),
            agent_signature: String::new(),
        });
        let signing_hash = record.signing_hash().unwrap();
        let signature = keypair.sign(signing_hash.as_bytes()).to_base64();
        if let IdentityRecord::SelfTermination(r) = &mut record {
            r.agent_signature = signature;
        }
        record
    });

    assert_eq!(
        ChainEngine::verify_chain(&chain).fault,
        Some(ChainFault::RecordAfterTerminal(2))
    );
}

#[test]
fn recovery_after_crash_continues_the_chain() {
    let (delegation, _) = common::delegation("scout", "scout-7f3a");

    // First process lifetime.
    let mut engine = ChainEngine::new();
    engine.initialize_from_genesis(delegation.clone()).unwrap();
    engine.add_commitment("a", "ctx", None, None).unwrap();
    let stored_chain = engine.chain().to_vec();
    let original_did = engine.did().unwrap().to_string();
    drop(engine);

    // Second process lifetime: no key material survived, only the
    // delegation and the stored chain.
    let mut recovered = ChainEngine::new();
    recovered
        .recover_from_chain(delegation, stored_chain)
        .unwrap();
    assert_eq!(recovered.did(), Some(original_did.as_str()));

    let record = recovered.add_commitment("b", "ctx", None, None).unwrap();
    assert_eq!(record.sequence_number(), Some(2));
    assert!(ChainEngine::verify_chain(recovered.chain()).valid);
}
