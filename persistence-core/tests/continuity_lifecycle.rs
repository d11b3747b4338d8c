//! Continuity challenge/proof lifecycle tests.

mod common;

use chrono::{Duration, Utc};
use persistence_core::{
    ChainEngine, ChallengeRegistry, ContinuityChallenge, Error, RequiredProof, VerificationLevel,
};

fn engine() -> ChainEngine {
    let (delegation, _) = common::delegation("scout", "scout-7f3a");
    let mut engine = ChainEngine::new();
    engine.initialize_from_genesis(delegation).unwrap();
    engine.add_commitment("warmup", "ctx", None, None).unwrap();
    engine
}

fn challenge_for(engine: &ChainEngine, extend_chain: bool) -> ContinuityChallenge {
    ContinuityChallenge {
        challenger: "verifier-1".to_string(),
        agent_did: engine.did().unwrap().to_string(),
        nonce: persistence_core::continuity::generate_nonce(),
        timestamp: Utc::now(),
        required_proof: RequiredProof {
            sign_nonce: true,
            prove_chain_head: true,
            extend_chain,
        },
        verification_level: VerificationLevel::Crypto,
        behavioral_prompt: None,
    }
}

const WINDOW: i64 = 300;

#[test]
fn fresh_proof_verifies() {
    let mut engine = engine();
    let challenge = challenge_for(&engine, false);
    let proof = engine.prove_continuity(&challenge).unwrap();

    ChainEngine::verify_continuity_proof(
        &proof,
        &challenge,
        engine.chain(),
        Duration::seconds(WINDOW),
    )
    .unwrap();
}

#[test]
fn extended_proof_links_to_prior_head() {
    let mut engine = engine();
    let head_before = engine.head_hash().unwrap();
    let challenge = challenge_for(&engine, true);
    let proof = engine.prove_continuity(&challenge).unwrap();

    // The proof attests the head as it was before the extension record.
    assert_eq!(proof.chain_head_hash, head_before);
    let new_record = proof.new_record.as_ref().unwrap();
    assert_eq!(
        new_record.previous_record_hash(),
        Some(head_before.as_str())
    );

    // Verifies whether or not the loaded chain includes the extension.
    ChainEngine::verify_continuity_proof(
        &proof,
        &challenge,
        engine.chain(),
        Duration::seconds(WINDOW),
    )
    .unwrap();
    let chain_without_extension = &engine.chain()[..engine.chain().len() - 1];
    ChainEngine::verify_continuity_proof(
        &proof,
        &challenge,
        chain_without_extension,
        Duration::seconds(WINDOW),
    )
    .unwrap();
}

#[test]
fn expired_challenge_rejected_despite_valid_signatures() {
    let mut engine = engine();
    let mut challenge = challenge_for(&engine, false);
    challenge.timestamp = Utc::now() - Duration::seconds(WINDOW + 10);
    let proof = engine.prove_continuity(&challenge).unwrap();

    let result = ChainEngine::verify_continuity_proof(
        &proof,
        &challenge,
        engine.chain(),
        Duration::seconds(WINDOW),
    );
    assert!(matches!(result, Err(Error::ChallengeExpired { .. })));
}

#[test]
fn proof_against_different_challenge_rejected() {
    let mut engine = engine();
    let challenge = challenge_for(&engine, false);
    let other_challenge = challenge_for(&engine, false);
    let proof = engine.prove_continuity(&challenge).unwrap();

    let result = ChainEngine::verify_continuity_proof(
        &proof,
        &other_challenge,
        engine.chain(),
        Duration::seconds(WINDOW),
    );
    assert!(matches!(result, Err(Error::NonceMismatch(_))));
}

#[test]
fn stale_chain_head_rejected() {
    let mut engine = engine();
    let challenge = challenge_for(&engine, false);
    let proof = engine.prove_continuity(&challenge).unwrap();

    // The chain moves on after the proof was produced.
    engine.add_commitment("later", "ctx", None, None).unwrap();

    let result = ChainEngine::verify_continuity_proof(
        &proof,
        &challenge,
        engine.chain(),
        Duration::seconds(WINDOW),
    );
    assert!(matches!(result, Err(Error::ChainHeadMismatch { .. })));
}

#[test]
fn proof_from_foreign_keyholder_rejected() {
    let mut engine = engine();
    let challenge = challenge_for(&engine, false);
    let mut proof = engine.prove_continuity(&challenge).unwrap();

    // An impostor re-signs the nonce with their own key.
    let impostor = persistence_core::SigningKey::generate();
    proof.nonce_signature = impostor.sign(challenge.nonce.as_bytes()).to_base64();

    let result = ChainEngine::verify_continuity_proof(
        &proof,
        &challenge,
        engine.chain(),
        Duration::seconds(WINDOW),
    );
    assert!(result.is_err());
}

#[test]
fn registry_lifecycle_with_proof_flow() {
    let mut engine = engine();
    let mut registry = ChallengeRegistry::new(WINDOW);

    let challenge = registry.issue(
        "verifier-1",
        engine.did().unwrap().to_string(),
        VerificationLevel::Crypto,
        RequiredProof::default(),
        None,
    );
    let proof = engine.prove_continuity(&challenge).unwrap();

    // Submit: take the challenge (single-use) and verify the proof.
    let taken = registry
        .take("verifier-1", engine.did().unwrap(), &challenge.nonce)
        .unwrap();
    ChainEngine::verify_continuity_proof(
        &proof,
        &taken,
        engine.chain(),
        Duration::seconds(WINDOW),
    )
    .unwrap();

    // A replay of the same nonce finds nothing.
    let replay = registry.take("verifier-1", engine.did().unwrap(), &challenge.nonce);
    assert!(matches!(replay, Err(Error::ChallengeNotFound(_))));
}

#[test]
fn tampered_proof_body_rejected() {
    let mut engine = engine();
    let challenge = challenge_for(&engine, false);
    let mut proof = engine.prove_continuity(&challenge).unwrap();

    // Flip a reported field after signing; the aggregate signature breaks.
    proof.seed_hash = Some("f".repeat(64));

    let result = ChainEngine::verify_continuity_proof(
        &proof,
        &challenge,
        engine.chain(),
        Duration::seconds(WINDOW),
    );
    assert!(matches!(result, Err(Error::SignatureInvalid(_))));
}
