//! Shared fixtures for integration tests.
#![allow(dead_code)]

use chrono::{Duration, Utc};
use persistence_core::{
    AgentProfile, DelegatorInfo, GenesisBlockRef, GenesisDelegate, SeedDocument, SigningKey,
};
use persistence_core::seed::{SeedPrompt, SeedReference, SeedWeight};

/// A delegation signed by a fresh wallet key, created 30 days ago.
/// Returns the wallet key too, for delegator-side signing (revocations).
pub fn delegation(name: &str, subdomain: &str) -> (GenesisDelegate, SigningKey) {
    let wallet = SigningKey::generate();
    let body = format!("delegation:{name}:{subdomain}");
    let signature = wallet.sign_raw(body.as_bytes());

    let delegation = GenesisDelegate {
        delegator: DelegatorInfo {
            wallet_pubkey: wallet.public_key().to_base58(),
            did: "did:sol:delegator".to_string(),
            principal_ref: "org:example".to_string(),
        },
        agent: AgentProfile {
            name: name.to_string(),
            subdomain: subdomain.to_string(),
            purpose: "integration test agent".to_string(),
            capabilities: vec!["search".to_string(), "negotiate".to_string()],
        },
        genesis_block: GenesisBlockRef {
            chain: "solana-devnet".to_string(),
            height: 250_000_000,
            hash: "7Np41oeYqPefeNQEHSv1UDhYrehxin3NStELsSKCT4K2".to_string(),
        },
        created_at: Utc::now() - Duration::days(30),
        expires_at: None,
        delegator_signature: bs58::encode(signature.to_bytes()).into_string(),
    };
    (delegation, wallet)
}

/// A small SEED document with one answerable probe prompt.
pub fn seed(version: &str) -> SeedDocument {
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

/// The reference answer of [`seed`]'s probe prompt.
pub const REFERENCE_ANSWER: &str = "Cross-check primary sources before answering.";
