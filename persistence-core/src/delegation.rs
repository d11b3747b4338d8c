//! Genesis delegation and deterministic agent keypair derivation.
//!
//! A delegation is the founding document for an agent identity: a principal
//! (human or organization) signs, with their wallet key, a statement naming
//! the agent and anchoring it to a block of a public chain. The agent's own
//! Ed25519 keypair is *derived* from that signed statement via HKDF-SHA256,
//! so the same delegation always yields the same keypair and DID. Nothing
//! secret ever needs to be persisted: an agent that crashes re-derives its
//! key from the delegation alone.

use crate::crypto::{decode_signature_bytes, PublicKey, Signature, SigningKey};
use crate::error::{Error, Result};
use crate::{DID_PREFIX, KEY_DERIVATION_INFO};
use chrono::{DateTime, Utc};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The principal granting the delegation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatorInfo {
    /// The delegator's wallet public key (base58).
    pub wallet_pubkey: String,
    /// The delegator's own DID.
    pub did: String,
    /// Opaque reference to the principal (org id, legal entity, ...).
    pub principal_ref: String,
}

/// The agent being delegated to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub name: String,
    /// Unique subdomain for the agent; part of the key derivation salt.
    pub subdomain: String,
    pub purpose: String,
    pub capabilities: Vec<String>,
}

/// Block anchor tying the delegation to a point in time on a public chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisBlockRef {
    pub chain: String,
    pub height: u64,
    pub hash: String,
}

/// The founding document authorizing an agent's identity.
///
/// Immutable once signed. The `delegatorSignature` doubles as the input key
/// material for the agent keypair, which is what makes derivation both
/// deterministic and unforgeable without the delegator's wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisDelegate {
    pub delegator: DelegatorInfo,
    pub agent: AgentProfile,
    pub genesis_block: GenesisBlockRef,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Wallet signature over the delegation body (base58/base64/hex).
    pub delegator_signature: String,
}

impl GenesisDelegate {
    /// The delegator's wallet key as a verifying key.
    pub fn delegator_public_key(&self) -> Result<PublicKey> {
        let bytes = decode_signature_bytes(&self.delegator.wallet_pubkey)
            .map_err(|_| Error::Crypto("invalid wallet pubkey encoding".to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Crypto("invalid wallet pubkey length".to_string()))?;
        PublicKey::from_bytes(&arr)
    }
}

/// An agent's derived keypair together with its DID.
///
/// Owned exclusively by the chain engine that derived it; lives for the
/// process lifetime and is reconstructible from the delegation alone.
#[derive(Debug, Clone)]
pub struct AgentKeypair {
    signing: SigningKey,
    did: String,
}

impl AgentKeypair {
    /// The agent's DID (`did:persistence:<base58 pubkey>`).
    pub fn did(&self) -> &str {
        &self.did
    }

    /// The agent's public verifying key.
    pub fn public_key(&self) -> PublicKey {
        self.signing.public_key()
    }

    /// Sign a message with the agent key (context-prefixed).
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }
}

/// Derive the agent keypair from a genesis delegation.
///
/// Algorithm:
/// - `ikm`  = decoded `delegatorSignature` bytes
/// - `salt` = SHA-256(`genesisBlock.hash` || `agent.subdomain`)
/// - `seed` = HKDF-SHA256(ikm, salt, info = "persistence-agent-identity-v1", 32 bytes)
/// - Ed25519 keypair from `seed`; DID from the base58 public key.
///
/// Deterministic: the same delegation always produces the same keypair. The
/// only failure mode is a malformed signature encoding.
pub fn derive_keypair(delegation: &GenesisDelegate) -> Result<AgentKeypair> {
    let ikm = decode_signature_bytes(&delegation.delegator_signature)?;

    let mut salt_input =
        Vec::with_capacity(delegation.genesis_block.hash.len() + delegation.agent.subdomain.len());
    salt_input.extend_from_slice(delegation.genesis_block.hash.as_bytes());
    salt_input.extend_from_slice(delegation.agent.subdomain.as_bytes());
    let salt = Sha256::digest(&salt_input);

    let hk = Hkdf::<Sha256>::new(Some(salt.as_slice()), &ikm);
    let mut seed = [0u8; 32];
    hk.expand(KEY_DERIVATION_INFO, &mut seed)
        .map_err(|e| Error::KeyDerivation(format!("hkdf expand failed: {e}")))?;

    let signing = SigningKey::from_bytes(&seed);
    let did = did_for_key(&signing.public_key());
    Ok(AgentKeypair { signing, did })
}

/// The DID for a given agent public key.
pub fn did_for_key(key: &PublicKey) -> String {
    format!("{}{}", DID_PREFIX, key.to_base58())
}

/// Build a delegation signed by a fresh wallet key (test support).
#[cfg(test)]
pub(crate) fn test_delegation(name: &str, subdomain: &str) -> GenesisDelegate {
    test_delegation_with_wallet(name, subdomain).0
}

/// Test support variant that keeps the wallet key, for signing revocations.
#[cfg(test)]
pub(crate) fn test_delegation_with_wallet(
    name: &str,
    subdomain: &str,
) -> (GenesisDelegate, SigningKey) {
    // The wallet key signs the delegation body raw (wallet convention); any
    // deterministic signature-shaped blob works as IKM.
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
            purpose: "test agent".to_string(),
            capabilities: vec!["search".to_string()],
        },
        genesis_block: GenesisBlockRef {
            chain: "solana-devnet".to_string(),
            height: 250_000_000,
            hash: "7Np41oeYqPefeNQEHSv1UDhYrehxin3NStELsSKCT4K2".to_string(),
        },
        created_at: "2025-06-01T00:00:00Z".parse().unwrap(),
        expires_at: None,
        delegator_signature: bs58::encode(signature.to_bytes()).into_string(),
    };
    (delegation, wallet)
}
