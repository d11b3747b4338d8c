//! Cryptographic primitives for persistence identities.
//!
//! Uses Ed25519 with a context string to prevent cross-protocol attacks:
//! every signature in this crate is computed over `SIGNATURE_CONTEXT ||
//! message`, so a signature produced here can never validate in another
//! protocol (and vice versa).
//!
//! Keys and signatures travel as strings on the wire: public keys as base58
//! (the same alphabet the DID uses), signatures as URL-safe base64.

use crate::error::{Error, Result};
use crate::SIGNATURE_CONTEXT;
use base64::Engine;
use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey as Ed25519SigningKey, Verifier, VerifyingKey,
};
use rand::rngs::OsRng;
use secrecy::{CloneableSecret, ExposeSecret, Secret, Zeroize};

/// A signing key for agent (or test delegator) identities.
///
/// The Ed25519 private key is wrapped in `Secret` for:
/// 1. Guaranteed zeroization on drop
/// 2. Prevention of accidental logging (Debug is redacted)
/// 3. Safe cloning (zeroizes the old memory)
#[derive(Clone)]
pub struct SigningKey {
    signing_key: Secret<Ed25519SigningKeyWrapper>,
}

// Wrapper to implement Zeroize and Clone for Ed25519SigningKey.
// ed25519-dalek 2.x SigningKey implements ZeroizeOnDrop, so Zeroize here
// is a no-op; the inner type handles it on Drop.
struct Ed25519SigningKeyWrapper(Ed25519SigningKey);

impl Clone for Ed25519SigningKeyWrapper {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Zeroize for Ed25519SigningKeyWrapper {
    fn zeroize(&mut self) {
        // No-op: ed25519-dalek handles zeroization on Drop.
    }
}

impl CloneableSecret for Ed25519SigningKeyWrapper {}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("signing_key", &"***SECRET***")
            .finish()
    }
}

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let signing_key = Ed25519SigningKey::generate(&mut OsRng);
        Self {
            signing_key: Secret::new(Ed25519SigningKeyWrapper(signing_key)),
        }
    }

    /// Create a signing key from secret key bytes (e.g. an HKDF output).
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = Ed25519SigningKey::from_bytes(bytes);
        Self {
            signing_key: Secret::new(Ed25519SigningKeyWrapper(signing_key)),
        }
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            verifying_key: self.signing_key.expose_secret().0.verifying_key(),
        }
    }

    /// Sign a message with the context prefix.
    ///
    /// The actual signed data is `SIGNATURE_CONTEXT || message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let prefixed = prefix_message(message);
        let sig = self.signing_key.expose_secret().0.sign(&prefixed);
        Signature { inner: sig }
    }

    /// Sign a bare message without the context prefix.
    ///
    /// Wallet-compatibility path: delegator wallets sign raw message bytes,
    /// so delegation and revocation signatures are produced (and verified)
    /// without domain separation. Agent-side signing always uses [`sign`].
    ///
    /// [`sign`]: SigningKey::sign
    pub fn sign_raw(&self, message: &[u8]) -> Signature {
        Signature {
            inner: self.signing_key.expose_secret().0.sign(message),
        }
    }
}

/// Prefix a message with the context string for domain separation.
fn prefix_message(message: &[u8]) -> Vec<u8> {
    let mut prefixed = Vec::with_capacity(SIGNATURE_CONTEXT.len() + message.len());
    prefixed.extend_from_slice(SIGNATURE_CONTEXT);
    prefixed.extend_from_slice(message);
    prefixed
}

/// A public key for verifying record and proof signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
}

impl PublicKey {
    /// Create a public key from bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let verifying_key =
            VerifyingKey::from_bytes(bytes).map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(Self { verifying_key })
    }

    /// Parse a base58-encoded public key (DID key material).
    pub fn from_base58(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| Error::Crypto(format!("invalid base58 key: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Crypto("invalid public key length".to_string()))?;
        Self::from_bytes(&arr)
    }

    /// Get the public key as bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Encode the public key as base58.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.to_bytes()).into_string()
    }

    /// Get a short fingerprint of the public key (first 16 hex chars).
    ///
    /// Useful for audit logs where the full key isn't needed.
    pub fn fingerprint(&self) -> String {
        let bytes = self.to_bytes();
        hex::encode(&bytes[..8])
    }

    /// Verify a context-prefixed signature against a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let prefixed = prefix_message(message);
        self.verifying_key
            .verify(&prefixed, &signature.inner)
            .map_err(|e| Error::SignatureInvalid(e.to_string()))
    }

    /// Verify a raw (unprefixed) signature against a message.
    ///
    /// Delegator wallets sign without our context prefix; revocation records
    /// and genesis delegations verify through this path.
    pub fn verify_raw(&self, message: &[u8], signature: &Signature) -> Result<()> {
        self.verifying_key
            .verify(message, &signature.inner)
            .map_err(|e| Error::SignatureInvalid(e.to_string()))
    }
}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

/// An Ed25519 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    inner: DalekSignature,
}

impl Signature {
    /// Create a signature from bytes.
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self {
            inner: DalekSignature::from_bytes(bytes),
        }
    }

    /// Parse a URL-safe base64 signature string.
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| Error::Crypto(format!("invalid base64 signature: {e}")))?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| Error::Crypto("invalid signature length".to_string()))?;
        Ok(Self::from_bytes(&arr))
    }

    /// Get the signature as bytes.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }

    /// Encode the signature as URL-safe base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.to_bytes())
    }
}

/// Decode signature bytes that may come from foreign wallet tooling.
///
/// Accepts base58 (wallet convention), standard or URL-safe base64, and hex.
/// Returns the raw bytes in decode-priority order; the first encoding that
/// parses wins.
pub fn decode_signature_bytes(encoded: &str) -> Result<Vec<u8>> {
    if let Ok(bytes) = bs58::decode(encoded).into_vec() {
        return Ok(bytes);
    }
    if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(encoded) {
        return Ok(bytes);
    }
    if let Ok(bytes) = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(encoded) {
        return Ok(bytes);
    }
    if let Ok(bytes) = hex::decode(encoded) {
        return Ok(bytes);
    }
    let preview: String = encoded.chars().take(16).collect();
    Err(Error::KeyDerivation(format!(
        "signature is not base58, base64, or hex: {preview}"
    )))
}
