//! Wire format for identity records, challenges, and proofs.
//!
//! Uses CBOR (RFC 8949) for compact binary transport - records travel in
//! HTTP headers, queue messages, and ledger payloads - with URL-safe base64
//! helpers for text carriers. Transport encoding is independent of the
//! canonical JSON form used for hashing.
//!
//! ## Security Limits
//!
//! Payload size is limited to [`MAX_RECORD_SIZE`] (64 KB) and enforced
//! *before* deserialization to prevent memory exhaustion from oversized
//! inputs.

use crate::continuity::{ContinuityChallenge, ContinuityProof};
use crate::error::{Error, Result};
use crate::record::IdentityRecord;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Maximum allowed size for a serialized record in bytes (64 KB).
///
/// Typical records are under 2 KB; 64 KB leaves headroom for large genesis
/// delegations while protecting against abuse.
pub const MAX_RECORD_SIZE: usize = 64 * 1024;

/// Serialize any wire type to CBOR bytes.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Deserialize a wire type from CBOR bytes, enforcing the size limit first.
pub fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    if data.len() > MAX_RECORD_SIZE {
        return Err(Error::RecordTooLarge {
            size: data.len(),
            max: MAX_RECORD_SIZE,
        });
    }
    Ok(ciborium::de::from_reader(data)?)
}

/// Encode an identity record for transport.
pub fn encode_record(record: &IdentityRecord) -> Result<Vec<u8>> {
    to_vec(record)
}

/// Decode an identity record.
pub fn decode_record(data: &[u8]) -> Result<IdentityRecord> {
    from_slice(data)
}

/// Encode an identity record as a base64 string (for HTTP headers).
pub fn encode_record_base64(record: &IdentityRecord) -> Result<String> {
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(encode_record(record)?))
}

/// Decode an identity record from a base64 string.
pub fn decode_record_base64(s: &str) -> Result<IdentityRecord> {
    decode_base64(s)
}

/// Encode a continuity challenge for transport.
pub fn encode_challenge(challenge: &ContinuityChallenge) -> Result<Vec<u8>> {
    to_vec(challenge)
}

/// Decode a continuity challenge.
pub fn decode_challenge(data: &[u8]) -> Result<ContinuityChallenge> {
    from_slice(data)
}

/// Encode a continuity proof for transport.
pub fn encode_proof(proof: &ContinuityProof) -> Result<Vec<u8>> {
    to_vec(proof)
}

/// Decode a continuity proof.
pub fn decode_proof(data: &[u8]) -> Result<ContinuityProof> {
    from_slice(data)
}

fn decode_base64<T: DeserializeOwned>(s: &str) -> Result<T> {
    // Base64 encodes 3 bytes as 4 chars; reject obviously oversized input
    // before decoding.
    let estimated_size = (s.len() * 3) / 4;
    if estimated_size > MAX_RECORD_SIZE {
        return Err(Error::RecordTooLarge {
            size: estimated_size,
            max: MAX_RECORD_SIZE,
        });
    }

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| Error::Deserialization(e.to_string()))?;
    from_slice(&bytes)
}

/// Header name for carrying identity records in HTTP requests.
pub const RECORD_HEADER: &str = "X-Persistence-Record";

/// Header name for carrying continuity proofs in HTTP requests.
pub const PROOF_HEADER: &str = "X-Persistence-Proof";
