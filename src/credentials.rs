//! Credential helpers: room passcode hashing, opaque session tokens and
//! HMAC-signed state envelopes.
//!
//! Everything in here is pure and stateless so callers can run it outside a
//! room's serialized mutation path.

use std::num::NonZeroU32;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ring::{
    constant_time, digest, hmac, pbkdf2,
    rand::{SecureRandom, SystemRandom},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Default number of PBKDF2 rounds applied to room passcodes.
pub const DEFAULT_PASSCODE_ITERATIONS: u32 = 100_000;
/// Shortest accepted passcode (after trimming).
pub const MIN_PASSCODE_LEN: usize = 4;
/// Longest accepted passcode (after trimming).
pub const MAX_PASSCODE_LEN: usize = 128;

const SALT_LEN: usize = 16;
const SESSION_TOKEN_BYTES: usize = 32;
static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// Failures raised by the credential helpers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// Passcode length outside of the accepted window.
    #[error("passcode must be between 4 and 128 characters")]
    InvalidPasscodeLength,
    /// Iteration count of zero.
    #[error("passcode iterations must be greater than zero")]
    InvalidIterations,
    /// The system random source failed.
    #[error("random generator failure")]
    Random,
    /// Signed envelope is malformed or its signature does not match.
    #[error("signed state rejected: {0}")]
    InvalidSignature(&'static str),
    /// Signed payload could not be (de)serialized.
    #[error("signed state payload is not valid json")]
    Payload,
}

/// Stored form of a room passcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasscodeHash {
    /// Base64url derived key.
    pub hash: String,
    /// Base64url salt.
    pub salt: String,
    /// PBKDF2 rounds used to derive `hash`.
    pub iterations: u32,
}

/// Hash a room passcode with PBKDF2-HMAC-SHA256.
///
/// A random salt is drawn when `salt` is `None`, and `iterations` falls back to
/// [`DEFAULT_PASSCODE_ITERATIONS`].
pub fn hash_passcode(
    passcode: &str,
    salt: Option<&[u8]>,
    iterations: Option<u32>,
) -> Result<PasscodeHash, CredentialError> {
    let passcode = normalize_passcode(passcode)?;
    let rounds = NonZeroU32::new(iterations.unwrap_or(DEFAULT_PASSCODE_ITERATIONS))
        .ok_or(CredentialError::InvalidIterations)?;

    let salt = match salt {
        Some(bytes) => bytes.to_vec(),
        None => random_bytes::<SALT_LEN>()?.to_vec(),
    };

    let mut derived = [0u8; digest::SHA256_OUTPUT_LEN];
    pbkdf2::derive(PBKDF2_ALG, rounds, &salt, passcode.as_bytes(), &mut derived);

    Ok(PasscodeHash {
        hash: URL_SAFE_NO_PAD.encode(derived),
        salt: URL_SAFE_NO_PAD.encode(&salt),
        iterations: rounds.get(),
    })
}

/// Recompute the derived key for `candidate` and compare it in constant time.
pub fn verify_passcode(candidate: &str, stored: &PasscodeHash) -> bool {
    let Ok(candidate) = normalize_passcode(candidate) else {
        return false;
    };
    let Some(rounds) = NonZeroU32::new(stored.iterations) else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (
        URL_SAFE_NO_PAD.decode(&stored.salt),
        URL_SAFE_NO_PAD.decode(&stored.hash),
    ) else {
        return false;
    };

    pbkdf2::verify(PBKDF2_ALG, rounds, &salt, candidate.as_bytes(), &expected).is_ok()
}

/// Compare a presented session token with the stored one in constant time.
pub fn tokens_match(presented: &str, stored: &str) -> bool {
    constant_time::verify_slices_are_equal(presented.as_bytes(), stored.as_bytes()).is_ok()
}

/// Generate an opaque url-safe session token carrying 256 bits of entropy.
pub fn generate_session_token() -> Result<String, CredentialError> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes::<SESSION_TOKEN_BYTES>()?))
}

/// Serialize `data` and append an HMAC-SHA256 tag: `base64(json).base64(tag)`.
pub fn sign_state<T: Serialize>(data: &T, secret: &[u8]) -> Result<String, CredentialError> {
    let payload = serde_json::to_vec(data).map_err(|_| CredentialError::Payload)?;
    let encoded = URL_SAFE_NO_PAD.encode(payload);
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let tag = hmac::sign(&key, encoded.as_bytes());
    Ok(format!("{encoded}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref())))
}

/// Verify an envelope produced by [`sign_state`] and decode its payload.
///
/// The payload is only deserialized once the signature has been checked.
pub fn verify_state<T: DeserializeOwned>(
    envelope: &str,
    secret: &[u8],
) -> Result<T, CredentialError> {
    let (encoded, signature) = envelope
        .split_once('.')
        .ok_or(CredentialError::InvalidSignature("missing separator"))?;
    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| CredentialError::InvalidSignature("signature is not base64"))?;

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    hmac::verify(&key, encoded.as_bytes(), &signature)
        .map_err(|_| CredentialError::InvalidSignature("signature mismatch"))?;

    let payload = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| CredentialError::InvalidSignature("payload is not base64"))?;
    serde_json::from_slice(&payload).map_err(|_| CredentialError::Payload)
}

/// Draw a fresh random secret suitable for [`sign_state`].
pub fn generate_state_secret() -> Result<Vec<u8>, CredentialError> {
    Ok(random_bytes::<32>()?.to_vec())
}

fn normalize_passcode(passcode: &str) -> Result<&str, CredentialError> {
    let trimmed = passcode.trim();
    let len = trimmed.chars().count();
    if !(MIN_PASSCODE_LEN..=MAX_PASSCODE_LEN).contains(&len) {
        return Err(CredentialError::InvalidPasscodeLength);
    }
    Ok(trimmed)
}

fn random_bytes<const N: usize>() -> Result<[u8; N], CredentialError> {
    let mut bytes = [0u8; N];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| CredentialError::Random)?;
    Ok(bytes)
}
