//! Signing collaborators used to authenticate votes
//!
//! The agreement core only needs to sign a result hash with the member's
//! session key and to check a peer's signature against a claimed public key.
//! [`Secp256k1Signer`] and [`Secp256k1Verifier`] provide ECDSA over secp256k1
//! with compressed SEC1 public keys and fixed-size `r || s` signatures.

use crate::{Error, Result};
use k256::ecdsa::{
    signature::{Signer as _, Verifier as _},
    Signature, SigningKey, VerifyingKey,
};
use rand::rngs::OsRng;

/// Produces signatures with the member's session key
pub trait Signer: Send + Sync {
    /// Public key matching the signing key, as published in votes
    fn public_key(&self) -> Vec<u8>;

    /// Sign `message`
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// Checks signatures produced by a [`Signer`]
pub trait SignatureVerifier: Send + Sync {
    /// Verify `signature` over `message` under `public_key`.
    ///
    /// Any malformed input is reported as [`Error::InvalidSignature`].
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<()>;
}

/// ECDSA secp256k1 signer
pub struct Secp256k1Signer {
    key: SigningKey,
}

impl Secp256k1Signer {
    /// Generate a fresh random key
    pub fn random() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    /// Load a key from its 32-byte secret scalar
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(bytes).map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(Self { key })
    }

    /// Secret scalar bytes, for persisting the key
    pub fn to_bytes(&self) -> Vec<u8> {
        self.key.to_bytes().to_vec()
    }
}

impl Signer for Secp256k1Signer {
    fn public_key(&self) -> Vec<u8> {
        self.key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature: Signature = self
            .key
            .try_sign(message)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}

/// ECDSA secp256k1 signature verifier
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Verifier;

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<()> {
        let key = VerifyingKey::from_sec1_bytes(public_key).map_err(|_| Error::InvalidSignature)?;
        let signature = Signature::from_slice(signature).map_err(|_| Error::InvalidSignature)?;

        key.verify(message, &signature)
            .map_err(|_| Error::InvalidSignature)
    }
}
