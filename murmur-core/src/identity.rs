// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ed25519 key pairs used for feed identities and message signatures.

use std::fmt;
use std::fmt::Display;

use ed25519_dalek::{
    Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH,
    SECRET_KEY_LENGTH, SIGNATURE_LENGTH,
};
use rand::rngs::OsRng;
use thiserror::Error;

/// Private Ed25519 key used for signing.
#[derive(Clone, Debug)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Generates a new private key using the system's random number
    /// generator (CSPRNG) as a seed.
    pub fn new() -> Self {
        let mut csprng: OsRng = OsRng;
        Self(SigningKey::generate(&mut csprng))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let bytes: [u8; SECRET_KEY_LENGTH] =
            bytes.try_into().map_err(|_| IdentityError::InvalidLength)?;
        Ok(Self(SigningKey::from_bytes(&bytes)))
    }

    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn sign(&self, bytes: &[u8]) -> Signature {
        Signature(self.0.sign(bytes))
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

/// Public Ed25519 key identifying the author of a feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| IdentityError::InvalidLength)?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|_| IdentityError::InvalidKey)?;
        Ok(Self(key))
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.0.to_bytes()
    }

    /// Verify `signature` over `bytes` against this key.
    pub fn verify(&self, bytes: &[u8], signature: &Signature) -> bool {
        self.0.verify(bytes, &signature.0).is_ok()
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

/// Ed25519 signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature(Ed25519Signature);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let bytes: [u8; SIGNATURE_LENGTH] =
            bytes.try_into().map_err(|_| IdentityError::InvalidLength)?;
        Ok(Self(Ed25519Signature::from_bytes(&bytes)))
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0.to_bytes()
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("invalid byte length for key material")]
    InvalidLength,

    #[error("bytes are not a valid Ed25519 key")]
    InvalidKey,
}

#[cfg(test)]
mod tests {
    use super::PrivateKey;

    #[test]
    fn sign_and_verify() {
        let private_key = PrivateKey::new();
        let signature = private_key.sign(b"gossip is a craft");
        assert!(private_key
            .public_key()
            .verify(b"gossip is a craft", &signature));
        assert!(!private_key.public_key().verify(b"hearsay", &signature));
    }

    #[test]
    fn key_round_trip() {
        let private_key = PrivateKey::new();
        let restored = PrivateKey::from_bytes(&private_key.to_bytes()).unwrap();
        assert_eq!(
            private_key.public_key().to_bytes(),
            restored.public_key().to_bytes()
        );
    }
}
