// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signing and verification of classic messages.
//!
//! A classic message value is signed over its canonical pretty-printed
//! form with the `signature` member removed. Networks can additionally be
//! keyed: with an HMAC key configured, the signature covers the 32-byte
//! authentication tag of the pre-signature bytes instead of the bytes
//! themselves.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

use crate::canonical::{encode_preserve_order, encode_value, internal_v8_bytes, CanonicalError};
use crate::error::ErrorKind;
use crate::identity::{PrivateKey, Signature};
use crate::refs::{FeedRef, MessageAlgorithm, MessageRef};

const SIGNATURE_SUFFIX: &str = ".sig.ed25519";

// The signature is always the last member of the root object in canonical
// form, so the pattern is anchored at the closing brace.
static SIGNATURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#",\n  "signature": "([A-Za-z0-9/+=.]+)"\n\}$"#).expect("valid signature pattern")
});

/// The structured shape of a classic message value.
#[derive(Clone, Debug, Deserialize)]
pub struct VerifiedMessage {
    #[serde(default)]
    pub previous: Option<MessageRef>,
    pub author: FeedRef,
    pub sequence: u64,
    pub timestamp: f64,
    pub hash: String,
    pub content: Value,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Verify a raw classic message value.
///
/// Canonicalizes `raw`, checks its structure, verifies the Ed25519
/// signature against the author named in the message (optionally keyed by
/// `hmac_key`) and derives the stable message reference.
pub fn verify(
    raw: &[u8],
    hmac_key: Option<&[u8; 32]>,
) -> Result<(MessageRef, VerifiedMessage), VerifyError> {
    let encoded = encode_preserve_order(raw)?;
    let encoded = String::from_utf8(encoded).map_err(|_| VerifyError::NotUtf8)?;

    let message: VerifiedMessage = serde_json::from_slice(raw)?;

    if message.hash != "sha256" {
        return Err(VerifyError::UnsupportedHash(message.hash.clone()));
    }
    check_content(&message.content)?;

    let (unsigned, signature) = extract_signature(&encoded)?;

    let mut signed_bytes = unsigned.into_bytes();
    if let Some(key) = hmac_key {
        signed_bytes = auth_tag(&signed_bytes, key);
    }

    let author = message
        .author
        .public_key()
        .map_err(|_| VerifyError::BadAuthor)?;
    if !author.verify(&signed_bytes, &signature) {
        return Err(VerifyError::SignatureMismatch);
    }

    Ok((message_ref(&encoded), message))
}

/// Sign a message value, producing the canonical signed bytes.
///
/// `value` is the message value in final key order, without a `signature`
/// member. The returned bytes are themselves canonical: verifying them
/// yields the same message reference any other peer derives.
pub fn sign_message(
    value: &Value,
    private_key: &PrivateKey,
    hmac_key: Option<&[u8; 32]>,
) -> Result<Vec<u8>, VerifyError> {
    let members = value.as_object().ok_or(VerifyError::NotAnObject)?;
    if members.contains_key("signature") {
        return Err(VerifyError::AlreadySigned);
    }

    let encoded = encode_value(value);
    let encoded = String::from_utf8(encoded).map_err(|_| VerifyError::NotUtf8)?;
    let body = encoded
        .strip_suffix("\n}")
        .ok_or(VerifyError::NotAnObject)?;

    let mut signed_bytes = encoded.clone().into_bytes();
    if let Some(key) = hmac_key {
        signed_bytes = auth_tag(&signed_bytes, key);
    }
    let signature = private_key.sign(&signed_bytes);
    let signature = format!("{}{}", BASE64.encode(signature.to_bytes()), SIGNATURE_SUFFIX);

    Ok(format!("{body},\n  \"signature\": \"{signature}\"\n}}").into_bytes())
}

/// Strip the trailing signature member from canonical bytes.
///
/// Fails unless exactly one root-level signature is present.
fn extract_signature(encoded: &str) -> Result<(String, Signature), VerifyError> {
    let matches: Vec<_> = SIGNATURE_RE.captures_iter(encoded).collect();
    if matches.len() != 1 {
        return Err(VerifyError::NoSignature(matches.len()));
    }

    let sig_str = matches[0]
        .get(1)
        .expect("capture group present on match")
        .as_str();
    let sig_b64 = sig_str
        .strip_suffix(SIGNATURE_SUFFIX)
        .ok_or_else(|| VerifyError::MalformedSignature(sig_str.to_owned()))?;
    let sig_bytes = BASE64
        .decode(sig_b64)
        .map_err(|_| VerifyError::MalformedSignature(sig_str.to_owned()))?;
    let signature = Signature::from_bytes(&sig_bytes)
        .map_err(|_| VerifyError::MalformedSignature(sig_str.to_owned()))?;

    let unsigned = SIGNATURE_RE.replace(encoded, "\n}").into_owned();
    Ok((unsigned, signature))
}

fn check_content(content: &Value) -> Result<(), VerifyError> {
    match content {
        Value::Object(members) => {
            let type_len = members
                .get("type")
                .and_then(Value::as_str)
                .map(str::len)
                .unwrap_or(0);
            if !(3..=52).contains(&type_len) {
                return Err(VerifyError::BadContentType(type_len));
            }
            Ok(())
        }
        Value::String(boxed) => {
            if boxed.ends_with(".box") || boxed.ends_with(".box2") {
                Ok(())
            } else {
                Err(VerifyError::BadPrivateSuffix)
            }
        }
        _ => Err(VerifyError::MalformedContent),
    }
}

// NaCl crypto_auth: HMAC-SHA-512 truncated to 32 bytes.
fn auth_tag(bytes: &[u8], key: &[u8; 32]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha512>::new_from_slice(key).expect("hmac accepts keys of any length");
    mac.update(bytes);
    mac.finalize().into_bytes()[..32].to_vec()
}

// The id is the SHA-256 of the canonical bytes transcoded into the legacy
// runtime's internal string form.
fn message_ref(encoded: &str) -> MessageRef {
    let digest = Sha256::digest(internal_v8_bytes(encoded));
    MessageRef::new(MessageAlgorithm::Sha256, digest.into())
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error(transparent)]
    Encode(#[from] CanonicalError),

    #[error("could not deserialize message value: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("canonical bytes are not valid UTF-8")]
    NotUtf8,

    #[error("unsupported hash algorithm {0:?}")]
    UnsupportedHash(String),

    #[error("content type field has invalid length {0}")]
    BadContentType(usize),

    #[error("private content must end in .box or .box2")]
    BadPrivateSuffix,

    #[error("content is neither a typed object nor a boxed string")]
    MalformedContent,

    #[error("expected exactly one signature member, found {0}")]
    NoSignature(usize),

    #[error("malformed signature string {0:?}")]
    MalformedSignature(String),

    #[error("author field is not a valid public key")]
    BadAuthor,

    #[error("signature does not match claimed author")]
    SignatureMismatch,

    #[error("message value is not a JSON object")]
    NotAnObject,

    #[error("message value already carries a signature")]
    AlreadySigned,
}

impl VerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::UnsupportedHash(_) => ErrorKind::Unsupported,
            _ => ErrorKind::BadInput,
        }
    }
}
