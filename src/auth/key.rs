use base64::{Engine, engine::general_purpose::STANDARD};
use rsa::{
    RsaPublicKey, pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, traits::PublicKeyParts,
};
use thiserror::Error;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

/// Decoded key material shorter than this cannot hold a usable key.
pub const MIN_KEY_BYTES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyMaterialError {
    #[error("public key revoked (empty p=)")]
    Revoked,
    #[error("public key is not valid base64: {reason}")]
    Base64 { reason: String },
    #[error("public key too short ({len} bytes, minimum {MIN_KEY_BYTES})")]
    TooShort { len: usize },
}

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySizeSource {
    /// Modulus length read from the DER-encoded RSA key.
    Exact,
    /// Banded guess from the decoded length; not cryptographic ground truth.
    Estimated,
}

#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStrength {
    pub bits: u32,
    pub source: KeySizeSource,
}

/// Strip whitespace from a `p=` value and base64-decode it.
pub fn decode_key_material(p: &str) -> Result<Vec<u8>, KeyMaterialError> {
    let cleaned: String = p.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(KeyMaterialError::Revoked);
    }
    let decoded = STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|err| KeyMaterialError::Base64 {
            reason: err.to_string(),
        })?;
    if decoded.len() < MIN_KEY_BYTES {
        return Err(KeyMaterialError::TooShort { len: decoded.len() });
    }
    Ok(decoded)
}

pub fn rsa_key_strength(der: &[u8]) -> KeyStrength {
    match exact_rsa_bits(der) {
        Some(bits) => KeyStrength {
            bits,
            source: KeySizeSource::Exact,
        },
        None => KeyStrength {
            bits: estimate_rsa_bits(der.len()),
            source: KeySizeSource::Estimated,
        },
    }
}

/// DKIM publishes SubjectPublicKeyInfo, a few signers publish bare PKCS#1.
fn exact_rsa_bits(der: &[u8]) -> Option<u32> {
    let key = RsaPublicKey::from_public_key_der(der)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(der))
        .ok()?;
    u32::try_from(key.n().bits()).ok()
}

pub fn estimate_rsa_bits(decoded_len: usize) -> u32 {
    match decoded_len {
        len if len > 400 => 4096,
        len if len > 250 => 2048,
        len if len > 150 => 1024,
        _ => 512,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// SubjectPublicKeyInfo of a 1024-bit RSA key.
    pub const RSA_1024_SPKI: &str = "MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQDAU13qfiE3v29KB14N84Tsp2Fku3cOT47PjaRID8gKONgRXzLX4ewefSVWdmz5yQoTjQCpMFQsqa9GXHyGvBWyIb7LB1wjxg6kDuO7AWY2Me1KdsxR2oby/JmRzvdXfIkRVkYA91UlMk8MZfNqFSIANNrLPT2bZlMerN/j75xqFQIDAQAB";

    /// SubjectPublicKeyInfo of a 2048-bit RSA key.
    pub const RSA_2048_SPKI: &str = "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAuem5v++1dLu7MFljNgWSXwOF3qKzifn41iP4T4KivdxywhTEOGtPLIts6R1z3zYztqI9q1n19bmpSY9XEQyV3GzsFVtvD0g5ngDUBrNAQ1Y87ePXpRKD2hm9q+tnbhnla7AEiOR8J/xbnCdsOBr0FKx5zRK6YNCG+gBvo95iYcDYh9ais02Lb+Fg1Rqc4wLnjRUNJoiRMiwhcN1Mw94Yr+RJ9VQET3mPS5702yNfI8PQv/j3vd5T0FNbQlrdOqV3/okIfS8m6wWSR6NfHyLPdAJDZMSrMi60IqjhxbCyRtdRjTOhNdw3OyyqKM+VhofemkmWq6UUG3Z2qpQRdOgJLQIDAQAB";

    /// Same 1024-bit key as bare PKCS#1 `RSAPublicKey`.
    pub const RSA_1024_PKCS1: &str = "MIGJAoGBAMBTXep+ITe/b0oHXg3zhOynYWS7dw5Pjs+NpEgPyAo42BFfMtfh7B59JVZ2bPnJChONAKkwVCypr0ZcfIa8FbIhvssHXCPGDqQO47sBZjYx7Up2zFHahvL8mZHO91d8iRFWRgD3VSUyTwxl82oVIgA02ss9PZtmUx6s3+PvnGoVAgMBAAE=";

    /// Base64 of `len` bytes that do not form a DER structure.
    pub fn opaque_key(len: usize) -> String {
        use base64::{Engine, engine::general_purpose::STANDARD};
        STANDARD.encode(vec![0xA5u8; len])
    }
}
