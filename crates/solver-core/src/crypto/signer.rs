//! The digest-signing port and the in-process secp256k1 signer.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest as _, Keccak256};
use thiserror::Error;

/// Errors from signer adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignerError {
    /// The key material is not a valid secp256k1 secret key.
    #[error("invalid signing key")]
    InvalidKey,

    /// The backend returned an invalid or undecodable signature.
    #[error("invalid signature from backend: {message}")]
    InvalidSignature {
        /// What failed to decode or verify.
        message: String,
    },

    /// The recovery id could not be determined against the known public key.
    #[error("signature does not recover to the signer's public key")]
    RecoveryFailed,

    /// The signing operation itself failed.
    #[error("signing failed: {message}")]
    Signing {
        /// Backend-reported reason.
        message: String,
    },

    /// A transient backend failure (network, throttling). The caller may
    /// retry; every other variant is permanent.
    #[error("transient signer backend failure: {message}")]
    Transient {
        /// Backend-reported reason.
        message: String,
    },
}

impl SignerError {
    /// True for failures a submitter may retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// A secp256k1 signature in recoverable `{r, s, v}` form.
///
/// `s` is always in the lower half of the curve order (EIP-2) and
/// `v ∈ {27, 28}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableSignature {
    /// Hex-encoded 32-byte `r` component.
    pub r: String,
    /// Hex-encoded 32-byte `s` component, low-half normalized.
    pub s: String,
    /// Recovery id plus 27.
    pub v: u8,
}

impl RecoverableSignature {
    fn from_parts(signature: &Signature, recovery_id: RecoveryId) -> Result<Self, SignerError> {
        if recovery_id.is_x_reduced() {
            // Astronomically unlikely with honest backends; reject rather
            // than emit a v outside {27, 28}.
            return Err(SignerError::RecoveryFailed);
        }
        let bytes = signature.to_bytes();
        Ok(Self {
            r: hex::encode(&bytes[..32]),
            s: hex::encode(&bytes[32..]),
            v: 27 + u8::from(recovery_id.is_y_odd()),
        })
    }
}

/// Port through which the receipt path signs a 32-byte digest.
pub trait DigestSigner: Send + Sync {
    /// Signs a 32-byte digest, returning a low-`s` recoverable signature.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] on backend failure or malleable output.
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<RecoverableSignature, SignerError>;

    /// The signer's uncompressed public key (65 bytes, `0x04` prefix).
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] if the backend cannot produce the key.
    fn public_key_uncompressed(&self) -> Result<[u8; 65], SignerError>;

    /// The signer's Ethereum-style address: keccak256 of the uncompressed
    /// public key body, low 20 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] if the public key cannot be produced.
    fn address(&self) -> Result<[u8; 20], SignerError> {
        Ok(ethereum_address(&self.public_key_uncompressed()?))
    }
}

/// Derives the address for an uncompressed secp256k1 public key.
#[must_use]
pub fn ethereum_address(uncompressed: &[u8; 65]) -> [u8; 20] {
    let digest = Keccak256::digest(&uncompressed[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}

/// In-process secp256k1 signer with RFC 6979 nonces.
pub struct LocalSigner {
    key: SigningKey,
}

impl LocalSigner {
    /// Builds a signer from a 32-byte secret key.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidKey`] if the bytes are not a valid
    /// secp256k1 scalar.
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, SignerError> {
        let key = SigningKey::from_slice(secret).map_err(|_| SignerError::InvalidKey)?;
        Ok(Self { key })
    }

    /// The verifying key for this signer.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        *self.key.verifying_key()
    }
}

impl DigestSigner for LocalSigner {
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<RecoverableSignature, SignerError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| SignerError::Signing {
                message: e.to_string(),
            })?;

        // RFC 6979 signing already yields low-s, but normalize anyway so a
        // malleable signature can never leave this adapter. Flipping s
        // negates the y parity of the recovered point.
        let (signature, recovery_id) = match signature.normalize_s() {
            Some(normalized) => (
                normalized,
                RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
            ),
            None => (signature, recovery_id),
        };

        RecoverableSignature::from_parts(&signature, recovery_id)
    }

    fn public_key_uncompressed(&self) -> Result<[u8; 65], SignerError> {
        let point = self.key.verifying_key().to_encoded_point(false);
        let bytes = point.as_bytes();
        let mut out = [0u8; 65];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}
