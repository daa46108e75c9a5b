//! KMS-shaped signer adapter.
//!
//! KMS and HSM asymmetric-sign APIs return DER-encoded ECDSA signatures
//! with no recovery information and no low-`s` guarantee. This adapter
//! turns that opaque shape into the [`DigestSigner`] port: decode the DER,
//! normalize `s` per EIP-2, and compute `v` by verifying both recovery
//! candidates against the backend's known public key.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use super::signer::{DigestSigner, RecoverableSignature, SignerError};

/// Opaque signing backend: the shape of a KMS/HSM asymmetric-sign call.
///
/// Implementations may suspend on network calls; transient failures are
/// reported as [`SignerError::Transient`] so the submitter can retry.
pub trait DerSignatureProvider: Send + Sync {
    /// The backend key's uncompressed public key (65 bytes, `0x04` prefix).
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] on backend failure.
    fn public_key_uncompressed(&self) -> Result<[u8; 65], SignerError>;

    /// Signs a 32-byte digest, returning a DER-encoded ECDSA signature.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] on backend failure.
    fn sign_digest_der(&self, digest: &[u8; 32]) -> Result<Vec<u8>, SignerError>;
}

/// [`DigestSigner`] adapter over a [`DerSignatureProvider`].
pub struct KmsSigner<P> {
    provider: P,
    verifying_key: VerifyingKey,
    public_key: [u8; 65],
}

impl<P: DerSignatureProvider> KmsSigner<P> {
    /// Builds the adapter, fetching and caching the backend public key.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] if the backend key cannot be fetched or is
    /// not a valid secp256k1 point.
    pub fn new(provider: P) -> Result<Self, SignerError> {
        let public_key = provider.public_key_uncompressed()?;
        let verifying_key =
            VerifyingKey::from_sec1_bytes(&public_key).map_err(|_| SignerError::InvalidKey)?;
        Ok(Self {
            provider,
            verifying_key,
            public_key,
        })
    }
}

impl<P: DerSignatureProvider> DigestSigner for KmsSigner<P> {
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<RecoverableSignature, SignerError> {
        let der = self.provider.sign_digest_der(digest)?;
        let signature =
            Signature::from_der(&der).map_err(|e| SignerError::InvalidSignature {
                message: format!("DER decode failed: {e}"),
            })?;

        // EIP-2: emit only the low-s form. The backend is free to return
        // either half.
        let signature = signature.normalize_s().unwrap_or(signature);

        let recovery_id =
            RecoveryId::trial_recovery_from_prehash(&self.verifying_key, digest, &signature)
                .map_err(|_| SignerError::RecoveryFailed)?;
        if recovery_id.is_x_reduced() {
            return Err(SignerError::RecoveryFailed);
        }

        let bytes = signature.to_bytes();
        Ok(RecoverableSignature {
            r: hex::encode(&bytes[..32]),
            s: hex::encode(&bytes[32..]),
            v: 27 + u8::from(recovery_id.is_y_odd()),
        })
    }

    fn public_key_uncompressed(&self) -> Result<[u8; 65], SignerError> {
        Ok(self.public_key)
    }
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::SigningKey;
    use k256::elliptic_curve::scalar::IsHigh as _;

    use super::*;
    use crate::crypto::LocalSigner;

    /// Backend stub over a local key, optionally flipping `s` to the high
    /// half to mimic a non-normalizing HSM.
    struct StubProvider {
        key: SigningKey,
        emit_high_s: bool,
        fail_transiently: bool,
    }

    impl StubProvider {
        fn new(emit_high_s: bool) -> Self {
            Self {
                key: SigningKey::from_slice(&[0x42u8; 32]).unwrap(),
                emit_high_s,
                fail_transiently: false,
            }
        }
    }

    impl DerSignatureProvider for StubProvider {
        fn public_key_uncompressed(&self) -> Result<[u8; 65], SignerError> {
            let point = self.key.verifying_key().to_encoded_point(false);
            let mut out = [0u8; 65];
            out.copy_from_slice(point.as_bytes());
            Ok(out)
        }

        fn sign_digest_der(&self, digest: &[u8; 32]) -> Result<Vec<u8>, SignerError> {
            if self.fail_transiently {
                return Err(SignerError::Transient {
                    message: "throttled".to_string(),
                });
            }
            let (signature, _) = self
                .key
                .sign_prehash_recoverable(digest)
                .map_err(|e| SignerError::Signing {
                    message: e.to_string(),
                })?;
            let signature = if self.emit_high_s {
                let (r, s) = signature.split_scalars();
                Signature::from_scalars(r.to_bytes(), (-*s).to_bytes()).unwrap()
            } else {
                signature
            };
            Ok(signature.to_der().to_bytes().to_vec())
        }
    }

    #[test]
    fn test_adapter_matches_local_signer_bytes() {
        let digest = [5u8; 32];
        let kms = KmsSigner::new(StubProvider::new(false)).unwrap();
        let local = LocalSigner::from_bytes(&[0x42u8; 32]).unwrap();

        let a = kms.sign_digest(&digest).unwrap();
        let b = local.sign_digest(&digest).unwrap();
        assert_eq!(a.r, b.r);
        assert_eq!(a.s, b.s);
        assert_eq!(a.v, b.v);
    }

    #[test]
    fn test_high_s_backend_is_normalized() {
        let digest = [6u8; 32];
        let kms = KmsSigner::new(StubProvider::new(true)).unwrap();
        let signature = kms.sign_digest(&digest).unwrap();

        let mut sig_bytes = [0u8; 64];
        hex::decode_to_slice(format!("{}{}", signature.r, signature.s), &mut sig_bytes).unwrap();
        let parsed = Signature::from_slice(&sig_bytes).unwrap();
        assert_eq!(bool::from(parsed.s().is_high()), false);
        assert!(signature.v == 27 || signature.v == 28);

        // Normalized output is byte-identical to the honest backend's.
        let honest = KmsSigner::new(StubProvider::new(false)).unwrap();
        let reference = honest.sign_digest(&digest).unwrap();
        assert_eq!(signature, reference);
    }

    #[test]
    fn test_garbage_der_rejected() {
        let kms = KmsSigner::new(StubProvider::new(false)).unwrap();
        // Replace the provider's output path by signing then corrupting: a
        // direct garbage decode exercises the same branch.
        let garbage = Signature::from_der(&[0u8; 8]);
        assert!(garbage.is_err());
        // Adapter-level check via a provider that returns junk.
        struct JunkProvider(StubProvider);
        impl DerSignatureProvider for JunkProvider {
            fn public_key_uncompressed(&self) -> Result<[u8; 65], SignerError> {
                self.0.public_key_uncompressed()
            }
            fn sign_digest_der(&self, _digest: &[u8; 32]) -> Result<Vec<u8>, SignerError> {
                Ok(vec![0xde, 0xad, 0xbe, 0xef])
            }
        }
        let junk = KmsSigner::new(JunkProvider(StubProvider::new(false))).unwrap();
        assert!(matches!(
            junk.sign_digest(&[1u8; 32]),
            Err(SignerError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_transient_failure_propagates() {
        let mut provider = StubProvider::new(false);
        provider.fail_transiently = true;
        let kms = KmsSigner::new(provider).unwrap();
        let err = kms.sign_digest(&[1u8; 32]).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_foreign_key_signature_fails_recovery() {
        // Provider signs with a different key than the one it reports.
        struct LyingProvider {
            reported: StubProvider,
            actual: StubProvider,
        }
        impl DerSignatureProvider for LyingProvider {
            fn public_key_uncompressed(&self) -> Result<[u8; 65], SignerError> {
                self.reported.public_key_uncompressed()
            }
            fn sign_digest_der(&self, digest: &[u8; 32]) -> Result<Vec<u8>, SignerError> {
                self.actual.sign_digest_der(digest)
            }
        }
        let mut actual = StubProvider::new(false);
        actual.key = SigningKey::from_slice(&[0x77u8; 32]).unwrap();
        let kms = KmsSigner::new(LyingProvider {
            reported: StubProvider::new(false),
            actual,
        })
        .unwrap();
        assert!(matches!(
            kms.sign_digest(&[1u8; 32]),
            Err(SignerError::RecoveryFailed)
        ));
    }
}
