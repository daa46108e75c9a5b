//! Digest signing ports for receipt emission.
//!
//! The pipeline signs the 32-byte manifest digest through the
//! [`DigestSigner`] port and never sees key material. Two adapters exist:
//!
//! - [`LocalSigner`]: an in-process secp256k1 signer with RFC 6979 nonces,
//!   used by tests and single-host deployments.
//! - [`KmsSigner`]: wraps an opaque backend that returns DER-encoded ECDSA
//!   signatures (the shape of KMS/HSM asymmetric-sign APIs). The adapter
//!   decodes the DER, normalizes `s` to the lower half of the curve order,
//!   and recovers `v` by trying both candidates against the known public
//!   key.
//!
//! Signing output is not required to be deterministic between signers, but
//! malleable (high-`s`) signatures are never emitted: every adapter
//! normalizes per EIP-2. Nonces come from RFC 6979 or the HSM; no other
//! entropy exists in the pipeline.

mod kms;
mod signer;

pub use kms::{DerSignatureProvider, KmsSigner};
pub use signer::{
    ethereum_address, DigestSigner, LocalSigner, RecoverableSignature, SignerError,
};

/// Size of the digests this port signs.
pub const DIGEST_SIZE: usize = 32;
