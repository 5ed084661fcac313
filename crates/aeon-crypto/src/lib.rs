//! BLS12-381 threshold signature primitives for the Aeon beacon.
//!
//! Signatures live in G1, public keys and verification vectors in G2.
//! Each cabinet member contributes a random polynomial via Feldman-style
//! verifiable secret sharing; the [`ThresholdKeyManager`] accumulates the
//! contributions into a secret share, the shared group public key, and
//! per-member public key shares used to check partial signatures.

pub mod error;
pub mod manager;
pub mod polynomial;
pub mod primitives;

pub use error::{CryptoError, CryptoResult};
pub use manager::ThresholdKeyManager;
pub use polynomial::{
    evaluate_polynomial, lagrange_coefficient, random_polynomial, recover_signature,
    verify_share, VerificationVector,
};
pub use primitives::{
    hash_to_g1, random_scalar, verify_signature, PublicKey, SecretShare, Signature,
    PUBLIC_KEY_LENGTH, SECRET_SHARE_LENGTH, SIGNATURE_LENGTH,
};
