//! Curve points, scalars, and the pairing check.

use bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use bls12_381::{pairing, G1Affine, G1Projective, G2Affine, Scalar};
use group::Curve;
use rand_core::{CryptoRng, RngCore};
// The hash-to-curve expansion in bls12_381 is bound to the digest 0.9
// traits, which this renamed sha2 release still implements.
use sha2_v09::Sha256;

use crate::error::{CryptoError, CryptoResult};

/// Compressed G1 point length, the size of a signature.
pub const SIGNATURE_LENGTH: usize = 48;
/// Compressed G2 point length, the size of a public key.
pub const PUBLIC_KEY_LENGTH: usize = 96;
/// Scalar length, the size of a secret share.
pub const SECRET_SHARE_LENGTH: usize = 32;

/// Domain separation tag for hashing round seeds into G1.
const HASH_TO_G1_DST: &[u8] = b"AEON_BEACON_BLS12381G1_XMD:SHA-256_SSWU_RO_";

/// A BLS signature or partial signature, a point in G1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub(crate) G1Affine);

impl Signature {
    /// Compressed encoding.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.0.to_compressed()
    }

    /// Decode a compressed G1 point, rejecting off-curve bytes.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: &[u8; SIGNATURE_LENGTH] =
            bytes.try_into().map_err(|_| CryptoError::InvalidPoint)?;
        Option::<G1Affine>::from(G1Affine::from_compressed(arr))
            .map(Self)
            .ok_or(CryptoError::InvalidPoint)
    }
}

/// A group or member public key, a point in G2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(pub(crate) G2Affine);

impl PublicKey {
    /// Compressed encoding.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.0.to_compressed()
    }

    /// Decode a compressed G2 point, rejecting off-curve bytes.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: &[u8; PUBLIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| CryptoError::InvalidPoint)?;
        Option::<G2Affine>::from(G2Affine::from_compressed(arr))
            .map(Self)
            .ok_or(CryptoError::InvalidPoint)
    }
}

/// One polynomial evaluation destined for a single member. Secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretShare(pub(crate) Scalar);

impl SecretShare {
    /// Little-endian scalar encoding.
    pub fn to_bytes(&self) -> [u8; SECRET_SHARE_LENGTH] {
        self.0.to_bytes()
    }

    /// Decode a scalar, rejecting non-canonical encodings.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: &[u8; SECRET_SHARE_LENGTH] =
            bytes.try_into().map_err(|_| CryptoError::InvalidScalar)?;
        Option::<Scalar>::from(Scalar::from_bytes(arr))
            .map(Self)
            .ok_or(CryptoError::InvalidScalar)
    }
}

/// Hash an arbitrary message onto G1 with a fixed domain tag.
pub fn hash_to_g1(message: &[u8]) -> G1Projective {
    <G1Projective as HashToCurve<ExpandMsgXmd<Sha256>>>::hash_to_curve(message, HASH_TO_G1_DST)
}

/// Sample a uniform scalar via wide reduction.
pub fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    let mut bytes = [0u8; 64];
    rng.fill_bytes(&mut bytes);
    Scalar::from_bytes_wide(&bytes)
}

/// Check `e(sig, g2) == e(H(message), pk)`.
///
/// Used both for the recovered group signature against the group public
/// key and for partial signatures against per-member public key shares.
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let hashed = hash_to_g1(message).to_affine();
    pairing(&signature.0, &G2Affine::generator()) == pairing(&hashed, &public_key.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn signature_roundtrip_and_reject_garbage() {
        let sk = random_scalar(&mut OsRng);
        let sig = Signature((hash_to_g1(b"round 0") * sk).to_affine());
        let decoded = Signature::from_bytes(&sig.to_bytes()).unwrap();
        assert_eq!(sig, decoded);

        assert_eq!(
            Signature::from_bytes(&[0xffu8; SIGNATURE_LENGTH]),
            Err(CryptoError::InvalidPoint)
        );
        assert_eq!(Signature::from_bytes(&[0u8; 4]), Err(CryptoError::InvalidPoint));
    }

    #[test]
    fn plain_bls_sign_verify() {
        let sk = random_scalar(&mut OsRng);
        let pk = PublicKey((bls12_381::G2Projective::generator() * sk).to_affine());
        let sig = Signature((hash_to_g1(b"seed") * sk).to_affine());

        assert!(verify_signature(&pk, b"seed", &sig));
        assert!(!verify_signature(&pk, b"other seed", &sig));
    }

    #[test]
    fn hash_to_g1_is_deterministic() {
        assert_eq!(hash_to_g1(b"x"), hash_to_g1(b"x"));
        assert_ne!(hash_to_g1(b"x"), hash_to_g1(b"y"));
    }

    #[test]
    fn hashed_seeds_land_on_the_curve() {
        let point = hash_to_g1(b"=~=~ Aeon Genesis ~=~=").to_affine();
        assert!(!bool::from(point.is_identity()));
        assert!(Signature::from_bytes(&point.to_compressed()).is_ok());
    }
}
