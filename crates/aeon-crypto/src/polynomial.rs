//! Polynomial secret sharing and Lagrange recovery.
//!
//! Each dealer samples a random polynomial of degree t-1 over the scalar
//! field and publishes commitments to its coefficients in G2 (a Feldman
//! verification vector). The share for participant j is f(j); any t
//! distinct evaluations recover f(0) by interpolation, and the same
//! coefficients recover the group signature from t partial signatures.

use std::collections::BTreeSet;

use bls12_381::{G1Projective, G2Projective, Scalar};
use ff::Field;
use group::Curve;
use rand_core::{CryptoRng, RngCore};

use aeon_core::ParticipantId;

use crate::error::{CryptoError, CryptoResult};
use crate::primitives::{random_scalar, SecretShare, Signature, PUBLIC_KEY_LENGTH};

/// Sample a random polynomial with `threshold` coefficients.
///
/// All coefficients are uniform; the constant term is this dealer's
/// contribution to the group secret.
pub fn random_polynomial<R: RngCore + CryptoRng>(threshold: u32, rng: &mut R) -> Vec<Scalar> {
    (0..threshold).map(|_| random_scalar(rng)).collect()
}

/// Evaluate `f(x)` by Horner's method.
pub fn evaluate_polynomial(coefficients: &[Scalar], x: &Scalar) -> Scalar {
    let mut result = Scalar::ZERO;
    for coeff in coefficients.iter().rev() {
        result = result * x + coeff;
    }
    result
}

/// Commitments `V_k = g2 * a_k` to a dealer's polynomial coefficients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationVector(Vec<G2Projective>);

impl VerificationVector {
    /// Commit to every coefficient of a polynomial.
    pub fn from_coefficients(coefficients: &[Scalar]) -> Self {
        Self(
            coefficients
                .iter()
                .map(|coeff| G2Projective::generator() * coeff)
                .collect(),
        )
    }

    /// Number of commitments, equal to the dealer's threshold.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the vector holds no commitments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The commitment to the constant term, this dealer's contribution to
    /// the group public key.
    pub fn constant_term(&self) -> G2Projective {
        self.0.first().copied().unwrap_or_else(G2Projective::identity)
    }

    /// Evaluate the committed polynomial in the exponent:
    /// `sum_k V_k * id^k == g2 * f(id)`.
    pub fn evaluate(&self, id: ParticipantId) -> G2Projective {
        let x = Scalar::from(id.value());
        let mut x_power = Scalar::ONE;
        let mut acc = G2Projective::identity();
        for commitment in &self.0 {
            acc += commitment * x_power;
            x_power *= x;
        }
        acc
    }

    /// Wire form: one compressed G2 point per commitment.
    pub fn to_bytes(&self) -> Vec<Vec<u8>> {
        self.0
            .iter()
            .map(|point| point.to_affine().to_compressed().to_vec())
            .collect()
    }

    /// Decode the wire form, rejecting off-curve or mis-sized points.
    pub fn from_bytes(chunks: &[Vec<u8>]) -> CryptoResult<Self> {
        let mut commitments = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let arr: &[u8; PUBLIC_KEY_LENGTH] =
                chunk.as_slice().try_into().map_err(|_| CryptoError::InvalidPoint)?;
            let point = Option::<bls12_381::G2Affine>::from(
                bls12_381::G2Affine::from_compressed(arr),
            )
            .ok_or(CryptoError::InvalidPoint)?;
            commitments.push(G2Projective::from(point));
        }
        Ok(Self(commitments))
    }
}

/// Check a share against its dealer's verification vector:
/// `g2 * share == sum_k V_k * id^k`.
pub fn verify_share(share: &SecretShare, id: ParticipantId, vector: &VerificationVector) -> bool {
    G2Projective::generator() * share.0 == vector.evaluate(id)
}

/// Lagrange coefficient at zero for index `i` within `indices`.
pub fn lagrange_coefficient(i: u64, indices: &[u64]) -> CryptoResult<Scalar> {
    let i_scalar = Scalar::from(i);
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;

    for &j in indices {
        if j == i {
            continue;
        }
        let j_scalar = Scalar::from(j);
        numerator *= j_scalar;
        denominator *= j_scalar - i_scalar;
    }

    let inverted = Option::<Scalar>::from(denominator.invert()).ok_or(CryptoError::LagrangeFailed)?;
    Ok(numerator * inverted)
}

/// Recover the group signature from partial signatures by interpolating
/// at zero: `sigma = sum_i lambda_i * sigma_i`.
///
/// Any set of exactly `threshold` distinct, individually verified shares
/// yields the same group signature; callers pass a quorum-sized subset.
pub fn recover_signature(
    shares: &[(ParticipantId, Signature)],
    threshold: usize,
) -> CryptoResult<Signature> {
    if shares.len() < threshold {
        return Err(CryptoError::InsufficientShares {
            required: threshold,
            got: shares.len(),
        });
    }

    let indices: Vec<u64> = shares.iter().map(|(id, _)| id.value()).collect();
    let distinct: BTreeSet<u64> = indices.iter().copied().collect();
    if distinct.len() != indices.len() {
        return Err(CryptoError::DuplicateShareIndex);
    }

    let mut acc = G1Projective::identity();
    for (id, sig) in shares {
        let lambda = lagrange_coefficient(id.value(), &indices)?;
        acc += G1Projective::from(sig.0) * lambda;
    }
    Ok(Signature(acc.to_affine()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn id(v: u64) -> ParticipantId {
        ParticipantId::new(v).unwrap()
    }

    #[test]
    fn polynomial_evaluation_matches_direct_form() {
        // f(x) = 5 + 3x + 2x^2
        let coeffs = vec![Scalar::from(5u64), Scalar::from(3u64), Scalar::from(2u64)];
        assert_eq!(evaluate_polynomial(&coeffs, &Scalar::ZERO), Scalar::from(5u64));
        assert_eq!(evaluate_polynomial(&coeffs, &Scalar::ONE), Scalar::from(10u64));
        assert_eq!(
            evaluate_polynomial(&coeffs, &Scalar::from(2u64)),
            Scalar::from(19u64)
        );
    }

    #[test]
    fn shares_verify_against_commitments() {
        let coeffs = random_polynomial(3, &mut OsRng);
        let vector = VerificationVector::from_coefficients(&coeffs);

        for j in 1..=5u64 {
            let share = SecretShare(evaluate_polynomial(&coeffs, &Scalar::from(j)));
            assert!(verify_share(&share, id(j), &vector));
        }

        let bogus = SecretShare(random_scalar(&mut OsRng));
        assert!(!verify_share(&bogus, id(1), &vector));
    }

    #[test]
    fn verification_vector_wire_roundtrip() {
        let coeffs = random_polynomial(2, &mut OsRng);
        let vector = VerificationVector::from_coefficients(&coeffs);
        let decoded = VerificationVector::from_bytes(&vector.to_bytes()).unwrap();
        assert_eq!(vector, decoded);

        let mut chunks = vector.to_bytes();
        chunks[0] = vec![0xff; PUBLIC_KEY_LENGTH];
        assert_eq!(
            VerificationVector::from_bytes(&chunks),
            Err(CryptoError::InvalidPoint)
        );
    }

    #[test]
    fn lagrange_coefficients_sum_to_one() {
        let indices = vec![1u64, 2, 3];
        let sum: Scalar = indices
            .iter()
            .map(|&i| lagrange_coefficient(i, &indices).unwrap())
            .sum();
        assert_eq!(sum, Scalar::ONE);
    }

    #[test]
    fn recovery_needs_distinct_quorum() {
        let sig = Signature(G1Projective::generator().to_affine());
        assert_eq!(
            recover_signature(&[(id(1), sig)], 2),
            Err(CryptoError::InsufficientShares { required: 2, got: 1 })
        );
        assert_eq!(
            recover_signature(&[(id(1), sig), (id(1), sig)], 2),
            Err(CryptoError::DuplicateShareIndex)
        );
    }
}
