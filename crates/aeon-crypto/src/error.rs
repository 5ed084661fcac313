//! Errors raised by the threshold crypto layer.

/// Errors during share handling, key assembly, and signing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Bytes did not decode to a valid curve point.
    #[error("invalid curve point encoding")]
    InvalidPoint,

    /// Bytes did not decode to a valid field element.
    #[error("invalid scalar encoding")]
    InvalidScalar,

    /// A verification vector had the wrong number of commitments.
    #[error("verification vector has {got} commitments, expected {expected}")]
    WrongVectorLength {
        /// Commitments required (the threshold)
        expected: usize,
        /// Commitments received
        got: usize,
    },

    /// A share failed verification against its verification vector.
    #[error("share does not match verification vector")]
    InvalidShare,

    /// Operation referenced an identity that was never registered.
    #[error("unknown cabinet member")]
    UnknownMember,

    /// A member was registered twice with different details, or two
    /// members claimed the same participant index.
    #[error("conflicting member registration")]
    ConflictingRegistration,

    /// More members registered than the cabinet holds.
    #[error("cabinet is already fully registered")]
    CabinetFull,

    /// A dealer submitted two different shares.
    #[error("conflicting share from the same dealer")]
    ConflictingShare,

    /// Not enough shares to proceed.
    #[error("have {got} shares, need {required}")]
    InsufficientShares {
        /// Shares required
        required: usize,
        /// Shares available
        got: usize,
    },

    /// The same participant index appeared twice in a recovery set.
    #[error("duplicate participant index in share set")]
    DuplicateShareIndex,

    /// Lagrange interpolation hit a zero denominator.
    #[error("lagrange interpolation failed")]
    LagrangeFailed,

    /// A share that passed verification on receipt failed re-validation
    /// during key assembly. Local state is corrupt.
    #[error("stored share failed re-validation")]
    RevalidationFailed,

    /// Signing or verification requested before key generation finished.
    #[error("threshold keys not generated yet")]
    KeysNotGenerated,

    /// Contribution requested before the member set was complete, or a
    /// share requested before the contribution was generated.
    #[error("contribution not available: {0}")]
    ContributionUnavailable(&'static str),
}

/// Result alias for crypto operations.
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
