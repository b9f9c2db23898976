//! Error types for the loyalty protocol.

use stampcard_core::error::{StoreError, TransactionError};
use stampcard_core::ids::{BusinessId, CardId, ProgramId, UserId};
use thiserror::Error;

/// Result alias for loyalty operations.
pub type Result<T> = std::result::Result<T, LoyaltyError>;

/// Errors surfaced by loyalty operations.
///
/// Validation failures are never retried. Store failures keep their
/// provider classification; [`LoyaltyError::user_message`] turns any variant
/// into text fit for an end user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoyaltyError {
    /// The customer already holds an active card for the program.
    #[error("Customer {customer_id} is already enrolled in program {program_id}")]
    AlreadyEnrolled {
        /// Customer.
        customer_id: UserId,
        /// Program.
        program_id: ProgramId,
    },

    /// The card's reward has already been claimed.
    #[error("Reward for card {0} was already redeemed")]
    AlreadyRedeemed(CardId),

    /// The card has fewer stamps than the program requires.
    #[error("Card {card_id} has {stamps} of {required} stamps")]
    InsufficientStamps {
        /// Card.
        card_id: CardId,
        /// Current stamps.
        stamps: u32,
        /// Stamps required.
        required: u32,
    },

    /// No such card.
    #[error("Card not found: {0}")]
    CardNotFound(CardId),

    /// No such program.
    #[error("Loyalty program not found: {0}")]
    ProgramNotFound(ProgramId),

    /// No such business.
    #[error("Business not found: {0}")]
    BusinessNotFound(BusinessId),

    /// The program no longer accepts enrollments.
    #[error("Loyalty program {0} is inactive")]
    ProgramInactive(ProgramId),

    /// The card does not belong to the customer, business or program given.
    #[error("Card {0} does not match the given customer, business or program")]
    CardMismatch(CardId),

    /// The signed-in user does not own the card.
    #[error("User {user_id} does not own card {card_id}")]
    NotCardOwner {
        /// Card.
        card_id: CardId,
        /// Signed-in user.
        user_id: UserId,
    },

    /// The signed-in user does not manage the business.
    #[error("User {user_id} does not manage business {business_id}")]
    NotBusinessOwner {
        /// Business.
        business_id: BusinessId,
        /// Signed-in user.
        user_id: UserId,
    },

    /// No user is signed in.
    #[error("No signed-in user")]
    Unauthenticated,

    /// A program definition was rejected.
    #[error("Invalid loyalty program: {0}")]
    InvalidProgram(String),

    /// A business definition was rejected.
    #[error("Invalid business: {0}")]
    InvalidBusiness(String),

    /// No free code was found within the attempt ceiling.
    #[error("No free code for business {business_id} after {attempts} attempts")]
    CodeGenerationExhausted {
        /// Business.
        business_id: BusinessId,
        /// Codes drawn.
        attempts: u32,
    },

    /// Every enrollment attempt lost its code to a concurrent enrollment.
    #[error("Enrollment gave up after {attempts} code collisions")]
    EnrollmentContention {
        /// Attempts made.
        attempts: usize,
    },

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LoyaltyError {
    /// Text suitable for showing to an end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::AlreadyEnrolled { .. } => "You already have a card for this program.".to_string(),
            Self::AlreadyRedeemed(_) => "This reward has already been redeemed.".to_string(),
            Self::InsufficientStamps { stamps, required, .. } => {
                format!("This card has {stamps} of {required} stamps. Keep collecting!")
            },
            Self::CardNotFound(_) => "This card could not be found.".to_string(),
            Self::ProgramNotFound(_) => "This loyalty program could not be found.".to_string(),
            Self::BusinessNotFound(_) => "This business could not be found.".to_string(),
            Self::ProgramInactive(_) => "This loyalty program is no longer accepting new members.".to_string(),
            Self::CardMismatch(_) => "This card does not belong to this business.".to_string(),
            Self::NotCardOwner { .. } => "You can only delete your own cards.".to_string(),
            Self::NotBusinessOwner { .. } => "Only the business owner can do that.".to_string(),
            Self::Unauthenticated => "Please sign in and try again.".to_string(),
            Self::InvalidProgram(reason) | Self::InvalidBusiness(reason) => reason.clone(),
            Self::CodeGenerationExhausted { .. } | Self::EnrollmentContention { .. } => {
                "We couldn't create your card right now. Please try again.".to_string()
            },
            Self::Store(err) => store_message(err).to_string(),
        }
    }

    /// Whether the caller may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_transient(),
            Self::EnrollmentContention { .. } => true,
            _ => false,
        }
    }
}

/// Shared translation of provider failures into user-facing text.
const fn store_message(err: &StoreError) -> &'static str {
    match err {
        StoreError::PermissionDenied(_) => "You don't have permission to do that.",
        StoreError::Unauthenticated(_) => "Please sign in and try again.",
        StoreError::NotFound(_) => "The requested item could not be found.",
        StoreError::Unavailable(_) => "The service is temporarily unavailable. Please try again.",
        StoreError::ResourceExhausted(_) => "Too many requests. Please wait a moment and try again.",
        StoreError::DeadlineExceeded(_) => "The request timed out. Please try again.",
        StoreError::FailedPrecondition(_) => "This action can't be completed right now.",
        StoreError::Cancelled(_) => "The request was cancelled.",
        StoreError::Aborted(_) => "Someone else updated this at the same time. Please try again.",
        StoreError::Decode { .. } | StoreError::Internal(_) => "Something went wrong. Please try again later.",
    }
}

impl TransactionError for LoyaltyError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_conflict())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_failures_share_one_translation() {
        let denied = LoyaltyError::from(StoreError::PermissionDenied("rules".into()));
        assert_eq!(denied.user_message(), "You don't have permission to do that.");
        assert!(!denied.is_retryable());

        let unavailable = LoyaltyError::from(StoreError::Unavailable("down".into()));
        assert!(unavailable.is_retryable());
        assert!(LoyaltyError::from(StoreError::DeadlineExceeded("slow".into())).is_retryable());
    }

    #[test]
    fn validation_failures_are_not_retryable() {
        let err = LoyaltyError::InsufficientStamps {
            card_id: CardId::new("c1"),
            stamps: 2,
            required: 5,
        };
        assert!(!err.is_retryable());
        assert!(err.user_message().contains("2 of 5"));
        assert!(!LoyaltyError::AlreadyRedeemed(CardId::new("c1")).is_conflict());
    }

    #[test]
    fn only_store_aborts_count_as_conflicts() {
        assert!(LoyaltyError::from(StoreError::Aborted("race".into())).is_conflict());
        assert!(!LoyaltyError::from(StoreError::Cancelled("nav".into())).is_conflict());
    }
}
