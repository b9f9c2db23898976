//! Enrollment: one card per customer and program, with a unique code.
//!
//! The code is drawn outside the transaction and re-checked inside it. If a
//! concurrent enrollment reserved the same code in between, the attempt ends
//! with an internal `CodeTaken` signal and a fresh code is drawn, up to the
//! configured number of attempts. The enrollment guard document keyed by
//! customer and program is read inside the same transaction, so two
//! concurrent enrollments for one pair conflict in the store instead of both
//! passing the precondition query.

use crate::error::{LoyaltyError, Result};
use crate::events::LoyaltyEvent;
use crate::model::{Business, CodeReservation, CustomerCard, EnrollmentGuard, LoyaltyProgram, fields};
use crate::paths;
use crate::service::{LoyaltyService, read};
use stampcard_core::document::{Fields, Query};
use stampcard_core::error::{StoreError, TransactionError};
use stampcard_core::ids::{CardId, ProgramId, UserId};
use stampcard_core::store::{Transaction, run_atomic};
use stampcard_runtime::metrics::ProtocolMetrics;
use stampcard_runtime::retry::retry_with_predicate;
use std::sync::Arc;
use thiserror::Error;

/// Failure of one enrollment attempt.
#[derive(Error, Debug)]
enum EnrollFailure {
    #[error("Code {0} was reserved by a concurrent enrollment")]
    CodeTaken(String),

    #[error(transparent)]
    Loyalty(#[from] LoyaltyError),
}

impl From<StoreError> for EnrollFailure {
    fn from(err: StoreError) -> Self {
        Self::Loyalty(LoyaltyError::Store(err))
    }
}

impl TransactionError for EnrollFailure {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Loyalty(err) if err.is_conflict())
    }
}

impl LoyaltyService {
    /// Enroll a customer in a program.
    ///
    /// Returns the new card with zero stamps and a code unique among the
    /// business's active cards.
    ///
    /// # Errors
    ///
    /// - [`LoyaltyError::AlreadyEnrolled`] if the customer holds an active card for the program
    /// - [`LoyaltyError::ProgramNotFound`], [`LoyaltyError::ProgramInactive`], [`LoyaltyError::BusinessNotFound`]
    /// - [`LoyaltyError::CodeGenerationExhausted`] if the business has no free code
    /// - [`LoyaltyError::EnrollmentContention`] if every attempt lost its code to a concurrent enrollment
    /// - [`LoyaltyError::Store`] for store failures, never retried here
    #[tracing::instrument(skip(self, customer_name))]
    pub async fn enroll(&self, customer_id: &UserId, customer_name: &str, program_id: &ProgramId) -> Result<CustomerCard> {
        let existing = self
            .store()
            .query(
                &Query::collection(paths::CUSTOMER_CARDS)
                    .where_eq(fields::CUSTOMER_ID, customer_id.as_str())
                    .where_eq(fields::PROGRAM_ID, program_id.as_str())
                    .where_eq(fields::REWARD_CLAIMED, false),
            )
            .await?;
        if !existing.is_empty() {
            return Err(LoyaltyError::AlreadyEnrolled {
                customer_id: customer_id.clone(),
                program_id: program_id.clone(),
            });
        }

        let program: LoyaltyProgram = self
            .fetch(&paths::program(program_id))
            .await?
            .ok_or_else(|| LoyaltyError::ProgramNotFound(program_id.clone()))?;
        if !program.is_active {
            return Err(LoyaltyError::ProgramInactive(program_id.clone()));
        }
        let business: Business = self
            .fetch(&paths::business(&program.business_id))
            .await?
            .ok_or_else(|| LoyaltyError::BusinessNotFound(program.business_id.clone()))?;

        let outcome = retry_with_predicate(
            &self.enrollment_retry,
            || self.attempt_enrollment(customer_id, customer_name, &program),
            |err| matches!(err, EnrollFailure::CodeTaken(_)),
        )
        .await;

        let card = match outcome {
            Ok(card) => card,
            Err(EnrollFailure::CodeTaken(_)) => {
                return Err(LoyaltyError::EnrollmentContention {
                    attempts: self.enrollment_retry.max_attempts(),
                });
            },
            Err(EnrollFailure::Loyalty(err)) => return Err(err),
        };

        ProtocolMetrics::record_enrollment();
        tracing::info!(card_id = %card.id, code = %card.code, "Customer enrolled");
        self.emit(LoyaltyEvent::CardEnrolled {
            card: card.clone(),
            business_name: business.name,
        });
        Ok(card)
    }

    async fn attempt_enrollment(
        &self,
        customer_id: &UserId,
        customer_name: &str,
        program: &LoyaltyProgram,
    ) -> std::result::Result<CustomerCard, EnrollFailure> {
        let code = self
            .codes
            .generate(&program.business_id, |code, business_id| {
                let store = Arc::clone(&self.env.store);
                async move {
                    let path = paths::code_reservation(&business_id, &code);
                    Ok(store.get(&path).await?.is_some())
                }
            })
            .await?;

        let card = CustomerCard {
            id: CardId::new(self.next_id().into_inner()),
            customer_id: customer_id.clone(),
            program_id: program.id.clone(),
            business_id: program.business_id.clone(),
            stamps: 0,
            reward_claimed: false,
            claimed_at: None,
            code,
            customer_name: customer_name.to_string(),
            created_at: self.env.clock.now(),
            last_stamp_at: None,
        };

        run_atomic(self.store(), self.transaction, |tx| Box::pin(reserve_and_create(tx, card.clone()))).await
    }
}

async fn reserve_and_create(
    tx: &mut dyn Transaction,
    card: CustomerCard,
) -> std::result::Result<CustomerCard, EnrollFailure> {
    let guard_path = paths::enrollment_guard(&card.customer_id, &card.program_id);
    if read::<EnrollmentGuard>(tx, &guard_path).await?.is_some() {
        return Err(LoyaltyError::AlreadyEnrolled {
            customer_id: card.customer_id.clone(),
            program_id: card.program_id.clone(),
        }
        .into());
    }

    let reservation_path = paths::code_reservation(&card.business_id, &card.code);
    if tx.get(&reservation_path).await?.is_some() {
        tracing::debug!(code = %card.code, "Code taken since it was drawn");
        return Err(EnrollFailure::CodeTaken(card.code.clone()));
    }

    let reservation = CodeReservation {
        customer_id: card.customer_id.clone(),
        card_id: card.id.clone(),
        created_at: card.created_at,
    };
    let guard = EnrollmentGuard {
        card_id: card.id.clone(),
        created_at: card.created_at,
    };
    tx.set(reservation_path, Fields::from_serializable(&reservation)?);
    tx.set(guard_path, Fields::from_serializable(&guard)?);
    tx.set(paths::card(&card.id), Fields::from_serializable(&card)?);
    Ok(card)
}
