//! Stamping: add one or more stamps to a card, capped at the program's slots.
//!
//! The increment itself is the store's commutative increment, so concurrent
//! stampings of one card never lose an update. The cap is computed from the
//! card read inside the transaction; if a concurrent stamp changes the card
//! before commit, the transaction re-executes against the new count.

use crate::error::{LoyaltyError, Result};
use crate::events::LoyaltyEvent;
use crate::model::{Business, CustomerCard, LoyaltyProgram, StampEvent, fields};
use crate::paths;
use crate::service::{LoyaltyService, read};
use stampcard_core::document::Fields;
use stampcard_core::environment::{Clock, IdGenerator};
use stampcard_core::ids::{BusinessId, CardId, ProgramId, UserId};
use stampcard_core::store::{Transaction, run_atomic};
use stampcard_runtime::metrics::ProtocolMetrics;
use std::sync::Arc;

/// Stamps to grant to one card.
///
/// The customer, business and program must match the card; they are what
/// the merchant's device believes it is stamping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampRequest {
    /// Card to stamp.
    pub card_id: CardId,
    /// Expected card holder.
    pub customer_id: UserId,
    /// Business granting the stamps.
    pub business_id: BusinessId,
    /// Expected program.
    pub program_id: ProgramId,
    /// Stamps requested; zero is treated as one.
    pub count: u32,
}

impl StampRequest {
    /// A single-stamp request.
    #[must_use]
    pub const fn new(card_id: CardId, customer_id: UserId, business_id: BusinessId, program_id: ProgramId) -> Self {
        Self {
            card_id,
            customer_id,
            business_id,
            program_id,
            count: 1,
        }
    }

    /// Request for the stamps of `card`.
    #[must_use]
    pub fn for_card(card: &CustomerCard) -> Self {
        Self::new(
            card.id.clone(),
            card.customer_id.clone(),
            card.business_id.clone(),
            card.program_id.clone(),
        )
    }

    /// Ask for `count` stamps at once.
    #[must_use]
    pub const fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }
}

/// Result of a committed stamping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampOutcome {
    /// Stamped card.
    pub card_id: CardId,
    /// Stamps actually added (zero when the card was already full).
    pub stamps_added: u32,
    /// Stamps on the card after the commit.
    pub current_stamps: u32,
    /// Slots of the program.
    pub total_slots: u32,
    /// Whether the card is full.
    pub is_completed: bool,
}

/// What the transaction saw, for the post-commit event.
struct Stamped {
    outcome: StampOutcome,
    customer_name: String,
    business_name: String,
}

impl LoyaltyService {
    /// Add a single stamp.
    ///
    /// # Errors
    ///
    /// See [`add_stamps`](Self::add_stamps).
    pub async fn add_stamp(&self, request: StampRequest) -> Result<StampOutcome> {
        self.add_stamps(request.with_count(1)).await
    }

    /// Add `request.count` stamps, never exceeding the program's slots.
    ///
    /// A full card is left untouched and reported as completed.
    ///
    /// # Errors
    ///
    /// - [`LoyaltyError::CardNotFound`], [`LoyaltyError::ProgramNotFound`], [`LoyaltyError::BusinessNotFound`]
    /// - [`LoyaltyError::CardMismatch`] if the card is not the customer's card in that program and business
    /// - [`LoyaltyError::Store`] for store failures
    #[tracing::instrument(skip(self, request), fields(card_id = %request.card_id, count = request.count))]
    pub async fn add_stamps(&self, request: StampRequest) -> Result<StampOutcome> {
        let request = StampRequest {
            count: request.count.max(1),
            ..request
        };

        let ids = Arc::clone(&self.env.ids);
        let clock = Arc::clone(&self.env.clock);
        let stamped = run_atomic(self.store(), self.transaction, |tx| {
            Box::pin(apply_stamps(tx, request.clone(), Arc::clone(&ids), Arc::clone(&clock)))
        })
        .await?;

        let outcome = stamped.outcome;
        if outcome.stamps_added == 0 {
            tracing::debug!(current = outcome.current_stamps, "Card already full, nothing stamped");
            return Ok(outcome);
        }

        ProtocolMetrics::record_stamps(outcome.stamps_added);
        tracing::info!(
            added = outcome.stamps_added,
            current = outcome.current_stamps,
            total = outcome.total_slots,
            completed = outcome.is_completed,
            "Stamps added"
        );
        self.emit(LoyaltyEvent::StampAdded {
            card_id: outcome.card_id.clone(),
            customer_id: request.customer_id,
            customer_name: stamped.customer_name,
            business_id: request.business_id,
            business_name: stamped.business_name,
            stamps_added: outcome.stamps_added,
            current_stamps: outcome.current_stamps,
            total_slots: outcome.total_slots,
            is_completed: outcome.is_completed,
        });
        Ok(outcome)
    }
}

async fn apply_stamps(
    tx: &mut dyn Transaction,
    request: StampRequest,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
) -> Result<Stamped> {
    let card_path = paths::card(&request.card_id);
    let card: CustomerCard = read(tx, &card_path)
        .await?
        .ok_or_else(|| LoyaltyError::CardNotFound(request.card_id.clone()))?;
    if card.customer_id != request.customer_id
        || card.business_id != request.business_id
        || card.program_id != request.program_id
    {
        return Err(LoyaltyError::CardMismatch(card.id));
    }

    let program: LoyaltyProgram = read(tx, &paths::program(&card.program_id))
        .await?
        .ok_or_else(|| LoyaltyError::ProgramNotFound(card.program_id.clone()))?;
    let business: Business = read(tx, &paths::business(&card.business_id))
        .await?
        .ok_or_else(|| LoyaltyError::BusinessNotFound(card.business_id.clone()))?;

    let remaining = program.total_slots.saturating_sub(card.stamps);
    let to_add = remaining.min(request.count);
    let current_stamps = card.stamps + to_add;

    if to_add > 0 {
        tx.update(
            card_path,
            Fields::new()
                .increment(fields::STAMPS, i64::from(to_add))
                .server_timestamp(fields::LAST_STAMP_AT),
        );

        let event = StampEvent {
            card_id: card.id.clone(),
            customer_id: card.customer_id.clone(),
            business_id: card.business_id.clone(),
            program_id: card.program_id.clone(),
            timestamp: clock.now(),
        };
        for _ in 0..to_add {
            let data = Fields::from_serializable(&event)?.server_timestamp("timestamp");
            tx.set(paths::stamp_event(&ids.next_id()), data);
        }
    }

    Ok(Stamped {
        outcome: StampOutcome {
            card_id: card.id,
            stamps_added: to_add,
            current_stamps,
            total_slots: program.total_slots,
            is_completed: current_stamps >= program.total_slots,
        },
        customer_name: card.customer_name,
        business_name: business.name,
    })
}
