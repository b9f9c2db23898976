//! Redemption: claim a full card's reward exactly once.
//!
//! The claimed flag is read and written in one transaction. Of any number of
//! concurrent redemptions of a card, the first to commit wins; the others
//! re-execute, see the flag and fail with `AlreadyRedeemed`.
//!
//! A claimed card no longer counts as active, so the same transaction
//! releases its code reservation and enrollment guard. The code becomes
//! available to new cards and the customer may join the program again.

use crate::error::{LoyaltyError, Result};
use crate::events::LoyaltyEvent;
use crate::model::{Business, CodeReservation, CustomerCard, EnrollmentGuard, LoyaltyProgram, RewardEvent, fields};
use crate::paths;
use crate::service::{LoyaltyService, read};
use stampcard_core::document::Fields;
use stampcard_core::environment::{Clock, IdGenerator};
use stampcard_core::ids::{BusinessId, CardId, ProgramId, UserId};
use stampcard_core::store::{Transaction, run_atomic};
use stampcard_runtime::metrics::ProtocolMetrics;
use std::sync::Arc;

/// Note stored when the merchant gives none.
pub const DEFAULT_REDEMPTION_NOTE: &str = "Reward redeemed";

/// Result of a committed redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionOutcome {
    /// Redeemed card.
    pub card_id: CardId,
    /// Card holder.
    pub customer_id: UserId,
    /// Business that honoured the reward.
    pub business_id: BusinessId,
    /// Program of the card.
    pub program_id: ProgramId,
    /// What the customer received.
    pub reward_description: String,
    /// Stamps on the card at redemption.
    pub stamps: u32,
    /// Note stored on the reward event.
    pub note: String,
}

struct Redeemed {
    outcome: RedemptionOutcome,
    business_name: String,
    business_owner_id: UserId,
}

impl LoyaltyService {
    /// Claim the reward of a full card.
    ///
    /// # Errors
    ///
    /// - [`LoyaltyError::CardNotFound`], [`LoyaltyError::ProgramNotFound`], [`LoyaltyError::BusinessNotFound`]
    /// - [`LoyaltyError::AlreadyRedeemed`] if the reward was claimed before
    /// - [`LoyaltyError::InsufficientStamps`] if the card is not full
    /// - [`LoyaltyError::Store`] for store failures
    #[tracing::instrument(skip(self, note))]
    pub async fn redeem_reward(&self, card_id: &CardId, note: Option<&str>) -> Result<RedemptionOutcome> {
        let note = note
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_REDEMPTION_NOTE)
            .to_string();

        let ids = Arc::clone(&self.env.ids);
        let clock = Arc::clone(&self.env.clock);
        let redeemed = run_atomic(self.store(), self.transaction, |tx| {
            Box::pin(claim_reward(
                tx,
                card_id.clone(),
                note.clone(),
                Arc::clone(&ids),
                Arc::clone(&clock),
            ))
        })
        .await?;

        let outcome = redeemed.outcome;
        ProtocolMetrics::record_redemption();
        tracing::info!(customer_id = %outcome.customer_id, "Reward redeemed");
        self.emit(LoyaltyEvent::RewardRedeemed {
            card_id: outcome.card_id.clone(),
            customer_id: outcome.customer_id.clone(),
            business_id: outcome.business_id.clone(),
            business_name: redeemed.business_name,
            business_owner_id: redeemed.business_owner_id,
            note: outcome.note.clone(),
        });
        Ok(outcome)
    }
}

async fn claim_reward(
    tx: &mut dyn Transaction,
    card_id: CardId,
    note: String,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
) -> Result<Redeemed> {
    let card_path = paths::card(&card_id);
    let card: CustomerCard = read(tx, &card_path)
        .await?
        .ok_or_else(|| LoyaltyError::CardNotFound(card_id.clone()))?;
    if card.reward_claimed {
        return Err(LoyaltyError::AlreadyRedeemed(card_id));
    }

    let program: LoyaltyProgram = read(tx, &paths::program(&card.program_id))
        .await?
        .ok_or_else(|| LoyaltyError::ProgramNotFound(card.program_id.clone()))?;
    if card.stamps < program.total_slots {
        return Err(LoyaltyError::InsufficientStamps {
            card_id,
            stamps: card.stamps,
            required: program.total_slots,
        });
    }
    let business: Business = read(tx, &paths::business(&card.business_id))
        .await?
        .ok_or_else(|| LoyaltyError::BusinessNotFound(card.business_id.clone()))?;

    let reservation_path = paths::code_reservation(&card.business_id, &card.code);
    let reservation: Option<CodeReservation> = read(tx, &reservation_path).await?;
    let guard_path = paths::enrollment_guard(&card.customer_id, &card.program_id);
    let guard: Option<EnrollmentGuard> = read(tx, &guard_path).await?;

    tx.update(
        card_path,
        Fields::new()
            .set(fields::REWARD_CLAIMED, true)
            .server_timestamp(fields::CLAIMED_AT),
    );

    let event = RewardEvent {
        card_id: card.id.clone(),
        customer_id: card.customer_id.clone(),
        business_id: card.business_id.clone(),
        program_id: card.program_id.clone(),
        claimed_at: clock.now(),
        redeemed: true,
        note: note.clone(),
    };
    tx.set(
        paths::reward_event(&ids.next_id()),
        Fields::from_serializable(&event)?.server_timestamp(fields::CLAIMED_AT),
    );

    if reservation.is_some_and(|r| r.card_id == card.id) {
        tx.delete(reservation_path);
    }
    if guard.is_some_and(|g| g.card_id == card.id) {
        tx.delete(guard_path);
    }

    Ok(Redeemed {
        outcome: RedemptionOutcome {
            card_id: card.id,
            customer_id: card.customer_id,
            business_id: card.business_id,
            program_id: card.program_id,
            reward_description: program.reward_description,
            stamps: card.stamps,
            note,
        },
        business_name: business.name,
        business_owner_id: business.owner_id,
    })
}
