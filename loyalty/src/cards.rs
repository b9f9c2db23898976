//! Card deletion by its holder.
//!
//! The card, its stamp and reward events, its code reservation and its
//! enrollment guard go in one transaction. Events written between the event
//! query and the commit are swept by a follow-up transaction.

use crate::error::{LoyaltyError, Result};
use crate::events::LoyaltyEvent;
use crate::model::{CodeReservation, CustomerCard, EnrollmentGuard, fields};
use crate::paths;
use crate::service::{LoyaltyService, read};
use stampcard_core::document::{DocumentPath, Query};
use stampcard_core::ids::CardId;
use stampcard_core::store::{Transaction, run_atomic};

impl LoyaltyService {
    /// Delete one of the signed-in customer's cards and everything hanging off it.
    ///
    /// Afterwards the card's code is free for new enrollments at the business.
    ///
    /// # Errors
    ///
    /// - [`LoyaltyError::Unauthenticated`] if nobody is signed in
    /// - [`LoyaltyError::CardNotFound`] if the card does not exist
    /// - [`LoyaltyError::NotCardOwner`] if the card belongs to someone else
    /// - [`LoyaltyError::Store`] for store failures
    #[tracing::instrument(skip(self))]
    pub async fn delete_card(&self, card_id: &CardId) -> Result<()> {
        let user_id = self.env.identity.current_user_id().ok_or(LoyaltyError::Unauthenticated)?;
        let card: CustomerCard = self
            .fetch(&paths::card(card_id))
            .await?
            .ok_or_else(|| LoyaltyError::CardNotFound(card_id.clone()))?;
        if card.customer_id != user_id {
            return Err(LoyaltyError::NotCardOwner {
                card_id: card_id.clone(),
                user_id,
            });
        }

        let events = self.event_paths(card_id).await?;
        let event_count = events.len();
        let card = run_atomic(self.store(), self.transaction, |tx| {
            Box::pin(delete_card_tree(tx, card.clone(), events.clone()))
        })
        .await?;

        let stragglers = self.event_paths(card_id).await?;
        if !stragglers.is_empty() {
            tracing::warn!(count = stragglers.len(), "Sweeping events written during deletion");
            run_atomic(self.store(), self.transaction, |tx| {
                let stragglers = stragglers.clone();
                Box::pin(async move {
                    for path in stragglers {
                        tx.delete(path);
                    }
                    Ok::<_, LoyaltyError>(())
                })
            })
            .await?;
        }

        tracing::info!(events = event_count, code = %card.code, "Card deleted");
        self.emit(LoyaltyEvent::CardDeleted {
            card_id: card.id,
            business_id: card.business_id,
            code: card.code,
        });
        Ok(())
    }

    async fn event_paths(&self, card_id: &CardId) -> Result<Vec<DocumentPath>> {
        let stamp_query = Query::collection(paths::STAMP_EVENTS).where_eq(fields::CARD_ID, card_id.as_str());
        let reward_query = Query::collection(paths::REWARD_EVENTS).where_eq(fields::CARD_ID, card_id.as_str());
        let (stamps, rewards) = futures::try_join!(self.store().query(&stamp_query), self.store().query(&reward_query))?;
        Ok(stamps.into_iter().chain(rewards).map(|doc| doc.path).collect())
    }
}

async fn delete_card_tree(
    tx: &mut dyn Transaction,
    card: CustomerCard,
    events: Vec<DocumentPath>,
) -> Result<CustomerCard> {
    let card_path = paths::card(&card.id);
    if tx.get(&card_path).await?.is_none() {
        return Err(LoyaltyError::CardNotFound(card.id));
    }

    let reservation_path = paths::code_reservation(&card.business_id, &card.code);
    let reservation: Option<CodeReservation> = read(tx, &reservation_path).await?;
    let guard_path = paths::enrollment_guard(&card.customer_id, &card.program_id);
    let guard: Option<EnrollmentGuard> = read(tx, &guard_path).await?;

    if reservation.is_some_and(|r| r.card_id == card.id) {
        tx.delete(reservation_path);
    }
    if guard.is_some_and(|g| g.card_id == card.id) {
        tx.delete(guard_path);
    }
    for path in events {
        tx.delete(path);
    }
    tx.delete(card_path);
    Ok(card)
}

