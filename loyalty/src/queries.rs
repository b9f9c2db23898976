//! Read side: cards joined with their program and business.
//!
//! Nothing here runs in a transaction; results may lag concurrent writes.
//! Programs and businesses referenced by a result set are fetched with one
//! batched read each, however many cards share them. A cancelled read is
//! treated as "nothing found" rather than an error.

use crate::error::{LoyaltyError, Result};
use crate::model::{Business, CodeReservation, CustomerCard, LoyaltyProgram, decode, fields};
use crate::paths;
use crate::service::LoyaltyService;
use stampcard_core::document::{DocumentPath, Query};
use stampcard_core::ids::{BusinessId, CardId, ProgramId, UserId};
use std::collections::{BTreeSet, HashMap};

/// A card with the program and business it belongs to.
///
/// Program or business are `None` if they were removed after the card was
/// created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDetails {
    /// The card.
    pub card: CustomerCard,
    /// Its program.
    pub program: Option<LoyaltyProgram>,
    /// Its business.
    pub business: Option<Business>,
}

impl CardDetails {
    /// Stamps still needed for the reward, if the program is known.
    #[must_use]
    pub fn stamps_remaining(&self) -> Option<u32> {
        self.program
            .as_ref()
            .map(|program| program.total_slots.saturating_sub(self.card.stamps))
    }
}

/// Turn a cancelled read into an empty result.
fn unless_cancelled<T: Default>(result: Result<T>) -> Result<T> {
    match result {
        Err(LoyaltyError::Store(err)) if err.is_cancelled() => {
            tracing::debug!(error = %err, "Read cancelled, returning empty result");
            Ok(T::default())
        },
        other => other,
    }
}

impl LoyaltyService {
    /// One card with its program and business.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::Store`] for store failures other than cancellation.
    pub async fn get_card(&self, card_id: &CardId) -> Result<Option<CardDetails>> {
        unless_cancelled(self.load_card(card_id).await)
    }

    /// Every card of a customer, claimed ones included.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::Store`] for store failures other than cancellation.
    pub async fn list_customer_cards(&self, customer_id: &UserId) -> Result<Vec<CardDetails>> {
        let query = Query::collection(paths::CUSTOMER_CARDS).where_eq(fields::CUSTOMER_ID, customer_id.as_str());
        unless_cancelled(self.load_cards(&query).await)
    }

    /// Every card of a program.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::Store`] for store failures other than cancellation.
    pub async fn list_program_cards(&self, program_id: &ProgramId) -> Result<Vec<CardDetails>> {
        let query = Query::collection(paths::CUSTOMER_CARDS).where_eq(fields::PROGRAM_ID, program_id.as_str());
        unless_cancelled(self.load_cards(&query).await)
    }

    /// Every card issued by a business.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::Store`] for store failures other than cancellation.
    pub async fn list_business_cards(&self, business_id: &BusinessId) -> Result<Vec<CardDetails>> {
        let query = Query::collection(paths::CUSTOMER_CARDS).where_eq(fields::BUSINESS_ID, business_id.as_str());
        unless_cancelled(self.load_cards(&query).await)
    }

    /// The active card holding `code` at a business, as typed in by the merchant.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::Store`] for store failures other than cancellation.
    pub async fn find_active_card_by_code(&self, business_id: &BusinessId, code: &str) -> Result<Option<CardDetails>> {
        unless_cancelled(self.load_card_by_code(business_id, code.trim()).await)
    }

    async fn load_card(&self, card_id: &CardId) -> Result<Option<CardDetails>> {
        let Some(card) = self.fetch::<CustomerCard>(&paths::card(card_id)).await? else {
            tracing::debug!(card_id = %card_id, "Card not found");
            return Ok(None);
        };
        Ok(self.join(vec![card]).await?.pop())
    }

    async fn load_card_by_code(&self, business_id: &BusinessId, code: &str) -> Result<Option<CardDetails>> {
        let reservation_path = paths::code_reservation(business_id, code);
        let Some(reservation) = self.fetch::<CodeReservation>(&reservation_path).await? else {
            return Ok(None);
        };
        let Some(card) = self.fetch::<CustomerCard>(&paths::card(&reservation.card_id)).await? else {
            tracing::warn!(code, card_id = %reservation.card_id, "Reservation points at a missing card");
            return Ok(None);
        };
        if !card.is_active() || card.business_id != *business_id || card.code != code {
            return Ok(None);
        }
        Ok(self.join(vec![card]).await?.pop())
    }

    async fn load_cards(&self, query: &Query) -> Result<Vec<CardDetails>> {
        let documents = self.store().query(query).await?;
        let cards = documents.iter().map(decode).collect::<std::result::Result<Vec<CustomerCard>, _>>()?;
        tracing::debug!(collection = %query.collection, count = cards.len(), "Loaded cards");
        self.join(cards).await
    }

    /// Attach programs and businesses, one batched read per collection.
    async fn join(&self, cards: Vec<CustomerCard>) -> Result<Vec<CardDetails>> {
        if cards.is_empty() {
            return Ok(Vec::new());
        }

        let program_paths: Vec<DocumentPath> = cards
            .iter()
            .map(|card| &card.program_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(paths::program)
            .collect();
        let business_paths: Vec<DocumentPath> = cards
            .iter()
            .map(|card| &card.business_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(paths::business)
            .collect();

        let (programs, businesses) = futures::try_join!(
            self.store().get_all(&program_paths),
            self.store().get_all(&business_paths)
        )?;

        let programs: HashMap<ProgramId, LoyaltyProgram> = programs
            .iter()
            .map(|doc| decode::<LoyaltyProgram>(doc).map(|p| (p.id.clone(), p)))
            .collect::<std::result::Result<_, _>>()?;
        let businesses: HashMap<BusinessId, Business> = businesses
            .iter()
            .map(|doc| decode::<Business>(doc).map(|b| (b.id.clone(), b)))
            .collect::<std::result::Result<_, _>>()?;

        Ok(cards
            .into_iter()
            .map(|card| CardDetails {
                program: programs.get(&card.program_id).cloned(),
                business: businesses.get(&card.business_id).cloned(),
                card,
            })
            .collect())
    }
}
