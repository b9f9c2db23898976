//! Domain events emitted after a transaction commits.
//!
//! Events carry everything their side effects need, so the dispatcher never
//! has to re-read the documents the transaction just wrote.

use crate::model::CustomerCard;
use stampcard_core::ids::{BusinessId, CardId, UserId};

/// Something that happened to a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoyaltyEvent {
    /// A customer joined a program.
    CardEnrolled {
        /// The new card.
        card: CustomerCard,
        /// Business display name.
        business_name: String,
    },

    /// Stamps were added to a card.
    StampAdded {
        /// Stamped card.
        card_id: CardId,
        /// Card holder.
        customer_id: UserId,
        /// Card holder's display name.
        customer_name: String,
        /// Business that granted the stamps.
        business_id: BusinessId,
        /// Business display name.
        business_name: String,
        /// Stamps added by this operation.
        stamps_added: u32,
        /// Stamps on the card afterwards.
        current_stamps: u32,
        /// Slots of the program.
        total_slots: u32,
        /// Whether the card is now full.
        is_completed: bool,
    },

    /// A card's reward was claimed.
    RewardRedeemed {
        /// Redeemed card.
        card_id: CardId,
        /// Card holder.
        customer_id: UserId,
        /// Business that honoured the reward.
        business_id: BusinessId,
        /// Business display name.
        business_name: String,
        /// Business owner, notified alongside the customer.
        business_owner_id: UserId,
        /// Note stored on the reward event.
        note: String,
    },

    /// A customer deleted their card.
    CardDeleted {
        /// Deleted card.
        card_id: CardId,
        /// Business of the card.
        business_id: BusinessId,
        /// Code released by the deletion.
        code: String,
    },
}

impl LoyaltyEvent {
    /// Card the event concerns.
    #[must_use]
    pub const fn card_id(&self) -> &CardId {
        match self {
            Self::CardEnrolled { card, .. } => &card.id,
            Self::StampAdded { card_id, .. }
            | Self::RewardRedeemed { card_id, .. }
            | Self::CardDeleted { card_id, .. } => card_id,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CardEnrolled { .. } => "card_enrolled",
            Self::StampAdded { .. } => "stamp_added",
            Self::RewardRedeemed { .. } => "reward_redeemed",
            Self::CardDeleted { .. } => "card_deleted",
        }
    }
}
