//! Typed records stored by the loyalty protocol.
//!
//! Every record is decoded from its raw document through serde at the store
//! boundary (see [`decode`]); a document that does not fit its record type
//! fails with [`StoreError::Decode`] instead of leaking half-populated data
//! into the protocol. Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stampcard_core::document::Document;
use stampcard_core::error::StoreError;
use stampcard_core::ids::{BusinessId, CardId, ProgramId, UserId};

/// Stored field names used in queries and partial updates.
pub mod fields {
    /// [`CustomerCard::customer_id`](super::CustomerCard::customer_id) and event owners.
    pub const CUSTOMER_ID: &str = "customerId";
    /// Program reference on cards and events.
    pub const PROGRAM_ID: &str = "loyaltyProgramId";
    /// Business reference on cards, programs and events.
    pub const BUSINESS_ID: &str = "businessId";
    /// Card reference on events.
    pub const CARD_ID: &str = "cardId";
    /// Card stamp counter.
    pub const STAMPS: &str = "currentStamps";
    /// Card reward-claimed flag.
    pub const REWARD_CLAIMED: &str = "isRewardClaimed";
    /// Card claim time.
    pub const CLAIMED_AT: &str = "claimedAt";
    /// Card last-stamp time.
    pub const LAST_STAMP_AT: &str = "lastStampAt";
    /// Program active flag.
    pub const IS_ACTIVE: &str = "isActive";
}

/// Decode a raw document into a record.
///
/// # Errors
///
/// Returns [`StoreError::Decode`] if the document does not match `T`.
pub fn decode<T: DeserializeOwned>(document: &Document) -> Result<T, StoreError> {
    document.decode()
}

/// Decode an optional document.
///
/// # Errors
///
/// Returns [`StoreError::Decode`] if the document exists but does not match `T`.
pub fn decode_opt<T: DeserializeOwned>(document: Option<&Document>) -> Result<Option<T>, StoreError> {
    document.map(decode).transpose()
}

// ============================================================================
// Merchants and programs
// ============================================================================

/// A merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    /// Business id.
    pub id: BusinessId,
    /// Display name.
    pub name: String,
    /// The user who manages the business.
    pub owner_id: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Card styling chosen by the merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramStyle {
    /// Card background colour (CSS hex).
    pub background_color: String,
    /// Name of the stamp icon.
    pub stamp_icon: String,
}

impl Default for ProgramStyle {
    fn default() -> Self {
        Self {
            background_color: "#FFFFFF".to_string(),
            stamp_icon: "star".to_string(),
        }
    }
}

const fn active_by_default() -> bool {
    true
}

/// A merchant-defined reward scheme with a fixed number of stamp slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyProgram {
    /// Program id.
    pub id: ProgramId,
    /// Owning business.
    pub business_id: BusinessId,
    /// Stamps needed to earn the reward (at least one).
    pub total_slots: u32,
    /// What the customer gets.
    pub reward_description: String,
    /// Display styling.
    #[serde(default)]
    pub style: ProgramStyle,
    /// Inactive programs accept no new enrollments.
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Cards
// ============================================================================

/// A customer's enrollment in one loyalty program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerCard {
    /// Card id.
    pub id: CardId,
    /// Card holder.
    pub customer_id: UserId,
    /// Program the card belongs to.
    #[serde(rename = "loyaltyProgramId")]
    pub program_id: ProgramId,
    /// Business of the program, denormalized for queries.
    pub business_id: BusinessId,
    /// Stamps collected so far.
    #[serde(rename = "currentStamps")]
    pub stamps: u32,
    /// Monotonic: once true, never false again.
    #[serde(rename = "isRewardClaimed")]
    pub reward_claimed: bool,
    /// When the reward was claimed.
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    /// Short numeric code, unique among the business's active cards.
    pub code: String,
    /// Customer display name at enrollment time.
    pub customer_name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the most recent stamp.
    #[serde(default)]
    pub last_stamp_at: Option<DateTime<Utc>>,
}

impl CustomerCard {
    /// Active cards hold a code and count toward the one-card-per-program limit.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.reward_claimed
    }
}

/// Claim on a code within a business namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeReservation {
    /// Holder of the card.
    pub customer_id: UserId,
    /// Card that owns the code.
    pub card_id: CardId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Marker that a customer holds an active card for a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentGuard {
    /// The active card.
    pub card_id: CardId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Audit records
// ============================================================================

/// One granted stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampEvent {
    /// Stamped card.
    pub card_id: CardId,
    /// Card holder.
    pub customer_id: UserId,
    /// Business that granted the stamp.
    pub business_id: BusinessId,
    /// Program of the card.
    #[serde(rename = "loyaltyProgramId")]
    pub program_id: ProgramId,
    /// When the stamp was granted.
    pub timestamp: DateTime<Utc>,
}

/// One redeemed reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardEvent {
    /// Redeemed card.
    pub card_id: CardId,
    /// Card holder.
    pub customer_id: UserId,
    /// Business that honoured the reward.
    pub business_id: BusinessId,
    /// Program of the card.
    #[serde(rename = "loyaltyProgramId")]
    pub program_id: ProgramId,
    /// When the reward was claimed.
    pub claimed_at: DateTime<Utc>,
    /// Always true for events written by redemption.
    pub redeemed: bool,
    /// Free-text note from the merchant.
    pub note: String,
}

/// What an activity note is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// A customer joined a program.
    Enrolled,
    /// Stamps were added.
    Stamped,
    /// A card reached its slot count.
    Completed,
    /// A reward was redeemed.
    Redeemed,
    /// A card was deleted by its holder.
    CardDeleted,
}

/// Merchant-facing audit note, written after the fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityNote {
    /// Business the note belongs to.
    pub business_id: BusinessId,
    /// Card concerned.
    pub card_id: CardId,
    /// Category.
    pub kind: ActivityKind,
    /// Human-readable text.
    pub message: String,
    /// When it happened.
    pub created_at: DateTime<Utc>,
}

/// A user profile as far as notifications need it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub display_name: String,
    /// Push delivery token, if the user registered a device.
    #[serde(default)]
    pub push_token: Option<String>,
}
