//! Document locations.
//!
//! Code reservations and enrollment guards live in nested collections so
//! their keys never need escaping: ids cannot contain `/`.

use stampcard_core::document::DocumentPath;
use stampcard_core::ids::{BusinessId, CardId, ProgramId, RecordId, UserId};

/// Customer cards.
pub const CUSTOMER_CARDS: &str = "customerCards";
/// Loyalty programs.
pub const LOYALTY_PROGRAMS: &str = "loyaltyPrograms";
/// Businesses.
pub const BUSINESSES: &str = "businesses";
/// Stamp events.
pub const STAMP_EVENTS: &str = "stampEvents";
/// Reward events.
pub const REWARD_EVENTS: &str = "rewardEvents";
/// User profiles.
pub const USERS: &str = "users";
/// Activity notes.
pub const ACTIVITY_NOTES: &str = "activityNotes";

/// `customerCards/{card}`
#[must_use]
pub fn card(id: &CardId) -> DocumentPath {
    DocumentPath::new(CUSTOMER_CARDS, id.as_str())
}

/// `loyaltyPrograms/{program}`
#[must_use]
pub fn program(id: &ProgramId) -> DocumentPath {
    DocumentPath::new(LOYALTY_PROGRAMS, id.as_str())
}

/// `businesses/{business}`
#[must_use]
pub fn business(id: &BusinessId) -> DocumentPath {
    DocumentPath::new(BUSINESSES, id.as_str())
}

/// `users/{user}`
#[must_use]
pub fn user(id: &UserId) -> DocumentPath {
    DocumentPath::new(USERS, id.as_str())
}

/// Collection of a business's code reservations.
#[must_use]
pub fn code_reservations(business: &BusinessId) -> String {
    format!("{BUSINESSES}/{business}/codeReservations")
}

/// `businesses/{business}/codeReservations/{code}`
#[must_use]
pub fn code_reservation(business: &BusinessId, code: &str) -> DocumentPath {
    DocumentPath::new(code_reservations(business), code)
}

/// `users/{customer}/enrollments/{program}`
#[must_use]
pub fn enrollment_guard(customer: &UserId, program: &ProgramId) -> DocumentPath {
    DocumentPath::new(format!("{USERS}/{customer}/enrollments"), program.as_str())
}

/// `stampEvents/{id}`
#[must_use]
pub fn stamp_event(id: &RecordId) -> DocumentPath {
    DocumentPath::new(STAMP_EVENTS, id.as_str())
}

/// `rewardEvents/{id}`
#[must_use]
pub fn reward_event(id: &RecordId) -> DocumentPath {
    DocumentPath::new(REWARD_EVENTS, id.as_str())
}

/// `activityNotes/{id}`
#[must_use]
pub fn activity_note(id: &RecordId) -> DocumentPath {
    DocumentPath::new(ACTIVITY_NOTES, id.as_str())
}
