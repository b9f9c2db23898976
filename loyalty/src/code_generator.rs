//! Short numeric card codes.
//!
//! A merchant finds a customer's card by typing its code, so codes are short
//! and only need to be unique among the active cards of one business. The
//! generator draws uniformly from a range and asks a caller-supplied lookup
//! whether the candidate is already reserved; it knows nothing about the
//! store. Two concurrent generators may still pick the same free code; the
//! enrollment transaction settles that race.

use crate::error::LoyaltyError;
use rand::Rng;
use stampcard_core::error::StoreError;
use stampcard_core::ids::BusinessId;
use stampcard_runtime::metrics::ProtocolMetrics;
use std::future::Future;
use std::ops::RangeInclusive;

/// Draws codes from an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGenerator {
    min: u32,
    max: u32,
    max_attempts: u32,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(100..=999, 1000)
    }
}

impl CodeGenerator {
    /// Generator over `range` giving up after `max_attempts` draws.
    ///
    /// An inverted range is normalised; at least one draw is always made.
    #[must_use]
    pub fn new(range: RangeInclusive<u32>, max_attempts: u32) -> Self {
        let (a, b) = range.into_inner();
        Self {
            min: a.min(b),
            max: a.max(b),
            max_attempts: max_attempts.max(1),
        }
    }

    /// The range codes are drawn from.
    #[must_use]
    pub const fn range(&self) -> RangeInclusive<u32> {
        self.min..=self.max
    }

    /// Render a number as a code, zero-padded to the width of the range maximum.
    #[must_use]
    pub fn format(&self, value: u32) -> String {
        let width = self.max.to_string().len();
        format!("{value:0width$}")
    }

    /// Find a code no active reservation of `business_id` holds.
    ///
    /// `exists(code, business_id)` reports whether the code is taken.
    ///
    /// # Errors
    ///
    /// - [`LoyaltyError::CodeGenerationExhausted`] after `max_attempts` taken draws
    /// - the lookup's own error, unchanged
    pub async fn generate<F, Fut>(&self, business_id: &BusinessId, exists: F) -> Result<String, LoyaltyError>
    where
        F: FnMut(String, BusinessId) -> Fut,
        Fut: Future<Output = Result<bool, StoreError>>,
    {
        let range = self.range();
        self.generate_with(business_id, exists, || rand::thread_rng().gen_range(range.clone()))
            .await
    }

    /// Like [`generate`](Self::generate) with an explicit source of draws.
    ///
    /// # Errors
    ///
    /// Same as [`generate`](Self::generate).
    pub async fn generate_with<F, Fut, D>(
        &self,
        business_id: &BusinessId,
        mut exists: F,
        mut draw: D,
    ) -> Result<String, LoyaltyError>
    where
        F: FnMut(String, BusinessId) -> Fut,
        Fut: Future<Output = Result<bool, StoreError>>,
        D: FnMut() -> u32,
    {
        for attempt in 1..=self.max_attempts {
            let code = self.format(draw().clamp(self.min, self.max));
            if !exists(code.clone(), business_id.clone()).await? {
                ProtocolMetrics::record_code_generation(attempt);
                tracing::debug!(business_id = %business_id, attempt, "Found free code");
                return Ok(code);
            }
        }

        tracing::warn!(
            business_id = %business_id,
            attempts = self.max_attempts,
            "Code generation exhausted"
        );
        Err(LoyaltyError::CodeGenerationExhausted {
            business_id: business_id.clone(),
            attempts: self.max_attempts,
        })
    }
}
