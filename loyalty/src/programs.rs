//! Businesses and their loyalty programs.
//!
//! Programs are never deleted: existing cards keep pointing at them.
//! Deactivation only stops new enrollments.

use crate::error::{LoyaltyError, Result};
use crate::model::{Business, LoyaltyProgram, ProgramStyle, decode, fields};
use crate::paths;
use crate::service::LoyaltyService;
use stampcard_core::document::{Fields, Query};
use stampcard_core::ids::{BusinessId, ProgramId, UserId};

/// Definition of a new program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProgram {
    /// Owning business.
    pub business_id: BusinessId,
    /// Stamps needed for the reward.
    pub total_slots: u32,
    /// What the customer gets.
    pub reward_description: String,
    /// Card styling.
    pub style: ProgramStyle,
}

impl NewProgram {
    /// Program with default styling.
    #[must_use]
    pub fn new(business_id: BusinessId, total_slots: u32, reward_description: impl Into<String>) -> Self {
        Self {
            business_id,
            total_slots,
            reward_description: reward_description.into(),
            style: ProgramStyle::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.total_slots == 0 {
            return Err(LoyaltyError::InvalidProgram(
                "A program needs at least one stamp slot.".to_string(),
            ));
        }
        if self.reward_description.trim().is_empty() {
            return Err(LoyaltyError::InvalidProgram(
                "Please describe the reward.".to_string(),
            ));
        }
        Ok(())
    }
}

impl LoyaltyService {
    /// Register a business managed by `owner_id`.
    ///
    /// # Errors
    ///
    /// - [`LoyaltyError::InvalidBusiness`] if the name is blank
    /// - [`LoyaltyError::Store`] for store failures
    pub async fn create_business(&self, owner_id: &UserId, name: &str) -> Result<Business> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LoyaltyError::InvalidBusiness("Please enter a business name.".to_string()));
        }

        let business = Business {
            id: BusinessId::new(self.next_id().into_inner()),
            name: name.to_string(),
            owner_id: owner_id.clone(),
            created_at: self.env.clock.now(),
        };
        self.store()
            .set(&paths::business(&business.id), Fields::from_serializable(&business)?)
            .await?;
        tracing::info!(business_id = %business.id, owner_id = %owner_id, "Business created");
        Ok(business)
    }

    /// Create an active program for a business `owner_id` manages.
    ///
    /// # Errors
    ///
    /// - [`LoyaltyError::InvalidProgram`] if it has no slots or no reward
    /// - [`LoyaltyError::BusinessNotFound`]
    /// - [`LoyaltyError::NotBusinessOwner`] if `owner_id` does not manage the business
    /// - [`LoyaltyError::Store`] for store failures
    pub async fn create_program(&self, owner_id: &UserId, definition: NewProgram) -> Result<LoyaltyProgram> {
        definition.validate()?;
        self.owned_business(owner_id, &definition.business_id).await?;

        let program = LoyaltyProgram {
            id: ProgramId::new(self.next_id().into_inner()),
            business_id: definition.business_id,
            total_slots: definition.total_slots,
            reward_description: definition.reward_description.trim().to_string(),
            style: definition.style,
            is_active: true,
            created_at: self.env.clock.now(),
        };
        self.store()
            .set(&paths::program(&program.id), Fields::from_serializable(&program)?)
            .await?;
        tracing::info!(program_id = %program.id, slots = program.total_slots, "Program created");
        Ok(program)
    }

    /// Stop a program from accepting enrollments. Repeated calls are no-ops.
    ///
    /// # Errors
    ///
    /// - [`LoyaltyError::ProgramNotFound`], [`LoyaltyError::BusinessNotFound`]
    /// - [`LoyaltyError::NotBusinessOwner`] if `owner_id` does not manage the business
    /// - [`LoyaltyError::Store`] for store failures
    pub async fn deactivate_program(&self, owner_id: &UserId, program_id: &ProgramId) -> Result<LoyaltyProgram> {
        let mut program = self
            .get_program(program_id)
            .await?
            .ok_or_else(|| LoyaltyError::ProgramNotFound(program_id.clone()))?;
        self.owned_business(owner_id, &program.business_id).await?;

        if !program.is_active {
            return Ok(program);
        }
        self.store()
            .update(&paths::program(program_id), Fields::new().set(fields::IS_ACTIVE, false))
            .await?;
        program.is_active = false;
        tracing::info!(program_id = %program_id, "Program deactivated");
        Ok(program)
    }

    /// One program.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::Store`] for store failures.
    pub async fn get_program(&self, program_id: &ProgramId) -> Result<Option<LoyaltyProgram>> {
        Ok(self.fetch(&paths::program(program_id)).await?)
    }

    /// Programs of a business, optionally including deactivated ones.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::Store`] for store failures.
    pub async fn list_business_programs(
        &self,
        business_id: &BusinessId,
        include_inactive: bool,
    ) -> Result<Vec<LoyaltyProgram>> {
        let query = Query::collection(paths::LOYALTY_PROGRAMS).where_eq(fields::BUSINESS_ID, business_id.as_str());
        let documents = self.store().query(&query).await?;
        let programs = documents
            .iter()
            .map(decode::<LoyaltyProgram>)
            .filter(|program| include_inactive || !matches!(program, Ok(p) if !p.is_active))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(programs)
    }

    async fn owned_business(&self, owner_id: &UserId, business_id: &BusinessId) -> Result<Business> {
        let business: Business = self
            .fetch(&paths::business(business_id))
            .await?
            .ok_or_else(|| LoyaltyError::BusinessNotFound(business_id.clone()))?;
        if business.owner_id != *owner_id {
            return Err(LoyaltyError::NotBusinessOwner {
                business_id: business_id.clone(),
                user_id: owner_id.clone(),
            });
        }
        Ok(business)
    }
}
