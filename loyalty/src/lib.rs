//! # Stampcard Loyalty
//!
//! Customers join merchant loyalty programs, collect stamps and redeem
//! rewards; merchants find cards by a short numeric code. This crate holds
//! the protocol that keeps those operations consistent:
//!
//! - **Enrollment**: one active card per customer and program, reserving a
//!   code unique among the business's active cards
//! - **Stamping**: single or bulk stamps, capped at the program's slots, with
//!   completion detection
//! - **Redemption**: the reward is claimed exactly once, and only from a full card
//! - **Queries**: cards joined with their program and business
//!
//! Every consistency guarantee comes from the document store's atomic
//! transactions (see `stampcard_core::store::run_atomic`). Side effects such
//! as push notifications and sound cues run after commit on a separate
//! dispatcher and can never undo or fail an operation.
//!
//! # Architecture
//!
//! ```text
//! LoyaltyService ──run_atomic──▶ DocumentStore (in-memory | PostgreSQL)
//!       │
//!       └─emit─▶ EventSink ──▶ Dispatcher ──▶ SideEffects
//!                                                ├─ Notifier
//!                                                ├─ SoundPlayer
//!                                                └─ ActivityLog
//! ```
//!
//! # Example
//!
//! ```no_run
//! use stampcard_loyalty::{LoyaltyService, NewProgram, StampRequest};
//! use stampcard_core::ids::UserId;
//!
//! # async fn example(service: LoyaltyService) -> stampcard_loyalty::Result<()> {
//! let owner = UserId::new("owner-1");
//! let business = service.create_business(&owner, "Bean There").await?;
//! let program = service
//!     .create_program(&owner, NewProgram::new(business.id, 8, "Free coffee"))
//!     .await?;
//!
//! let card = service.enroll(&UserId::new("ada"), "Ada", &program.id).await?;
//! let outcome = service.add_stamps(StampRequest::for_card(&card).with_count(8)).await?;
//! assert!(outcome.is_completed);
//! service.redeem_reward(&card.id, None).await?;
//! # Ok(())
//! # }
//! ```

mod cards;
pub mod code_generator;
pub mod config;
pub mod effects;
mod enrollment;
pub mod error;
pub mod events;
pub mod mocks;
pub mod model;
pub mod paths;
pub mod programs;
pub mod providers;
pub mod queries;
pub mod redemption;
pub mod service;
pub mod stamping;

pub use code_generator::CodeGenerator;
pub use config::{LoyaltyConfig, Platform, StoreBackend};
pub use effects::SideEffects;
pub use error::{LoyaltyError, Result};
pub use events::LoyaltyEvent;
pub use model::{Business, CustomerCard, LoyaltyProgram, ProgramStyle};
pub use programs::NewProgram;
pub use queries::CardDetails;
pub use redemption::{DEFAULT_REDEMPTION_NOTE, RedemptionOutcome};
pub use service::{LoyaltyEnvironment, LoyaltyService};
pub use stamping::{StampOutcome, StampRequest};
