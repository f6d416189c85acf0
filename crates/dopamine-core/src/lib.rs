//! # Dopamine Core Library
//!
//! Business logic for the Dopamine habit tracker: members are handed a small
//! batch of "challenges" each day, graded by proficiency tier.
//!
//! ## Architecture
//!
//! - **Rotation**: decides per request whether a member gets a first batch, a
//!   replacement batch for a new calendar day, or today's existing batch
//! - **Catalog**: picks a batch from the challenge catalog under a configurable
//!   [`SelectionPolicy`], excluding the previous batch
//! - **Storage**: SQLite persistence with immediate transactions per rotation,
//!   and TOML-based configuration
//! - **Session**: logout bookkeeping for access tokens
//!
//! ## Key Components
//!
//! - [`RotationEngine`]: resolves today's challenges for a member
//! - [`Database`]: members, catalog, and member ↔ challenge links
//! - [`Config`]: application configuration management

pub mod catalog;
pub mod challenge;
pub mod error;
pub mod member;
pub mod projection;
pub mod rotation;
pub mod session;
pub mod storage;
pub mod store;

pub use catalog::{select_today, SelectionPolicy, SelectionStrategy};
pub use challenge::{Challenge, NewChallenge, ProficiencyTier};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use member::{Association, IssuedChallenge, Member};
pub use projection::ChallengeResponse;
pub use rotation::{decide, RotationDecision, RotationEngine, TodayChallenges};
pub use session::SessionStore;
pub use storage::{Config, Database};
pub use store::{AssociationStore, ChallengeCatalog, MemberStore};
