//! Members and the challenges currently issued to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::challenge::Challenge;

/// A registered member.
///
/// `challenge_refreshed_at` is written only by the rotation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub nickname: String,
    pub challenge_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Link recording that a challenge was issued to a member in the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub id: i64,
    pub member_id: i64,
    pub challenge_id: i64,
    /// Issuing order within the batch
    pub position: i64,
    pub issued_at: DateTime<Utc>,
}

/// An association joined with the challenge it points at.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedChallenge {
    pub association: Association,
    pub challenge: Challenge,
}
