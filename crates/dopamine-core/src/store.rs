//! Persistence seams consumed by the rotation engine.
//!
//! [`Database`](crate::storage::Database) implements all three traits. The
//! engine calls them only from inside one immediate transaction, so the
//! default methods below are atomic as a whole even though they issue several
//! statements.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::challenge::Challenge;
use crate::error::Result;
use crate::member::{Association, IssuedChallenge, Member};

pub trait MemberStore {
    fn find_member(&self, id: i64) -> Result<Option<Member>>;

    /// Write the member's refresh marker. Only the rotation engine calls this.
    fn stamp_refresh(&self, member_id: i64, at: DateTime<Utc>) -> Result<()>;
}

pub trait ChallengeCatalog {
    /// Every challenge whose id is not in `exclude`, ordered by id.
    fn eligible_challenges(&self, exclude: &BTreeSet<i64>) -> Result<Vec<Challenge>>;
}

pub trait AssociationStore {
    fn create_association(
        &self,
        member_id: i64,
        challenge_id: i64,
        position: i64,
        issued_at: DateTime<Utc>,
    ) -> Result<Association>;

    /// Remove the given links with a single statement. Returns rows deleted.
    fn delete_associations(&self, associations: &[Association]) -> Result<usize>;

    /// Current links of a member in issuing order.
    fn find_associations(&self, member_id: i64) -> Result<Vec<IssuedChallenge>>;

    fn issue_batch(
        &self,
        member_id: i64,
        challenges: &[Challenge],
        issued_at: DateTime<Utc>,
    ) -> Result<Vec<Association>> {
        challenges
            .iter()
            .enumerate()
            .map(|(position, challenge)| {
                self.create_association(member_id, challenge.id, position as i64, issued_at)
            })
            .collect()
    }

    /// Swap the member's whole association set for `challenges`.
    fn replace_associations(
        &self,
        member_id: i64,
        challenges: &[Challenge],
        issued_at: DateTime<Utc>,
    ) -> Result<Vec<Association>> {
        let existing: Vec<Association> = self
            .find_associations(member_id)?
            .into_iter()
            .map(|issued| issued.association)
            .collect();
        self.delete_associations(&existing)?;
        self.issue_batch(member_id, challenges, issued_at)
    }
}
