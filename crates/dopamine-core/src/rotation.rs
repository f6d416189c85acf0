//! Daily challenge rotation.
//!
//! A member's batch is re-evaluated lazily whenever it is requested; there is
//! no scheduled sweep. Whether the batch is issued, replaced or reused is a
//! pure function of the member's last refresh and the current instant, see
//! [`decide`].
//!
//! # Usage
//! ```rust,ignore
//! use dopamine_core::{Config, Database, RotationEngine};
//!
//! let db = Database::open(&Config::load()?)?;
//! let engine = RotationEngine::default();
//! let today = engine.resolve_today(&db, member_id)?;
//! ```

use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{select_today, SelectionPolicy};
use crate::challenge::Challenge;
use crate::error::{CoreError, Result};
use crate::projection::{project, ChallengeResponse};
use crate::storage::{Config, Database};
use crate::store::{AssociationStore, ChallengeCatalog, MemberStore};

/// Which branch a resolution took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationDecision {
    /// Never refreshed: issue a first batch
    Initial,
    /// Last refresh was on another calendar day: replace the batch
    Rollover,
    /// Already refreshed today: hand back the current batch
    Reuse,
}

/// Calendar date of `at` as seen from `offset`.
pub fn calendar_day(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

/// Decide the rotation branch from the last refresh and the current instant.
///
/// Days are compared by calendar date in `offset`, never by elapsed time:
/// 23:59 and 00:01 of the next day differ, 00:01 and 23:58 of one day don't.
pub fn decide(
    last_refresh: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> RotationDecision {
    match last_refresh {
        None => RotationDecision::Initial,
        Some(last) if calendar_day(last, offset) == calendar_day(now, offset) => {
            RotationDecision::Reuse
        }
        Some(_) => RotationDecision::Rollover,
    }
}

/// Result of resolving a member's challenges for today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodayChallenges {
    pub member_id: i64,
    pub decision: RotationDecision,
    pub refreshed_at: DateTime<Utc>,
    /// In selection order for a new batch, issuing order for a reused one
    pub challenges: Vec<ChallengeResponse>,
}

/// Issues, replaces or reuses a member's daily batch.
#[derive(Debug, Clone)]
pub struct RotationEngine {
    policy: SelectionPolicy,
    day_offset: FixedOffset,
}

impl Default for RotationEngine {
    fn default() -> Self {
        Self::new(SelectionPolicy::default(), Utc.fix())
    }
}

impl RotationEngine {
    pub fn new(policy: SelectionPolicy, day_offset: FixedOffset) -> Self {
        Self { policy, day_offset }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.selection_policy(), config.day_offset()?))
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    pub fn day_offset(&self) -> FixedOffset {
        self.day_offset
    }

    /// Resolve today's challenges for `member_id` as of now.
    pub fn resolve_today(&self, db: &Database, member_id: i64) -> Result<TodayChallenges> {
        self.resolve_today_at(db, member_id, Utc::now())
    }

    /// Resolve today's challenges as of `now` in one immediate transaction.
    ///
    /// # Errors
    /// `CoreError::NotFound` for an unknown member; `CoreError::Conflict` or a
    /// locked database when another writer interfered (retry the call). On
    /// any error nothing is committed.
    pub fn resolve_today_at(
        &self,
        db: &Database,
        member_id: i64,
        now: DateTime<Utc>,
    ) -> Result<TodayChallenges> {
        db.in_immediate_transaction(|db| self.rotate(db, member_id, now))
    }

    /// Rotation against any store. The caller owns the transaction boundary.
    pub fn rotate<S>(&self, store: &S, member_id: i64, now: DateTime<Utc>) -> Result<TodayChallenges>
    where
        S: MemberStore + ChallengeCatalog + AssociationStore + ?Sized,
    {
        let member = store
            .find_member(member_id)?
            .ok_or_else(|| CoreError::member_not_found(member_id))?;

        let decision = decide(member.challenge_refreshed_at, now, self.day_offset);
        debug!(member_id, ?decision, "rotation decided");

        let challenges: Vec<Challenge> = match decision {
            RotationDecision::Initial => {
                let batch = select_today(store, &BTreeSet::new(), &self.policy)?;
                store.replace_associations(member.id, &batch, now)?;
                batch
            }
            RotationDecision::Rollover => {
                let previous: BTreeSet<i64> = store
                    .find_associations(member.id)?
                    .iter()
                    .map(|issued| issued.challenge.id)
                    .collect();
                let batch = select_today(store, &previous, &self.policy)?;
                store.replace_associations(member.id, &batch, now)?;
                batch
            }
            RotationDecision::Reuse => store
                .find_associations(member.id)?
                .into_iter()
                .map(|issued| issued.challenge)
                .collect(),
        };

        store.stamp_refresh(member.id, now)?;

        info!(
            member_id,
            ?decision,
            issued = challenges.len(),
            "resolved today's challenges"
        );

        Ok(TodayChallenges {
            member_id: member.id,
            decision,
            refreshed_at: now,
            challenges: project(&challenges),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::{NewChallenge, ProficiencyTier};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn never_refreshed_is_initial() {
        assert_eq!(
            decide(None, utc("2026-05-01T12:00:00Z"), Utc.fix()),
            RotationDecision::Initial
        );
    }

    #[test]
    fn just_before_midnight_then_after_is_rollover() {
        let last = utc("2026-05-01T23:59:00Z");
        let now = utc("2026-05-02T00:01:00Z");
        assert_eq!(decide(Some(last), now, Utc.fix()), RotationDecision::Rollover);
    }

    #[test]
    fn early_and_late_same_day_is_reuse() {
        let last = utc("2026-05-01T00:01:00Z");
        let now = utc("2026-05-01T23:58:00Z");
        assert_eq!(decide(Some(last), now, Utc.fix()), RotationDecision::Reuse);
    }

    #[test]
    fn more_than_24_hours_apart_on_adjacent_days_is_rollover() {
        let last = utc("2026-05-01T00:00:00Z");
        let now = utc("2026-05-02T23:59:59Z");
        assert_eq!(decide(Some(last), now, Utc.fix()), RotationDecision::Rollover);
    }

    #[test]
    fn day_boundary_follows_configured_offset() {
        // 14:30Z and 15:30Z straddle midnight in UTC+9.
        let last = utc("2026-05-01T14:30:00Z");
        let now = utc("2026-05-01T15:30:00Z");
        assert_eq!(decide(Some(last), now, Utc.fix()), RotationDecision::Reuse);
        assert_eq!(decide(Some(last), now, kst()), RotationDecision::Rollover);
    }

    #[test]
    fn clock_moving_backwards_across_days_is_rollover() {
        let last = utc("2026-05-02T08:00:00Z");
        let now = utc("2026-05-01T08:00:00Z");
        assert_eq!(decide(Some(last), now, Utc.fix()), RotationDecision::Rollover);
    }

    proptest! {
        #[test]
        fn same_date_reuses_and_other_dates_roll_over(
            day in 0i64..20_000,
            other_day in 0i64..20_000,
            secs_a in 0u32..86_400,
            secs_b in 0u32..86_400,
            offset_min in -1439i32..=1439,
        ) {
            let offset = FixedOffset::east_opt(offset_min * 60).unwrap();
            let epoch = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
            let at = |d: i64, s: u32| {
                let date = epoch + chrono::Duration::days(d);
                let local = date.and_hms_opt(s / 3600, (s / 60) % 60, s % 60).unwrap();
                offset.from_local_datetime(&local).unwrap().with_timezone(&Utc)
            };

            let decision = decide(Some(at(day, secs_a)), at(other_day, secs_b), offset);
            if day == other_day {
                prop_assert_eq!(decision, RotationDecision::Reuse);
            } else {
                prop_assert_eq!(decision, RotationDecision::Rollover);
            }
        }
    }

    #[test]
    fn rotate_reports_missing_member() {
        let db = Database::open_memory().unwrap();
        let err = RotationEngine::default()
            .resolve_today(&db, 404)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: "Member", .. }));
    }

    #[test]
    fn reuse_after_initial_returns_same_order() {
        let db = Database::open_memory().unwrap();
        let member = db.add_member("dopa").unwrap();
        for (title, tier) in [
            ("low", ProficiencyTier::Low),
            ("mid", ProficiencyTier::Mid),
            ("high", ProficiencyTier::High),
        ] {
            db.add_challenge(&NewChallenge::new(title, tier)).unwrap();
        }
        let engine = RotationEngine::default();

        let first = engine
            .resolve_today_at(&db, member.id, utc("2026-05-01T09:00:00Z"))
            .unwrap();
        let second = engine
            .resolve_today_at(&db, member.id, utc("2026-05-01T21:00:00Z"))
            .unwrap();

        assert_eq!(first.decision, RotationDecision::Initial);
        assert_eq!(second.decision, RotationDecision::Reuse);
        assert_eq!(first.challenges, second.challenges);
        let titles: Vec<&str> = first.challenges.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["high", "mid", "low"]);
        assert_eq!(second.refreshed_at, utc("2026-05-01T21:00:00Z"));
    }

    #[test]
    fn engine_from_config_uses_offset_and_policy() {
        let mut config = Config::default();
        config.set("rotation.utc_offset_minutes", "540").unwrap();
        config.set("selection.batch_size", "2").unwrap();

        let engine = RotationEngine::from_config(&config).unwrap();
        assert_eq!(engine.day_offset(), kst());
        assert_eq!(engine.policy().batch_size, 2);
    }
}
