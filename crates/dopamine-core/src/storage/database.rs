//! SQLite-based storage for members, the challenge catalog and issued batches.
//!
//! Provides persistent storage for:
//! - Members and their challenge refresh marker
//! - The challenge catalog
//! - Member ↔ challenge links for the current cycle
//! - Key-value store for session bookkeeping

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use super::{data_dir, migrations, Config};
use crate::challenge::{Challenge, NewChallenge, ProficiencyTier};
use crate::error::{is_foreign_key_violation, CoreError, DatabaseError, Result, ValidationError};
use crate::member::{Association, IssuedChallenge, Member};
use crate::store::{AssociationStore, ChallengeCatalog, MemberStore};

const CHALLENGE_COLUMNS: &str = "id, title, subtitle, guide, image, tier, created_at";
const MEMBER_COLUMNS: &str = "id, nickname, challenge_refreshed_at, created_at";

// === Helper Functions ===

/// Parse an RFC3339 column, surfacing malformed values as conversion errors
fn parse_datetime(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_tier(idx: usize, value: &str) -> rusqlite::Result<ProficiencyTier> {
    value
        .parse::<ProficiencyTier>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Build a Challenge from a row, starting at column `base`
fn row_to_challenge(row: &rusqlite::Row, base: usize) -> rusqlite::Result<Challenge> {
    let tier_str: String = row.get(base + 5)?;
    let created_at_str: String = row.get(base + 6)?;
    Ok(Challenge {
        id: row.get(base)?,
        title: row.get(base + 1)?,
        subtitle: row.get(base + 2)?,
        guide: row.get(base + 3)?,
        image: row.get(base + 4)?,
        tier: parse_tier(base + 5, &tier_str)?,
        created_at: parse_datetime(base + 6, &created_at_str)?,
    })
}

fn row_to_member(row: &rusqlite::Row) -> rusqlite::Result<Member> {
    let refreshed_at: Option<String> = row.get(2)?;
    let created_at: String = row.get(3)?;
    Ok(Member {
        id: row.get(0)?,
        nickname: row.get(1)?,
        challenge_refreshed_at: refreshed_at
            .as_deref()
            .map(|s| parse_datetime(2, s))
            .transpose()?,
        created_at: parse_datetime(3, &created_at)?,
    })
}

/// `?, ?, ?` for an `IN (...)` list of `n` values.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// SQLite database for members, challenges and their links.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/dopamine.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(config: &Config) -> Result<Self> {
        let path = data_dir()?.join("dopamine.db");
        Self::open_at(&path, config.busy_timeout())
    }

    /// Open (or create) the database file at `path`.
    ///
    /// Each handle owns its own connection; handles on the same file
    /// serialize rotations through SQLite's write lock, waiting up to
    /// `busy_timeout` for one another.
    pub fn open_at(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(busy_timeout)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    /// Run `f` inside `BEGIN IMMEDIATE`, committing on success and rolling
    /// back on any error.
    ///
    /// The write lock is taken before `f` reads anything, so two handles
    /// working on the same member never interleave.
    pub fn in_immediate_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result = f(self).and_then(|value| {
            self.conn.execute_batch("COMMIT;")?;
            Ok(value)
        });
        if result.is_err() && !self.conn.is_autocommit() {
            let _ = self.conn.execute_batch("ROLLBACK;");
        }
        result
    }

    /// Run `f` under a named savepoint: released on success, rolled back to
    /// on error. Nests inside an open transaction, and outside one behaves as
    /// its own transaction.
    fn in_savepoint<T>(&self, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.conn.execute_batch(&format!("SAVEPOINT {name};"))?;
        match f() {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {name};"))?;
                Ok(value)
            }
            Err(e) => {
                let _ = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"));
                Err(e)
            }
        }
    }

    // === Members ===

    /// Register a member. Nicknames are unique.
    pub fn add_member(&self, nickname: &str) -> Result<Member> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(ValidationError::Blank { field: "nickname" }.into());
        }
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO members (nickname, created_at) VALUES (?1, ?2)",
            params![nickname, created_at.to_rfc3339()],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(member_id = id, "member added");
        Ok(Member {
            id,
            nickname: nickname.to_string(),
            challenge_refreshed_at: None,
            created_at,
        })
    }

    /// Get a member by id.
    ///
    /// # Errors
    /// Returns `CoreError::NotFound` if the member does not exist.
    pub fn get_member(&self, id: i64) -> Result<Member> {
        self.find_member(id)?
            .ok_or_else(|| CoreError::member_not_found(id))
    }

    pub fn find_member_by_nickname(&self, nickname: &str) -> Result<Option<Member>> {
        let member = self
            .conn
            .query_row(
                &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE nickname = ?1"),
                params![nickname.trim()],
                row_to_member,
            )
            .optional()?;
        Ok(member)
    }

    // === Challenge catalog ===

    /// Add a challenge to the catalog.
    pub fn add_challenge(&self, challenge: &NewChallenge) -> Result<Challenge> {
        challenge.validate()?;
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO challenges (title, subtitle, guide, image, tier, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                challenge.title.trim(),
                challenge.subtitle,
                challenge.guide,
                challenge.image,
                challenge.tier.as_str(),
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(Challenge {
            id: self.conn.last_insert_rowid(),
            title: challenge.title.trim().to_string(),
            subtitle: challenge.subtitle.clone(),
            guide: challenge.guide.clone(),
            image: challenge.image.clone(),
            tier: challenge.tier,
            created_at,
        })
    }

    /// Get a challenge by id.
    ///
    /// # Errors
    /// Returns `CoreError::NotFound` if the challenge does not exist.
    pub fn get_challenge(&self, id: i64) -> Result<Challenge> {
        self.conn
            .query_row(
                &format!("SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id = ?1"),
                params![id],
                |row| row_to_challenge(row, 0),
            )
            .optional()?
            .ok_or_else(|| CoreError::challenge_not_found(id))
    }

    pub fn list_challenges(&self) -> Result<Vec<Challenge>> {
        self.eligible_challenges(&BTreeSet::new())
    }

    // === Key-value store ===

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

impl MemberStore for Database {
    fn find_member(&self, id: i64) -> Result<Option<Member>> {
        let member = self
            .conn
            .query_row(
                &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1"),
                params![id],
                row_to_member,
            )
            .optional()?;
        Ok(member)
    }

    fn stamp_refresh(&self, member_id: i64, at: DateTime<Utc>) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE members SET challenge_refreshed_at = ?2 WHERE id = ?1",
            params![member_id, at.to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(CoreError::member_not_found(member_id));
        }
        Ok(())
    }
}

impl ChallengeCatalog for Database {
    fn eligible_challenges(&self, exclude: &BTreeSet<i64>) -> Result<Vec<Challenge>> {
        let sql = if exclude.is_empty() {
            format!("SELECT {CHALLENGE_COLUMNS} FROM challenges ORDER BY id ASC")
        } else {
            format!(
                "SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id NOT IN ({}) ORDER BY id ASC",
                placeholders(exclude.len())
            )
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(exclude.iter()), |row| {
            row_to_challenge(row, 0)
        })?;
        let challenges = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(challenges)
    }
}

impl AssociationStore for Database {
    fn create_association(
        &self,
        member_id: i64,
        challenge_id: i64,
        position: i64,
        issued_at: DateTime<Utc>,
    ) -> Result<Association> {
        let inserted = self.conn.execute(
            "INSERT INTO challenge_members (member_id, challenge_id, position, issued_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![member_id, challenge_id, position, issued_at.to_rfc3339()],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_foreign_key_violation(&e) => {
                return Err(if self.find_member(member_id)?.is_none() {
                    CoreError::member_not_found(member_id)
                } else {
                    CoreError::challenge_not_found(challenge_id)
                });
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Association {
            id: self.conn.last_insert_rowid(),
            member_id,
            challenge_id,
            position,
            issued_at,
        })
    }

    fn delete_associations(&self, associations: &[Association]) -> Result<usize> {
        if associations.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM challenge_members WHERE id IN ({})",
            placeholders(associations.len())
        );
        let deleted = self
            .conn
            .execute(&sql, params_from_iter(associations.iter().map(|a| a.id)))?;
        Ok(deleted)
    }

    fn find_associations(&self, member_id: i64) -> Result<Vec<IssuedChallenge>> {
        let mut stmt = self.conn.prepare(
            "SELECT cm.id, cm.member_id, cm.challenge_id, cm.position, cm.issued_at,
                    c.id, c.title, c.subtitle, c.guide, c.image, c.tier, c.created_at
             FROM challenge_members cm
             JOIN challenges c ON c.id = cm.challenge_id
             WHERE cm.member_id = ?1
             ORDER BY cm.position ASC, cm.id ASC",
        )?;
        let rows = stmt.query_map(params![member_id], |row| {
            let issued_at: String = row.get(4)?;
            Ok(IssuedChallenge {
                association: Association {
                    id: row.get(0)?,
                    member_id: row.get(1)?,
                    challenge_id: row.get(2)?,
                    position: row.get(3)?,
                    issued_at: parse_datetime(4, &issued_at)?,
                },
                challenge: row_to_challenge(row, 5)?,
            })
        })?;
        let issued = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(issued)
    }

    /// Delete and re-issue under one savepoint, so a failure leaves the
    /// previous set untouched even when no transaction is open.
    fn replace_associations(
        &self,
        member_id: i64,
        challenges: &[Challenge],
        issued_at: DateTime<Utc>,
    ) -> Result<Vec<Association>> {
        self.in_savepoint("replace_associations", || {
            let existing: Vec<Association> = self
                .find_associations(member_id)?
                .into_iter()
                .map(|issued| issued.association)
                .collect();
            let deleted = self.delete_associations(&existing)?;
            let issued = self.issue_batch(member_id, challenges, issued_at)?;
            debug!(member_id, deleted, issued = issued.len(), "associations replaced");
            Ok(issued)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_catalog(db: &Database) -> Vec<Challenge> {
        [
            ("Drink water", ProficiencyTier::Low),
            ("Read 20 pages", ProficiencyTier::Mid),
            ("Run 5km", ProficiencyTier::High),
        ]
        .into_iter()
        .map(|(title, tier)| db.add_challenge(&NewChallenge::new(title, tier)).unwrap())
        .collect()
    }

    #[test]
    fn add_and_get_member() {
        let db = Database::open_memory().unwrap();
        let member = db.add_member("  dopa ").unwrap();
        assert_eq!(member.nickname, "dopa");

        let loaded = db.get_member(member.id).unwrap();
        assert_eq!(loaded.nickname, "dopa");
        assert!(loaded.challenge_refreshed_at.is_none());

        let by_nickname = db.find_member_by_nickname("dopa").unwrap().unwrap();
        assert_eq!(by_nickname.id, member.id);
    }

    #[test]
    fn duplicate_nickname_is_conflict() {
        let db = Database::open_memory().unwrap();
        db.add_member("dopa").unwrap();
        let err = db.add_member("dopa").unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)), "got {err:?}");
    }

    #[test]
    fn missing_member_and_challenge_are_not_found() {
        let db = Database::open_memory().unwrap();
        assert!(matches!(db.get_member(42), Err(CoreError::NotFound { entity: "Member", .. })));
        assert!(matches!(
            db.get_challenge(42),
            Err(CoreError::NotFound { entity: "Challenge", .. })
        ));
    }

    #[test]
    fn add_and_get_challenge() {
        let db = Database::open_memory().unwrap();
        let stored = db
            .add_challenge(
                &NewChallenge::new("Meditate", ProficiencyTier::Mid)
                    .with_subtitle("10 minutes")
                    .with_guide("Sit still and breathe")
                    .with_image("meditate.png"),
            )
            .unwrap();

        let loaded = db.get_challenge(stored.id).unwrap();
        assert_eq!(loaded.title, "Meditate");
        assert_eq!(loaded.subtitle, "10 minutes");
        assert_eq!(loaded.guide, "Sit still and breathe");
        assert_eq!(loaded.image, "meditate.png");
        assert_eq!(loaded.tier, ProficiencyTier::Mid);
    }

    #[test]
    fn blank_challenge_title_is_rejected() {
        let db = Database::open_memory().unwrap();
        let err = db
            .add_challenge(&NewChallenge::new(" ", ProficiencyTier::Low))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(db.list_challenges().unwrap().is_empty());
    }

    #[test]
    fn eligible_challenges_honors_exclusion() {
        let db = Database::open_memory().unwrap();
        let catalog = seed_catalog(&db);

        let exclude: BTreeSet<i64> = [catalog[0].id, catalog[2].id].into_iter().collect();
        let eligible = db.eligible_challenges(&exclude).unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, catalog[1].id);

        assert_eq!(db.eligible_challenges(&BTreeSet::new()).unwrap().len(), 3);
    }

    #[test]
    fn associations_round_trip_in_position_order() {
        let db = Database::open_memory().unwrap();
        let member = db.add_member("dopa").unwrap();
        let catalog = seed_catalog(&db);
        let now = Utc::now();

        let reversed: Vec<Challenge> = catalog.iter().rev().cloned().collect();
        db.issue_batch(member.id, &reversed, now).unwrap();

        let issued = db.find_associations(member.id).unwrap();
        let ids: Vec<i64> = issued.iter().map(|i| i.challenge.id).collect();
        let expected: Vec<i64> = reversed.iter().map(|c| c.id).collect();
        assert_eq!(ids, expected);
        assert_eq!(issued[0].association.position, 0);
    }

    #[test]
    fn duplicate_association_is_conflict() {
        let db = Database::open_memory().unwrap();
        let member = db.add_member("dopa").unwrap();
        let catalog = seed_catalog(&db);
        let now = Utc::now();

        db.create_association(member.id, catalog[0].id, 0, now).unwrap();
        let err = db
            .create_association(member.id, catalog[0].id, 1, now)
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn association_to_missing_row_is_not_found() {
        let db = Database::open_memory().unwrap();
        let member = db.add_member("dopa").unwrap();
        let catalog = seed_catalog(&db);

        let err = db
            .create_association(member.id, 999, 0, Utc::now())
            .unwrap_err();
        assert!(
            matches!(err, CoreError::NotFound { entity: "Challenge", ref id } if id == "999"),
            "got {err:?}"
        );
        assert!(!err.is_retryable());

        let err = db
            .create_association(404, catalog[0].id, 0, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: "Member", .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn failed_replace_keeps_previous_set() {
        let db = Database::open_memory().unwrap();
        let member = db.add_member("dopa").unwrap();
        let catalog = seed_catalog(&db);
        let now = Utc::now();

        db.issue_batch(member.id, &catalog[..2], now).unwrap();
        let before = db.find_associations(member.id).unwrap();

        let doubled = vec![catalog[2].clone(), catalog[2].clone()];
        let err = db.replace_associations(member.id, &doubled, now).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        assert_eq!(db.find_associations(member.id).unwrap(), before);
        assert!(db.conn().is_autocommit());
    }

    #[test]
    fn failed_replace_inside_transaction_leaves_transaction_usable() {
        let db = Database::open_memory().unwrap();
        let member = db.add_member("dopa").unwrap();
        let catalog = seed_catalog(&db);
        let now = Utc::now();
        db.issue_batch(member.id, &catalog[..1], now).unwrap();

        let kept: Result<usize> = db.in_immediate_transaction(|db| {
            let doubled = vec![catalog[1].clone(), catalog[1].clone()];
            assert!(db.replace_associations(member.id, &doubled, now).is_err());
            db.replace_associations(member.id, &catalog[1..], now)?;
            Ok(db.find_associations(member.id)?.len())
        });
        assert_eq!(kept.unwrap(), 2);

        let ids: Vec<i64> = db
            .find_associations(member.id)
            .unwrap()
            .iter()
            .map(|i| i.challenge.id)
            .collect();
        assert_eq!(ids, vec![catalog[1].id, catalog[2].id]);
    }

    #[test]
    fn delete_associations_removes_only_given_links() {
        let db = Database::open_memory().unwrap();
        let member = db.add_member("dopa").unwrap();
        let other = db.add_member("other").unwrap();
        let catalog = seed_catalog(&db);
        let now = Utc::now();

        let mine = db.issue_batch(member.id, &catalog, now).unwrap();
        db.issue_batch(other.id, &catalog, now).unwrap();

        assert_eq!(db.delete_associations(&mine).unwrap(), 3);
        assert!(db.find_associations(member.id).unwrap().is_empty());
        assert_eq!(db.find_associations(other.id).unwrap().len(), 3);
        assert_eq!(db.delete_associations(&[]).unwrap(), 0);
    }

    #[test]
    fn replace_associations_swaps_whole_set() {
        let db = Database::open_memory().unwrap();
        let member = db.add_member("dopa").unwrap();
        let catalog = seed_catalog(&db);
        let now = Utc::now();

        db.issue_batch(member.id, &catalog[..2], now).unwrap();
        db.replace_associations(member.id, &catalog[1..], now).unwrap();

        let ids: Vec<i64> = db
            .find_associations(member.id)
            .unwrap()
            .iter()
            .map(|i| i.challenge.id)
            .collect();
        assert_eq!(ids, vec![catalog[1].id, catalog[2].id]);
    }

    #[test]
    fn stamp_refresh_persists_and_requires_member() {
        let db = Database::open_memory().unwrap();
        let member = db.add_member("dopa").unwrap();
        let at = DateTime::parse_from_rfc3339("2026-03-01T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        db.stamp_refresh(member.id, at).unwrap();
        assert_eq!(db.get_member(member.id).unwrap().challenge_refreshed_at, Some(at));

        assert!(matches!(
            db.stamp_refresh(999, at),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = Database::open_memory().unwrap();
        let member = db.add_member("dopa").unwrap();
        let catalog = seed_catalog(&db);
        let now = Utc::now();

        let result: Result<()> = db.in_immediate_transaction(|db| {
            db.issue_batch(member.id, &catalog, now)?;
            db.create_association(member.id, catalog[0].id, 9, now)?;
            Ok(())
        });
        assert!(matches!(result, Err(CoreError::Conflict(_))));
        assert!(db.find_associations(member.id).unwrap().is_empty());
        assert!(db.conn().is_autocommit());
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
    }
}
