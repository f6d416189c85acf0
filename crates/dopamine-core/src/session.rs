//! Logout bookkeeping.
//!
//! Access tokens themselves are validated elsewhere; this module only records
//! which tokens were logged out. Tokens are kept as SHA-256 digests in the
//! database kv table.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{Result, ValidationError};
use crate::storage::Database;

const KEY_PREFIX: &str = "logout:";

fn token_key(token: &str) -> String {
    let digest = Sha256::digest(token.trim().as_bytes());
    format!("{KEY_PREFIX}{}", hex::encode(digest))
}

/// Invalidated-token store over a [`Database`].
pub struct SessionStore<'a> {
    db: &'a Database,
}

impl<'a> SessionStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Mark `token` as logged out. Repeating the call is harmless.
    pub fn invalidate_token(&self, token: &str) -> Result<()> {
        if token.trim().is_empty() {
            return Err(ValidationError::Blank { field: "token" }.into());
        }
        self.db.kv_set(&token_key(token), &Utc::now().to_rfc3339())?;
        info!("token invalidated");
        Ok(())
    }

    pub fn is_token_invalidated(&self, token: &str) -> Result<bool> {
        Ok(self.db.kv_get(&token_key(token))?.is_some())
    }
}
