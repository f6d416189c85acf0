//! Challenge catalog entries and proficiency tiers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Difficulty classification of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProficiencyTier {
    Low,
    Mid,
    High,
}

impl ProficiencyTier {
    /// All tiers in issuing order.
    pub const ALL: [ProficiencyTier; 3] =
        [ProficiencyTier::High, ProficiencyTier::Mid, ProficiencyTier::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            ProficiencyTier::Low => "LOW",
            ProficiencyTier::Mid => "MID",
            ProficiencyTier::High => "HIGH",
        }
    }
}

impl fmt::Display for ProficiencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProficiencyTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(ProficiencyTier::Low),
            "MID" => Ok(ProficiencyTier::Mid),
            "HIGH" => Ok(ProficiencyTier::High),
            _ => Err(ValidationError::UnknownTier(s.to_string())),
        }
    }
}

/// A task item offered to members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: i64,
    pub title: String,
    pub subtitle: String,
    /// How-to text shown with the challenge
    pub guide: String,
    /// Image reference (URL or asset key)
    pub image: String,
    pub tier: ProficiencyTier,
    pub created_at: DateTime<Utc>,
}

/// Fields for a catalog entry that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChallenge {
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub guide: String,
    #[serde(default)]
    pub image: String,
    pub tier: ProficiencyTier,
}

impl NewChallenge {
    pub fn new(title: impl Into<String>, tier: ProficiencyTier) -> Self {
        Self {
            title: title.into(),
            subtitle: String::new(),
            guide: String::new(),
            image: String::new(),
            tier,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    pub fn with_guide(mut self, guide: impl Into<String>) -> Self {
        self.guide = guide.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::Blank { field: "title" });
        }
        Ok(())
    }
}
