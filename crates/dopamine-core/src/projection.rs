//! Outward representation of issued challenges.

use serde::{Deserialize, Serialize};

use crate::challenge::{Challenge, ProficiencyTier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub id: i64,
    pub title: String,
    pub subtitle: String,
    pub guide: String,
    pub image: String,
    pub tier: ProficiencyTier,
}

impl From<&Challenge> for ChallengeResponse {
    fn from(challenge: &Challenge) -> Self {
        Self {
            id: challenge.id,
            title: challenge.title.clone(),
            subtitle: challenge.subtitle.clone(),
            guide: challenge.guide.clone(),
            image: challenge.image.clone(),
            tier: challenge.tier,
        }
    }
}

/// Project challenges in the order given.
pub fn project(challenges: &[Challenge]) -> Vec<ChallengeResponse> {
    challenges.iter().map(ChallengeResponse::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn projection_keeps_order_and_fields() {
        let challenges: Vec<Challenge> = [ProficiencyTier::Low, ProficiencyTier::High]
            .into_iter()
            .enumerate()
            .map(|(i, tier)| Challenge {
                id: 10 - i as i64,
                title: format!("t{i}"),
                subtitle: "sub".into(),
                guide: "guide".into(),
                image: "img.png".into(),
                tier,
                created_at: Utc::now(),
            })
            .collect();

        let projected = project(&challenges);
        assert_eq!(projected.len(), 2);
        assert_eq!(projected[0].id, 10);
        assert_eq!(projected[1].id, 9);
        assert_eq!(projected[1].tier, ProficiencyTier::High);

        let json = serde_json::to_value(&projected[0]).unwrap();
        assert_eq!(json["tier"], "LOW");
        assert_eq!(json["image"], "img.png");
        assert!(json.get("created_at").is_none());
    }
}
