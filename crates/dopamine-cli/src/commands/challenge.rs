//! Challenge catalog commands for CLI.

use clap::Subcommand;
use dopamine_core::projection::project;
use dopamine_core::{ChallengeResponse, Config, Database, NewChallenge, ProficiencyTier};

#[derive(Subcommand)]
pub enum ChallengeAction {
    /// Add a challenge to the catalog
    Add {
        /// Challenge title
        title: String,
        /// Proficiency tier: low, mid or high
        #[arg(long)]
        tier: ProficiencyTier,
        /// Subtitle
        #[arg(long, default_value = "")]
        subtitle: String,
        /// How-to guide text
        #[arg(long, default_value = "")]
        guide: String,
        /// Image reference
        #[arg(long, default_value = "")]
        image: String,
    },
    /// Show a challenge by id
    Get {
        /// Challenge ID
        id: i64,
    },
    /// List the catalog
    List {
        /// Filter by tier
        #[arg(long)]
        tier: Option<ProficiencyTier>,
    },
}

pub fn run(action: ChallengeAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Database::open(&config)?;

    match action {
        ChallengeAction::Add {
            title,
            tier,
            subtitle,
            guide,
            image,
        } => {
            let challenge = db.add_challenge(
                &NewChallenge::new(title, tier)
                    .with_subtitle(subtitle)
                    .with_guide(guide)
                    .with_image(image),
            )?;
            eprintln!("Challenge added: {}", challenge.id);
            println!(
                "{}",
                serde_json::to_string_pretty(&ChallengeResponse::from(&challenge))?
            );
        }
        ChallengeAction::Get { id } => {
            let challenge = db.get_challenge(id)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&ChallengeResponse::from(&challenge))?
            );
        }
        ChallengeAction::List { tier } => {
            let challenges: Vec<_> = db
                .list_challenges()?
                .into_iter()
                .filter(|c| tier.map_or(true, |t| c.tier == t))
                .collect();
            println!("{}", serde_json::to_string_pretty(&project(&challenges))?);
        }
    }
    Ok(())
}
