//! Today's challenges for a member.

use chrono::{DateTime, Utc};
use clap::Args;
use dopamine_core::{Config, Database, RotationEngine};
use tracing::debug;

#[derive(Args)]
pub struct TodayArgs {
    /// Member ID
    member_id: i64,
    /// Resolve as of this RFC 3339 instant instead of now
    #[arg(long)]
    at: Option<String>,
}

pub fn run(args: TodayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Database::open(&config)?;
    let engine = RotationEngine::from_config(&config)?;

    let now = match args.at {
        Some(at) => DateTime::parse_from_rfc3339(&at)
            .map_err(|e| format!("invalid --at '{at}': {e}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    debug!(member_id = args.member_id, %now, "resolving today's challenges");
    let today = engine.resolve_today_at(&db, args.member_id, now)?;
    println!("{}", serde_json::to_string_pretty(&today)?);
    Ok(())
}
