//! Member management commands for CLI.

use clap::Subcommand;
use dopamine_core::{Config, Database};

#[derive(Subcommand)]
pub enum MemberAction {
    /// Register a new member
    Add {
        /// Unique nickname
        nickname: String,
    },
    /// Show a member by id
    Get {
        /// Member ID
        id: i64,
    },
    /// Find a member by nickname
    Find {
        /// Nickname
        nickname: String,
    },
}

pub fn run(action: MemberAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Database::open(&config)?;

    match action {
        MemberAction::Add { nickname } => {
            let member = db.add_member(&nickname)?;
            eprintln!("Member added: {}", member.id);
            println!("{}", serde_json::to_string_pretty(&member)?);
        }
        MemberAction::Get { id } => {
            let member = db.get_member(id)?;
            println!("{}", serde_json::to_string_pretty(&member)?);
        }
        MemberAction::Find { nickname } => match db.find_member_by_nickname(&nickname)? {
            Some(member) => println!("{}", serde_json::to_string_pretty(&member)?),
            None => return Err(format!("Member not found: {nickname}").into()),
        },
    }
    Ok(())
}
