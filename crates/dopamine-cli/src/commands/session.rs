use clap::Subcommand;
use dopamine_core::{Config, Database, SessionStore};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Mark an access token as logged out
    Logout {
        /// Access token
        token: String,
    },
    /// Report whether a token was logged out
    Check {
        /// Access token
        token: String,
    },
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Database::open(&config)?;
    let sessions = SessionStore::new(&db);

    match action {
        SessionAction::Logout { token } => {
            sessions.invalidate_token(&token)?;
            println!("logged out");
        }
        SessionAction::Check { token } => {
            let invalidated = sessions.is_token_invalidated(&token)?;
            println!("{}", serde_json::json!({ "invalidated": invalidated }));
        }
    }
    Ok(())
}
