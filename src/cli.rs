use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Parser, Debug)]
#[command(name = "karmabot", version, about = "Slack karma bot and its admin tools")]
pub struct Cli {
    /// SQLite database path (overrides KARMABOT_DB)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Show detailed errors in chat replies (overrides KARMABOT_DEBUG)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Connect to Slack and start handling karma commands (default)
    Run,

    /// Serve the web dashboard only
    Web,

    /// Print a current dashboard token, or a fresh secret when none is configured
    Mktotp,

    #[command(flatten)]
    Admin(AdminCommand),
}

/// Subcommands that only touch the database.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Record a karma operation by hand
    Add {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, allow_negative_numbers = true)]
        points: i64,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Move a user's whole total to another user
    Migrate {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },

    /// Bring a user back to zero
    Reset {
        #[arg(long)]
        user: String,
    },

    /// Override a user's total
    Set {
        #[arg(long)]
        user: String,
        #[arg(long, allow_negative_numbers = true)]
        points: i64,
    },

    /// Print a random karma operation received by a user
    Throwback {
        #[arg(long)]
        user: String,
    },
}

impl Cli {
    pub fn action(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    /// Applies command-line overrides on top of the environment settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(db) = &self.db {
            settings.db = db.clone();
        }

        if self.debug {
            settings.debug = true;
        }
    }
}
