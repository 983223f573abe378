use thiserror::Error;

use crate::chat::ChatError;
use crate::db::DbError;
use crate::ui::UiError;

pub mod dispatch;
pub mod engine;
pub mod patterns;
pub mod policy;
pub mod reaction;
pub mod reply;
pub mod users;

pub use engine::Bot;
pub use policy::PolicyRejection;

pub type KarmaResult<T> = core::result::Result<T, KarmaError>;

#[derive(Debug, Error)]
pub enum KarmaError {
    #[error("unable to resolve user: {0}")]
    Lookup(#[from] ChatError),

    #[error(transparent)]
    Policy(#[from] PolicyRejection),

    #[error("database error: {0}")]
    Persistence(DbError),

    #[error("could not find any karma operations for {0}")]
    NotFound(String),

    #[error("invalid leaderboard limit '{0}'")]
    InvalidLimit(String),

    #[error("webui error: {0}")]
    Ui(#[from] UiError),

    #[error("invalid command grammar: {0}")]
    Grammar(#[from] regex::Error),
}

impl From<DbError> for KarmaError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NoSuchUser(name) => KarmaError::NotFound(name),
            other => KarmaError::Persistence(other),
        }
    }
}

impl KarmaError {
    /// What the requester gets to see, if anything.
    ///
    /// Expected conditions (unknown user, self-karma) are always shown verbatim; blacklisted
    /// targets are dropped silently; everything else is only detailed in debug mode.
    pub fn user_message(&self, debug: bool) -> Option<String> {
        match self {
            KarmaError::Policy(PolicyRejection::Blacklisted(_)) => None,
            KarmaError::Policy(rejection) => Some(rejection.to_string()),
            KarmaError::NotFound(_) => Some(self.to_string()),
            _ if debug => Some(self.to_string()),
            _ => Some(reply::GENERIC_ERROR.to_owned()),
        }
    }
}
