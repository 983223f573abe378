use std::fmt;

use thiserror::Error;

use crate::db::DbError;

pub mod web;

/// Links replies to the dashboard, when there is one.
pub trait UiPort: Send + Sync + fmt::Debug {
    /// Absolute URL for `path`, or `None` when no dashboard is running.
    fn get_url(&self, path: &str) -> UiResult<Option<String>>;
}

/// Used when the dashboard is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlankUi;

impl UiPort for BlankUi {
    fn get_url(&self, _path: &str) -> UiResult<Option<String>> {
        Ok(None)
    }
}

pub type UiResult<T> = core::result::Result<T, UiError>;

#[derive(Debug, Error)]
pub enum UiError {
    #[error("no TOTP secret configured; set KARMABOT_WEBUI_TOTP, e.g. to '{generated}'")]
    MissingTotp { generated: String },

    #[error("invalid TOTP secret: {0}")]
    InvalidTotp(String),

    #[error("unable to generate a TOTP token: {0}")]
    Token(#[from] std::time::SystemTimeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Db(#[from] DbError),
}
