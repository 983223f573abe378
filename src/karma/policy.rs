use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyRejection {
    #[error("'{0}' is blacklisted")]
    Blacklisted(String),

    #[error("you are not allowed to give karma to yourself")]
    SelfKarma,
}

/// Checks an operation from `from` to `to` (both canonical names) against the blacklist and the
/// self-karma setting.
pub fn check(config: &Config, from: &str, to: &str) -> Result<(), PolicyRejection> {
    if config.blacklist.contains(to) {
        return Err(PolicyRejection::Blacklisted(to.to_owned()));
    }

    if !config.self_karma && from == to {
        return Err(PolicyRejection::SelfKarma);
    }

    Ok(())
}

/// Caps the magnitude of `points` at `max_points`, keeping its sign.
pub fn clamp(points: i64, max_points: u32) -> i64 {
    points.signum() * points.abs().min(i64::from(max_points))
}
