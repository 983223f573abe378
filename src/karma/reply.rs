use chrono::NaiveDateTime;

use crate::db::models::{KarmaRecord, UserScore};
use crate::util::humanize::relative_time;
use crate::util::munge::munge;

pub const GENERIC_ERROR: &str = "an error has occurred.";
pub const WEBUI_DISABLED: &str = "webui not enabled. please set `KARMABOT_WEBUI_LISTEN_ADDR` and \
     `KARMABOT_WEBUI_TOTP` in order to enable the web ui";

/// `"<name> == <total> (+<delta>[ for <reason>])"`
pub fn points_given(name: &str, total: i64, delta: i64, reason: Option<&str>) -> String {
    let sign = if delta < 0 { '-' } else { '+' };
    let mut text = format!("{name} == {total} ({sign}{}", delta.abs());

    if let Some(reason) = reason {
        text.push_str(" for ");
        text.push_str(reason);
    }

    text.push(')');
    text
}

pub fn score(score: &UserScore) -> String {
    format!("{} == {}", score.name, score.points)
}

/// Numbered listing with munged names, optionally linking to the dashboard.
pub fn leaderboard(limit: u32, link: Option<&str>, entries: &[UserScore]) -> String {
    let mut lines = vec![format!("*top {limit} leaderboard*")];
    lines.extend(link.map(str::to_owned));

    lines.extend(
        entries
            .iter()
            .enumerate()
            .map(|(i, user)| format!("{}. {} == {}", i + 1, munge(&user.name), user.points)),
    );

    lines.join("\n")
}

pub fn throwback(record: &KarmaRecord, now: NaiveDateTime) -> String {
    let mut text = format!(
        "{} received {} points from {} {}",
        munge(&record.to),
        record.points,
        munge(&record.from),
        relative_time(record.timestamp, now),
    );

    if let Some(reason) = record.reason.as_deref().filter(|r| !r.is_empty()) {
        text.push_str(" for ");
        text.push_str(reason);
    }

    text
}
