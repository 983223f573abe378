use chrono::NaiveDateTime;
use serde::Serialize;

/// A karma operation that has not been stored yet; the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub from: String,
    pub to: String,
    pub points: i64,
    pub reason: Option<String>,
}

impl NewRecord {
    pub fn new(from: &str, to: &str, points: i64, reason: Option<&str>) -> Self {
        Self {
            from: from.to_owned(),
            to: to.to_owned(),
            points,
            reason: reason.map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KarmaRecord {
    pub id: i64,
    pub from: String,
    pub to: String,
    pub points: i64,
    pub reason: Option<String>,
    pub timestamp: NaiveDateTime,
}

/// A user's net karma, derived from the record log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UserScore {
    pub name: String,
    pub points: i64,
}
