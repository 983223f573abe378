use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::db::models::{KarmaRecord, NewRecord, UserScore};
use crate::db::{DbError, DbResult, Store};
use crate::util;

/// Vec-backed store used to drive the engine in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<KarmaRecord>>,
}

impl MemoryStore {
    pub async fn with_records(records: &[NewRecord]) -> Self {
        let store = Self::default();
        for record in records {
            store.insert(record).await.unwrap();
        }

        store
    }

    pub async fn records(&self) -> Vec<KarmaRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn insert(&self, record: &NewRecord) -> DbResult<()> {
        if record.points == 0 {
            return Err(DbError::ZeroPoints);
        }

        let mut records = self.records.write().await;
        let id = records.len() as i64 + 1;
        records.push(KarmaRecord {
            id,
            from: record.from.clone(),
            to: record.to.clone(),
            points: record.points,
            reason: record.reason.clone(),
            timestamp: Utc::now().naive_utc(),
        });

        Ok(())
    }

    async fn get_user_score(&self, name: &str) -> DbResult<UserScore> {
        let records = self.records.read().await;
        let mut received = records.iter().filter(|r| r.to == name).peekable();

        if received.peek().is_none() {
            return Err(DbError::NoSuchUser(name.to_owned()));
        }

        Ok(UserScore {
            name: name.to_owned(),
            points: received.map(|r| r.points).sum(),
        })
    }

    async fn get_leaderboard(&self, limit: u32) -> DbResult<Vec<UserScore>> {
        let mut totals: BTreeMap<String, i64> = BTreeMap::new();
        for record in self.records.read().await.iter() {
            *totals.entry(record.to.clone()).or_default() += record.points;
        }

        let mut leaderboard: Vec<_> = totals
            .into_iter()
            .map(|(name, points)| UserScore { name, points })
            .collect();

        // BTreeMap iteration is name-ordered, so a stable sort keeps ties ascending
        leaderboard.sort_by(|a, b| b.points.cmp(&a.points));
        leaderboard.truncate(limit as usize);

        Ok(leaderboard)
    }

    async fn get_total_absolute_points(&self) -> DbResult<i64> {
        Ok(self.records.read().await.iter().map(|r| r.points.abs()).sum())
    }

    async fn get_random_record_for(&self, name: &str) -> DbResult<KarmaRecord> {
        let records = self.records.read().await;
        let received: Vec<_> = records.iter().filter(|r| r.to == name).collect();

        if received.is_empty() {
            return Err(DbError::NoSuchUser(name.to_owned()));
        }

        let idx = util::random_index(received.len() as u64) as usize;
        Ok(received[idx].clone())
    }
}
