use std::str::FromStr;

use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use sqlx::prelude::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::instrument;

use crate::db::models::{KarmaRecord, NewRecord, UserScore};
use crate::db::{DbError, DbResult, Store};
use crate::util;

const MEMORY_PATH: &str = ":memory:";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const CREATE_TABLE: &str = r#"
    create table if not exists karma (
        "id" integer primary key,
        "from" text not null,
        "to" text not null,
        "points" integer not null check ("points" != 0),
        "reason" text,
        "timestamp" text not null default (strftime('%Y-%m-%d %H:%M:%f', 'now'))
    )
"#;

const CREATE_INDEX: &str = r#"create index if not exists idx_to on karma ("to")"#;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and ensures the schema exists.
    ///
    /// `:memory:` opens a private in-memory database held by a single pooled connection.
    #[instrument]
    pub async fn connect(path: &str) -> DbResult<Self> {
        let pool = if path == MEMORY_PATH {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                .await?
        } else {
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new().connect_with(options).await?
        };

        let store = Self { pool };
        store.create_schema().await?;

        tracing::debug!(path, "database ready");
        Ok(store)
    }

    async fn create_schema(&self) -> DbResult<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;

        Ok(())
    }

    async fn count_for(&self, name: &str) -> DbResult<i64> {
        let count = sqlx::query_scalar(r#"select count(*) from karma where "to" = ?"#)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[derive(Debug, FromRow)]
struct RecordRow {
    id: i64,
    from: String,
    to: String,
    points: i64,
    reason: Option<String>,
    timestamp: String,
}

impl TryFrom<RecordRow> for KarmaRecord {
    type Error = DbError;

    fn try_from(row: RecordRow) -> DbResult<Self> {
        let timestamp = NaiveDateTime::parse_from_str(&row.timestamp, TIMESTAMP_FORMAT)
            .map_err(|_| DbError::Timestamp(row.timestamp.clone()))?;

        Ok(Self {
            id: row.id,
            from: row.from,
            to: row.to,
            points: row.points,
            reason: row.reason,
            timestamp,
        })
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    #[instrument(skip(self))]
    async fn insert(&self, record: &NewRecord) -> DbResult<()> {
        if record.points == 0 {
            return Err(DbError::ZeroPoints);
        }

        match sqlx::query(
            r#"insert into karma ("from", "to", "points", "reason") values (?, ?, ?, ?)"#,
        )
        .bind(&record.from)
        .bind(&record.to)
        .bind(record.points)
        .bind(&record.reason)
        .execute(&self.pool)
        .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(error = ?e, "failure during karma insertion");
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_user_score(&self, name: &str) -> DbResult<UserScore> {
        let (count, points): (i64, i64) = sqlx::query_as(
            r#"select count(*), coalesce(sum("points"), 0) from karma where "to" = ?"#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        if count == 0 {
            return Err(DbError::NoSuchUser(name.to_owned()));
        }

        Ok(UserScore {
            name: name.to_owned(),
            points,
        })
    }

    #[instrument(skip(self))]
    async fn get_leaderboard(&self, limit: u32) -> DbResult<Vec<UserScore>> {
        let leaderboard = sqlx::query_as::<_, UserScore>(
            r#"
            select "to" as name, sum("points") as points
            from karma
            group by "to"
            order by points desc, name asc
            limit ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(leaderboard)
    }

    #[instrument(skip(self))]
    async fn get_total_absolute_points(&self) -> DbResult<i64> {
        let total = sqlx::query_scalar(r#"select coalesce(sum(abs("points")), 0) from karma"#)
            .fetch_one(&self.pool)
            .await?;

        Ok(total)
    }

    #[instrument(skip(self))]
    async fn get_random_record_for(&self, name: &str) -> DbResult<KarmaRecord> {
        let count = self.count_for(name).await?;
        if count <= 0 {
            return Err(DbError::NoSuchUser(name.to_owned()));
        }

        let offset = util::random_index(count as u64) as i64;
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            select "id", "from", "to", "points", "reason", "timestamp"
            from karma
            where "to" = ?
            order by "id"
            limit 1 offset ?
            "#,
        )
        .bind(name)
        .bind(offset)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| DbError::NoSuchUser(name.to_owned()))?
            .try_into()
    }
}
