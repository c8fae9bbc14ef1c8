//! SQLite Repository 実装 (sqlx)
//!
//! 永続ストアとして SQLite を使用します。スキーマは接続時に作成されます。

pub mod message;
pub mod room;

use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::domain::{Channel, RepositoryError, ValueObjectError};

pub use message::SqliteMessageStore;
pub use room::SqliteRoomRepository;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS rooms (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    visibility  TEXT NOT NULL,
    creator_id  TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    invite_code TEXT UNIQUE
);

CREATE TABLE IF NOT EXISTS memberships (
    room_id   TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
    user_id   TEXT NOT NULL,
    joined_at INTEGER NOT NULL,
    PRIMARY KEY (room_id, user_id)
);

CREATE TABLE IF NOT EXISTS join_requests (
    id               TEXT PRIMARY KEY,
    room_id          TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
    requester_id     TEXT NOT NULL,
    requester_name   TEXT NOT NULL,
    requester_avatar TEXT NOT NULL,
    message          TEXT,
    status           TEXT NOT NULL,
    created_at       INTEGER NOT NULL,
    decided_at       INTEGER
);

CREATE UNIQUE INDEX IF NOT EXISTS join_requests_one_pending
    ON join_requests (room_id, requester_id) WHERE status = 'pending';

CREATE TABLE IF NOT EXISTS messages (
    id            INTEGER PRIMARY KEY,
    author_id     TEXT NOT NULL,
    author_name   TEXT NOT NULL,
    author_avatar TEXT NOT NULL,
    room_id       TEXT,
    body          TEXT NOT NULL,
    created_at    INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS messages_room_time ON messages (room_id, created_at, id);
CREATE INDEX IF NOT EXISTS messages_natural_key ON messages (author_id, created_at);
"#;

/// Open a pool and make sure the schema exists.
///
/// In-memory databases are private to a connection, so they get a single one.
pub async fn connect(database_url: &str) -> Result<SqlitePool, RepositoryError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let max_connections = if database_url.contains(":memory:") { 1 } else { 8 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;

    tracing::info!(database_url, "sqlite storage ready");
    Ok(pool)
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row".to_string()),
            _ => RepositoryError::Unavailable(err.to_string()),
        }
    }
}

fn corrupt(err: ValueObjectError) -> RepositoryError {
    RepositoryError::Unavailable(format!("corrupt row: {err}"))
}

/// NULL stands for the public channel.
fn channel_param(channel: &Channel) -> Option<String> {
    channel.room_id().map(|id| id.as_str().to_string())
}
