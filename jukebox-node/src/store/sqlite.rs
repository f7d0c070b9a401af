//! SQLite-backed document store
//!
//! One table per collection plus a `store_meta` row holding the store-wide
//! revision counter. Every tracklist insert/update bumps the counter inside
//! the same transaction and stamps the row with it, which is what the change
//! feed polls on. Timestamps are stored as integer microseconds so FIFO
//! ordering survives sub-second enqueues.

use super::{StoreError, StoreResult, TracklistChange, TracklistStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jukebox_common::events::TracklistOperation;
use jukebox_common::{Album, NewTracklistEntry, Song, TrackStatus, TracklistEntry};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    )
    "#,
    "INSERT OR IGNORE INTO store_meta (key, value) VALUES ('revision', 0)",
    r#"
    CREATE TABLE IF NOT EXISTS albums (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        artist TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS songs (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        artist TEXT NOT NULL DEFAULT '',
        album TEXT NOT NULL,
        family_friendly INTEGER NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tracklist (
        id TEXT PRIMARY KEY,
        song_id TEXT NOT NULL,
        title TEXT NOT NULL,
        artist TEXT NOT NULL DEFAULT '',
        album TEXT NOT NULL DEFAULT '',
        duration INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'queued',
        priority INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        played_at INTEGER,
        requested_by TEXT NOT NULL DEFAULT '',
        owner_node_id TEXT NOT NULL DEFAULT '',
        assigned_node_id TEXT,
        exists_at_master INTEGER NOT NULL DEFAULT 0,
        length INTEGER,
        created_revision INTEGER NOT NULL,
        revision INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tracklist_status ON tracklist (status, priority, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_tracklist_revision ON tracklist (revision)",
];

const ENTRY_COLUMNS: &str = "id, song_id, title, artist, album, duration, status, priority, \
     created_at, played_at, requested_by, owner_node_id, assigned_node_id, exists_at_master, \
     length, created_revision, revision";

/// SQLite implementation of [`TracklistStore`]
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) a database file and ensure the schema exists
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Some(Duration::from_secs(60)))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("Opened tracklist store at {:?}", path);
        Ok(store)
    }

    /// Private in-memory database (single pooled connection so it is never dropped)
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Tracklist store schema ready");
        Ok(())
    }

    async fn fetch_entries(&self, sql: &str, status: Option<TrackStatus>) -> StoreResult<Vec<TracklistEntry>> {
        let mut query = sqlx::query(sql);
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }
}

/// Bump the store-wide revision inside `tx` and return the new value
async fn next_revision(tx: &mut Transaction<'_, Sqlite>) -> StoreResult<i64> {
    let revision: i64 = sqlx::query_scalar(
        "UPDATE store_meta SET value = value + 1 WHERE key = 'revision' RETURNING value",
    )
    .fetch_one(&mut **tx)
    .await?;
    Ok(revision)
}

fn micros_to_datetime(micros: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {} out of range", micros)))
}

fn seconds_from_column(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn entry_from_row(row: &SqliteRow) -> StoreResult<TracklistEntry> {
    let status: String = row.try_get("status")?;
    let status = status.parse::<TrackStatus>().map_err(StoreError::Corrupt)?;
    let created_at: i64 = row.try_get("created_at")?;
    let played_at: Option<i64> = row.try_get("played_at")?;
    let duration: i64 = row.try_get("duration")?;
    let length: Option<i64> = row.try_get("length")?;
    let priority: i64 = row.try_get("priority")?;

    Ok(TracklistEntry {
        id: row.try_get("id")?,
        song_id: row.try_get("song_id")?,
        title: row.try_get("title")?,
        artist: row.try_get("artist")?,
        album: row.try_get("album")?,
        duration: seconds_from_column(duration),
        status,
        priority: i32::try_from(priority)
            .map_err(|_| StoreError::Corrupt(format!("priority {} out of range", priority)))?,
        created_at: micros_to_datetime(created_at)?,
        played_at: played_at.map(micros_to_datetime).transpose()?,
        requested_by: row.try_get("requested_by")?,
        owner_node_id: row.try_get("owner_node_id")?,
        assigned_node_id: row.try_get("assigned_node_id")?,
        exists_at_master: row.try_get::<i64, _>("exists_at_master")? != 0,
        length: length.map(seconds_from_column),
        revision: row.try_get("revision")?,
    })
}

fn album_from_row(row: &SqliteRow) -> StoreResult<Album> {
    Ok(Album {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        artist: row.try_get("artist")?,
    })
}

fn song_from_row(row: &SqliteRow) -> StoreResult<Song> {
    Ok(Song {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        artist: row.try_get("artist")?,
        album: row.try_get("album")?,
        family_friendly: row.try_get::<i64, _>("family_friendly")? != 0,
    })
}

#[async_trait]
impl TracklistStore for SqliteStore {
    async fn enqueue(&self, new: NewTracklistEntry) -> StoreResult<TracklistEntry> {
        let id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;
        let revision = next_revision(&mut tx).await?;

        sqlx::query(
            r#"
            INSERT INTO tracklist (
                id, song_id, title, artist, album, duration, status, priority, created_at,
                played_at, requested_by, owner_node_id, assigned_node_id, exists_at_master,
                length, created_revision, revision
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, NULL, 0, NULL, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.song_id)
        .bind(&new.title)
        .bind(&new.artist)
        .bind(&new.album)
        .bind(i64::from(new.duration))
        .bind(TrackStatus::Queued.as_str())
        .bind(i64::from(new.priority))
        .bind(new.created_at.timestamp_micros())
        .bind(&new.requested_by)
        .bind(&new.owner_node_id)
        .bind(revision)
        .bind(revision)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(TracklistEntry {
            id,
            song_id: new.song_id,
            title: new.title,
            artist: new.artist,
            album: new.album,
            duration: new.duration,
            status: TrackStatus::Queued,
            priority: new.priority,
            created_at: micros_to_datetime(new.created_at.timestamp_micros())?,
            played_at: None,
            requested_by: new.requested_by,
            owner_node_id: new.owner_node_id,
            assigned_node_id: None,
            exists_at_master: false,
            length: None,
            revision,
        })
    }

    async fn list_by_status(&self, status: TrackStatus) -> StoreResult<Vec<TracklistEntry>> {
        let sql = format!(
            "SELECT {} FROM tracklist WHERE status = ? ORDER BY priority ASC, created_at ASC, rowid ASC",
            ENTRY_COLUMNS
        );
        self.fetch_entries(&sql, Some(status)).await
    }

    async fn list_all(&self) -> StoreResult<Vec<TracklistEntry>> {
        let sql = format!(
            "SELECT {} FROM tracklist ORDER BY priority ASC, created_at ASC, rowid ASC",
            ENTRY_COLUMNS
        );
        self.fetch_entries(&sql, None).await
    }

    async fn get(&self, id: &str) -> StoreResult<Option<TracklistEntry>> {
        let sql = format!("SELECT {} FROM tracklist WHERE id = ?", ENTRY_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn set_status(
        &self,
        id: &str,
        status: TrackStatus,
        assigned_node_id: Option<&str>,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let revision = next_revision(&mut tx).await?;

        let played_at = status.stamps_played_at().then(|| Utc::now().timestamp_micros());
        let result = sqlx::query(
            r#"
            UPDATE tracklist
            SET status = ?,
                played_at = COALESCE(?, played_at),
                assigned_node_id = COALESCE(?, assigned_node_id),
                revision = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(played_at)
        .bind(assigned_node_id)
        .bind(revision)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn set_exists_at_master(
        &self,
        id: &str,
        exists: bool,
        length: Option<u32>,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let revision = next_revision(&mut tx).await?;

        let result = if exists {
            let length = length.filter(|l| *l > 0).map(i64::from);
            sqlx::query(
                "UPDATE tracklist SET exists_at_master = 1, length = COALESCE(?, length), revision = ? WHERE id = ?",
            )
            .bind(length)
            .bind(revision)
            .bind(id)
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                "UPDATE tracklist SET exists_at_master = 0, length = NULL, revision = ? WHERE id = ?",
            )
            .bind(revision)
            .bind(id)
            .execute(&mut *tx)
            .await?
        };

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM tracklist WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_all(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM tracklist").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn current_revision(&self) -> StoreResult<i64> {
        let revision: i64 =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'revision'")
                .fetch_one(&self.pool)
                .await?;
        Ok(revision)
    }

    async fn changes_since(&self, revision: i64) -> StoreResult<Vec<TracklistChange>> {
        let sql = format!(
            "SELECT {} FROM tracklist WHERE revision > ? ORDER BY revision ASC",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(revision).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                let created_revision: i64 = row.try_get("created_revision")?;
                let operation = if created_revision > revision {
                    TracklistOperation::Insert
                } else {
                    TracklistOperation::Update
                };
                Ok(TracklistChange {
                    operation,
                    entry: entry_from_row(row)?,
                })
            })
            .collect()
    }

    async fn list_albums(&self) -> StoreResult<Vec<Album>> {
        let rows = sqlx::query("SELECT id, title, artist FROM albums ORDER BY title COLLATE NOCASE")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(album_from_row).collect()
    }

    async fn upsert_album(&self, album: &Album) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO albums (id, title, artist) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET title = excluded.title, artist = excluded.artist
            "#,
        )
        .bind(&album.id)
        .bind(&album.title)
        .bind(&album.artist)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_album(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM albums WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_songs(&self) -> StoreResult<Vec<Song>> {
        let rows = sqlx::query(
            "SELECT id, title, artist, album, family_friendly FROM songs \
             ORDER BY album COLLATE NOCASE, title COLLATE NOCASE",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(song_from_row).collect()
    }

    async fn find_song(&self, album: &str, title: &str) -> StoreResult<Option<Song>> {
        let row = sqlx::query(
            "SELECT id, title, artist, album, family_friendly FROM songs \
             WHERE album = ? COLLATE NOCASE AND title = ? COLLATE NOCASE LIMIT 1",
        )
        .bind(album)
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(song_from_row).transpose()
    }

    async fn upsert_song(&self, song: &Song) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO songs (id, title, artist, album, family_friendly) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                album = excluded.album,
                family_friendly = excluded.family_friendly
            "#,
        )
        .bind(&song.id)
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.album)
        .bind(song.family_friendly)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_song(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM songs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
