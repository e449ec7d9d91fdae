//! SQLite implementation of the repository contract.
//!
//! The connection sits behind a `std::sync::Mutex`; every operation is a
//! short single-row statement with no await points under the guard, so the
//! async trait methods stay safe to call from any task.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{GuildSettings, NewPlayer, Repository, StoreError, Subscription, TrackedPlayer};

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// In-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        // WAL for concurrent readers; foreign keys for subscription cascade.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        // Schema statements all use IF NOT EXISTS, so this is idempotent.
        conn.execute_batch(include_str!("schema.sql"))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn player_from_row(row: &Row<'_>) -> Result<TrackedPlayer, rusqlite::Error> {
    Ok(TrackedPlayer {
        id: row.get(0)?,
        external_id: row.get(1)?,
        display_name: row.get(2)?,
        game: row.get(3)?,
        last_state: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const PLAYER_COLUMNS: &str =
    "id, external_id, display_name, game, last_state, created_at, updated_at";

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn list_tracked_players(&self) -> Result<Vec<TrackedPlayer>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players ORDER BY id"
        ))?;
        let rows = stmt.query_map([], player_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn update_last_state(&self, player_id: i64, state: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE players SET last_state = ?1, updated_at = ?2 WHERE id = ?3",
            params![state, now(), player_id],
        )?;
        Ok(())
    }

    async fn subscriptions_for_player(
        &self,
        player_id: i64,
    ) -> Result<Vec<Subscription>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, player_id, guild_id, registered_by, created_at
             FROM subscriptions WHERE player_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![player_id], |row| {
            Ok(Subscription {
                id: row.get(0)?,
                player_id: row.get(1)?,
                guild_id: row.get(2)?,
                registered_by: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn guild_settings(&self, guild_id: &str) -> Result<Option<GuildSettings>, StoreError> {
        let conn = self.lock();
        let settings = conn
            .query_row(
                "SELECT guild_id, channel_id, created_at FROM guild_settings WHERE guild_id = ?1",
                params![guild_id],
                |row| {
                    Ok(GuildSettings {
                        guild_id: row.get(0)?,
                        channel_id: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    async fn find_player(
        &self,
        external_id: &str,
        game: &str,
    ) -> Result<Option<TrackedPlayer>, StoreError> {
        let conn = self.lock();
        let player = conn
            .query_row(
                &format!(
                    "SELECT {PLAYER_COLUMNS} FROM players WHERE external_id = ?1 AND game = ?2"
                ),
                params![external_id, game],
                player_from_row,
            )
            .optional()?;
        Ok(player)
    }

    async fn find_player_by_name(
        &self,
        display_name: &str,
        game: &str,
    ) -> Result<Option<TrackedPlayer>, StoreError> {
        let conn = self.lock();
        let player = conn
            .query_row(
                &format!(
                    "SELECT {PLAYER_COLUMNS} FROM players WHERE display_name = ?1 AND game = ?2"
                ),
                params![display_name, game],
                player_from_row,
            )
            .optional()?;
        Ok(player)
    }

    async fn create_player(&self, new: NewPlayer) -> Result<TrackedPlayer, StoreError> {
        let conn = self.lock();
        let created_at = now();
        conn.execute(
            "INSERT INTO players (external_id, display_name, game, last_state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![new.external_id, new.display_name, new.game, new.last_state, created_at],
        )?;
        let id = conn.last_insert_rowid();
        Ok(TrackedPlayer {
            id,
            external_id: new.external_id,
            display_name: new.display_name,
            game: new.game,
            last_state: new.last_state,
            created_at: created_at.clone(),
            updated_at: created_at,
        })
    }

    async fn add_subscription(
        &self,
        player_id: i64,
        guild_id: &str,
        registered_by: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO subscriptions (player_id, guild_id, registered_by, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![player_id, guild_id, registered_by, now()],
        )?;
        Ok(changed > 0)
    }

    async fn remove_subscription(
        &self,
        player_id: i64,
        guild_id: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.lock();
        let changed = conn.execute(
            "DELETE FROM subscriptions WHERE player_id = ?1 AND guild_id = ?2",
            params![player_id, guild_id],
        )?;
        Ok(changed > 0)
    }

    async fn players_in_guild(&self, guild_id: &str) -> Result<Vec<TrackedPlayer>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.external_id, p.display_name, p.game, p.last_state,
                    p.created_at, p.updated_at
             FROM players p
             JOIN subscriptions s ON p.id = s.player_id
             WHERE s.guild_id = ?1 ORDER BY p.id",
        )?;
        let rows = stmt.query_map(params![guild_id], player_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn upsert_guild_settings(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO guild_settings (guild_id, channel_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(guild_id) DO UPDATE SET channel_id = excluded.channel_id",
            params![guild_id, channel_id, now()],
        )?;
        Ok(())
    }
}
