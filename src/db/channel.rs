//! Channel catalog repository

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{DbPool, parse_datetime};
use crate::playlist::PlaylistEntry;
use crate::{Error, Result};

/// A stored streaming channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub tvg_name: String,
    pub tvg_logo: String,
    pub group_title: String,
    pub stream_url: String,
    /// Playlist the channel was imported from
    pub source_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const CHANNEL_COLUMNS: &str =
    "id, tvg_name, tvg_logo, group_title, stream_url, source_url, created_at, updated_at";

fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        tvg_name: row.get(1)?,
        tvg_logo: row.get(2)?,
        group_title: row.get(3)?,
        stream_url: row.get(4)?,
        source_url: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

/// Channel repository
#[derive(Clone)]
pub struct ChannelRepo {
    pool: DbPool,
}

impl ChannelRepo {
    /// Create a new channel repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Replace every channel imported from `source_url` with `entries`
    ///
    /// Runs in one transaction so readers never see a half-imported source.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn replace_source(&self, source_url: &str, entries: &[PlaylistEntry]) -> Result<usize> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM channels WHERE source_url = ?1", [source_url])?;

        let now = Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO channels
                 (id, tvg_name, tvg_logo, group_title, stream_url, source_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            )?;
            for entry in entries {
                stmt.execute(rusqlite::params![
                    Uuid::new_v4().to_string(),
                    entry.name,
                    entry.logo,
                    entry.group,
                    entry.stream_url,
                    source_url,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(
            source_url = %source_url,
            removed,
            inserted = entries.len(),
            "replaced channels for source"
        );

        Ok(entries.len())
    }

    /// List channels ordered by name, optionally restricted to one group
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list(&self, group: Option<&str>) -> Result<Vec<Channel>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = if group.is_some() {
            conn.prepare(&format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels WHERE group_title = ?1 ORDER BY tvg_name ASC"
            ))?
        } else {
            conn.prepare(&format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY tvg_name ASC"
            ))?
        };

        let rows = match group {
            Some(group) => stmt.query_map([group], row_to_channel)?,
            None => stmt.query_map([], row_to_channel)?,
        };
        let channels: Vec<Channel> = rows.filter_map(std::result::Result::ok).collect();

        Ok(channels)
    }

    /// List the distinct group titles, ordered
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_groups(&self) -> Result<Vec<String>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt =
            conn.prepare("SELECT DISTINCT group_title FROM channels ORDER BY group_title ASC")?;
        let groups: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(groups)
    }
}
