//! Staged unit of work over the channel and item tables.
//!
//! A [`Session`] wraps a single SQLite transaction. Every merge and delete is
//! visible to later reads on the same session but to nobody else until
//! [`Session::commit`]. [`Session::discard`] (or dropping the session) rolls
//! the whole batch back, which is what dry-run mode relies on.

use sqlx::{Sqlite, Transaction};

use super::schema::Database;
use super::types::{Channel, ChannelRow, DatabaseError, Item, ItemRow};

pub(crate) const CHANNEL_COLUMNS: &str = "id, url, name, feed_url, autodownload";
pub(crate) const ITEM_COLUMNS: &str = "id, url, title, published, channel_id, downloaded";

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Committed,
    Discarded,
}

impl SessionEnd {
    pub fn is_committed(self) -> bool {
        matches!(self, SessionEnd::Committed)
    }
}

pub struct Session {
    tx: Transaction<'static, Sqlite>,
}

impl Database {
    /// Begin a new session. Nothing is written until the session commits.
    pub async fn session(&self) -> Result<Session, DatabaseError> {
        let tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;
        Ok(Session { tx })
    }
}

impl Session {
    // ========================================================================
    // Lookups
    // ========================================================================

    /// Channels whose id, url, or name equals `reference` exactly.
    pub async fn find_channels(&mut self, reference: &str) -> Result<Vec<Channel>, DatabaseError> {
        let rows = sqlx::query_as::<_, ChannelRow>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1 OR url = ?1 OR name = ?1 ORDER BY name, id"
        ))
        .bind(reference)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Channel::from).collect())
    }

    pub async fn get_channel(&mut self, id: &str) -> Result<Option<Channel>, DatabaseError> {
        let row = sqlx::query_as::<_, ChannelRow>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Channel::from))
    }

    /// Every subscribed channel, ordered by name.
    pub async fn all_channels(&mut self) -> Result<Vec<Channel>, DatabaseError> {
        let rows = sqlx::query_as::<_, ChannelRow>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY name, id"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Channel::from).collect())
    }

    /// Look up an item by id, regardless of the channel that owns it.
    pub async fn get_item(&mut self, id: &str) -> Result<Option<Item>, DatabaseError> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Item::from))
    }

    // ========================================================================
    // Staged writes
    // ========================================================================

    /// Insert the channel, or overwrite every field of the existing row.
    ///
    /// Uses `ON CONFLICT DO UPDATE` rather than `INSERT OR REPLACE`: REPLACE
    /// deletes the old row first, which would cascade to the channel's items.
    pub async fn merge_channel(&mut self, channel: &Channel) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO channels (id, url, name, feed_url, autodownload)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                name = excluded.name,
                feed_url = excluded.feed_url,
                autodownload = excluded.autodownload
        "#,
        )
        .bind(&channel.id)
        .bind(&channel.url)
        .bind(&channel.name)
        .bind(&channel.feed_url)
        .bind(channel.autodownload)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Insert the item, or overwrite every field of the existing row.
    pub async fn merge_item(&mut self, item: &Item) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO items (id, url, title, published, channel_id, downloaded)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                published = excluded.published,
                channel_id = excluded.channel_id,
                downloaded = excluded.downloaded
        "#,
        )
        .bind(&item.id)
        .bind(&item.url)
        .bind(&item.title)
        .bind(item.published.timestamp())
        .bind(&item.channel_id)
        .bind(item.downloaded)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Remove the channel and all of its items. Returns the number of items removed.
    pub async fn delete_channel(&mut self, channel: &Channel) -> Result<u64, DatabaseError> {
        // The foreign key cascades too; deleting explicitly gives us the count.
        let items = sqlx::query("DELETE FROM items WHERE channel_id = ?")
            .bind(&channel.id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM channels WHERE id = ?")
            .bind(&channel.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(items)
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Persist every staged change as one atomic unit.
    pub async fn commit(self) -> Result<(), DatabaseError> {
        self.tx.commit().await.map_err(DatabaseError::from_sqlx)
    }

    /// Abandon every staged change.
    pub async fn discard(self) -> Result<(), DatabaseError> {
        self.tx.rollback().await.map_err(DatabaseError::from_sqlx)
    }

    /// Commit, or discard when `dry_run` is set.
    pub async fn finish(self, dry_run: bool) -> Result<SessionEnd, DatabaseError> {
        if dry_run {
            self.discard().await?;
            tracing::debug!("Dry run: staged changes discarded");
            Ok(SessionEnd::Discarded)
        } else {
            self.commit().await?;
            Ok(SessionEnd::Committed)
        }
    }
}
