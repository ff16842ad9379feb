use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The database is locked by another tubefeed process. Please wait for it to finish.")]
    Locked,

    /// Schema initialization failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_error(&err.to_string()) {
            return DatabaseError::Locked;
        }
        DatabaseError::Other(err)
    }
}

// SQLITE_BUSY (5) and SQLITE_LOCKED (6) surface only through their messages
pub(crate) fn is_lock_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed channel.
///
/// `id` is the channel's external identifier and the primary key. Items are
/// not loaded with the channel; query them through the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    /// Web page of the channel
    pub url: String,
    /// Display name
    pub name: String,
    /// Address of the channel's item feed
    pub feed_url: String,
    /// Download new items automatically during `update`
    pub autodownload: bool,
}

/// A single published item (a video) owned by a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Globally unique across all channels
    pub id: String,
    pub url: String,
    pub title: String,
    pub published: DateTime<Utc>,
    pub channel_id: String,
    /// The download operation ran for this item during a sync pass
    pub downloaded: bool,
}

/// Row type for channel queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ChannelRow {
    pub id: String,
    pub url: String,
    pub name: String,
    pub feed_url: String,
    pub autodownload: bool,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Channel {
            id: row.id,
            url: row.url,
            name: row.name,
            feed_url: row.feed_url,
            autodownload: row.autodownload,
        }
    }
}

/// Row type for item queries. `published` is stored as unix seconds.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub id: String,
    pub url: String,
    pub title: String,
    pub published: i64,
    pub channel_id: String,
    pub downloaded: bool,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        // Out-of-range timestamps can only come from a hand-edited database
        let published = Utc
            .timestamp_opt(row.published, 0)
            .single()
            .unwrap_or_default();
        Item {
            id: row.id,
            url: row.url,
            title: row.title,
            published,
            channel_id: row.channel_id,
            downloaded: row.downloaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_error_detection() {
        assert!(is_lock_error("error returned from database: database is locked"));
        assert!(is_lock_error("SQLITE_BUSY"));
        assert!(!is_lock_error("no such table: channels"));
    }

    #[test]
    fn test_item_row_conversion_keeps_timestamp() {
        let row = ItemRow {
            id: "v1".into(),
            url: "https://www.youtube.com/watch?v=v1".into(),
            title: "First".into(),
            published: 1_700_000_000,
            channel_id: "UC1".into(),
            downloaded: true,
        };
        let item = Item::from(row);
        assert_eq!(item.published.timestamp(), 1_700_000_000);
        assert!(item.downloaded);
    }
}
