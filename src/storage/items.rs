use super::schema::Database;
use super::session::ITEM_COLUMNS;
use super::types::{DatabaseError, Item, ItemRow};

/// Maximum number of items returned from a single listing (OOM protection)
const MAX_ITEMS: i64 = 2000;

impl Database {
    // ========================================================================
    // Item Queries
    // ========================================================================

    /// Items newest first, optionally restricted to one channel.
    ///
    /// `limit` defaults to 50 and is capped at [`MAX_ITEMS`].
    pub async fn list_items(
        &self,
        channel_id: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<Item>, DatabaseError> {
        let limit = limit.unwrap_or(50).clamp(1, MAX_ITEMS);

        let rows = match channel_id {
            Some(channel_id) => {
                sqlx::query_as::<_, ItemRow>(&format!(
                    "SELECT {ITEM_COLUMNS} FROM items WHERE channel_id = ? \
                     ORDER BY published DESC, rowid DESC LIMIT ?"
                ))
                .bind(channel_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ItemRow>(&format!(
                    "SELECT {ITEM_COLUMNS} FROM items ORDER BY published DESC, rowid DESC LIMIT ?"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(Item::from).collect())
    }
}
