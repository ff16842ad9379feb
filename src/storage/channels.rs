use super::schema::Database;
use super::session::CHANNEL_COLUMNS;
use super::types::{Channel, ChannelRow, DatabaseError};

impl Database {
    // ========================================================================
    // Channel Queries
    // ========================================================================

    /// All subscribed channels, ordered by display name
    pub async fn list_channels(&self) -> Result<Vec<Channel>, DatabaseError> {
        let rows = sqlx::query_as::<_, ChannelRow>(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY name, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Channel::from).collect())
    }

    /// Number of items stored per channel id
    pub async fn item_counts(&self) -> Result<Vec<(String, i64)>, DatabaseError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
                SELECT c.id, COUNT(i.id)
                FROM channels c
                LEFT JOIN items i ON i.channel_id = c.id
                GROUP BY c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
