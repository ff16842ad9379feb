use std::sync::Arc;
use thiserror::Error;

use crate::download::{DownloadError, Downloader};
use crate::feed::{
    extract_channel_identity, feed_items, fetch_items, FeedSource, FetchError, IdentityError,
};
use crate::storage::{Channel, Database, DatabaseError, Item, SessionEnd};
use crate::util::{strip_control_chars, validate_url, UrlValidationError};

use super::poller::spawn_poller;
use super::reconciler::{accept_back_catalog, Reconciler, SyncOptions, SyncReport};
use super::resolver::{resolve_channel, ResolveError};

const YOUTUBE_FEED_BASE: &str = "https://www.youtube.com/feeds/videos.xml?channel_id=";
const YOUTUBE_CHANNEL_BASE: &str = "https://www.youtube.com/channel/";

/// Errors that abort a single engine operation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Invalid channel URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error("Invalid channel id \"{0}\"")]
    InvalidChannelId(String),

    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("No item with id \"{0}\"")]
    ItemNotFound(String),

    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result of a subscribe operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub channel: Channel,
    /// Back-catalog items staged as already downloaded
    pub items: usize,
    pub end: SessionEnd,
}

/// Result of an unsubscribe operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscription {
    pub channel: Channel,
    pub items_removed: u64,
    pub end: SessionEnd,
}

/// A channel with the number of items stored for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    pub channel: Channel,
    pub items: i64,
}

/// Entry point for every channel and item operation.
///
/// Each mutating operation runs in its own session and ends with a single
/// commit, or a discard when `dry_run` is set. Any error before that point
/// drops the session, leaving the store untouched.
#[derive(Clone)]
pub struct SyncEngine {
    db: Database,
    source: Arc<dyn FeedSource>,
    downloader: Arc<dyn Downloader>,
    concurrency: usize,
}

impl SyncEngine {
    pub fn new(
        db: Database,
        source: Arc<dyn FeedSource>,
        downloader: Arc<dyn Downloader>,
        concurrency: usize,
    ) -> Self {
        Self {
            db,
            source,
            downloader,
            concurrency: concurrency.max(1),
        }
    }

    /// Synchronize every subscribed channel.
    ///
    /// Feeds are fetched on the bounded pool and reconciled as they complete.
    /// Fetch and download failures are reported in the returned report; only
    /// store failures abort the run, in which case nothing is written.
    pub async fn update(&self, options: SyncOptions) -> Result<SyncReport, SyncError> {
        let mut session = self.db.session().await?;
        let channels = session.all_channels().await?;
        tracing::info!(
            channels = channels.len(),
            dry_run = options.dry_run,
            download = options.download_enabled,
            "Starting synchronization"
        );

        let mut results = spawn_poller(Arc::clone(&self.source), channels, self.concurrency);
        let mut reconciler = Reconciler::new(self.downloader.as_ref(), options);
        while let Some(poll) = results.recv().await {
            reconciler.reconcile(&mut session, poll).await?;
        }

        let end = session.finish(options.dry_run).await?;
        let report = reconciler.finish(end);
        tracing::info!(
            new_items = report.new_items.len(),
            failures = report.failures.len(),
            committed = end.is_committed(),
            "Synchronization finished"
        );
        Ok(report)
    }

    /// Subscribe by scraping the channel's web page for its identity.
    ///
    /// The channel url is stored as typed, so the same text resolves it later.
    pub async fn subscribe_url(
        &self,
        page_url: &str,
        autodownload: bool,
        dry_run: bool,
    ) -> Result<Subscription, SyncError> {
        validate_url(page_url)?;
        let page_url = page_url.trim().to_string();

        let html = self
            .source
            .fetch_page(&page_url)
            .await
            .map_err(|source| SyncError::Fetch {
                url: page_url.clone(),
                source,
            })?;
        let identity = extract_channel_identity(&html, &page_url)?;

        let channel = Channel {
            id: identity.id,
            url: page_url,
            name: identity.name,
            feed_url: identity.feed_url,
            autodownload,
        };
        let items = fetch_items(self.source.as_ref(), &channel)
            .await
            .map_err(|source| SyncError::Fetch {
                url: channel.feed_url.clone(),
                source,
            })?;

        self.store_subscription(channel, items, dry_run).await
    }

    /// Subscribe by channel id, taking the display name from the feed title.
    pub async fn subscribe_id(
        &self,
        channel_id: &str,
        autodownload: bool,
        dry_run: bool,
    ) -> Result<Subscription, SyncError> {
        let channel_id = channel_id.trim();
        if !is_valid_channel_id(channel_id) {
            return Err(SyncError::InvalidChannelId(channel_id.to_string()));
        }

        let feed_url = format!("{YOUTUBE_FEED_BASE}{channel_id}");
        let feed = self
            .source
            .fetch_feed(&feed_url)
            .await
            .map_err(|source| SyncError::Fetch {
                url: feed_url.clone(),
                source,
            })?;

        let name = feed
            .title
            .as_deref()
            .map(|t| strip_control_chars(t).trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| channel_id.to_string());

        let channel = Channel {
            id: channel_id.to_string(),
            url: format!("{YOUTUBE_CHANNEL_BASE}{channel_id}"),
            name,
            feed_url,
            autodownload,
        };
        let items = feed_items(feed.entries, &channel.id);

        self.store_subscription(channel, items, dry_run).await
    }

    async fn store_subscription(
        &self,
        channel: Channel,
        items: Vec<Item>,
        dry_run: bool,
    ) -> Result<Subscription, SyncError> {
        let mut session = self.db.session().await?;
        session.merge_channel(&channel).await?;
        let items = accept_back_catalog(&mut session, items).await?;
        let end = session.finish(dry_run).await?;

        tracing::info!(channel = %channel.id, name = %channel.name, items, committed = end.is_committed(), "Subscribed");
        Ok(Subscription {
            channel,
            items,
            end,
        })
    }

    /// Remove a channel and all of its items.
    pub async fn unsubscribe(
        &self,
        reference: &str,
        dry_run: bool,
    ) -> Result<Unsubscription, SyncError> {
        let mut session = self.db.session().await?;
        let channel = resolve_channel(&mut session, reference).await?;
        let items_removed = session.delete_channel(&channel).await?;
        let end = session.finish(dry_run).await?;

        tracing::info!(channel = %channel.id, items_removed, committed = end.is_committed(), "Unsubscribed");
        Ok(Unsubscription {
            channel,
            items_removed,
            end,
        })
    }

    /// Turn a channel's autodownload policy on or off.
    pub async fn set_autodownload(
        &self,
        reference: &str,
        enabled: bool,
        dry_run: bool,
    ) -> Result<(Channel, SessionEnd), SyncError> {
        let mut session = self.db.session().await?;
        let mut channel = resolve_channel(&mut session, reference).await?;
        channel.autodownload = enabled;
        session.merge_channel(&channel).await?;
        let end = session.finish(dry_run).await?;
        Ok((channel, end))
    }

    /// Download one known item and mark it downloaded.
    ///
    /// Unlike a synchronization run, a download failure is returned as an
    /// error and the item is left unchanged.
    pub async fn download_item(
        &self,
        item_id: &str,
        dry_run: bool,
    ) -> Result<(Item, SessionEnd), SyncError> {
        let mut session = self.db.session().await?;
        let mut item = session
            .get_item(item_id)
            .await?
            .ok_or_else(|| SyncError::ItemNotFound(item_id.to_string()))?;

        self.downloader.download(&item.url, dry_run).await?;

        item.downloaded = true;
        session.merge_item(&item).await?;
        let end = session.finish(dry_run).await?;
        Ok((item, end))
    }

    /// Every channel with its stored item count, ordered by name.
    pub async fn list_channels(&self) -> Result<Vec<ChannelSummary>, SyncError> {
        let channels = self.db.list_channels().await?;
        let counts: std::collections::HashMap<String, i64> =
            self.db.item_counts().await?.into_iter().collect();

        Ok(channels
            .into_iter()
            .map(|channel| {
                let items = counts.get(&channel.id).copied().unwrap_or(0);
                ChannelSummary { channel, items }
            })
            .collect())
    }

    /// Items newest first, optionally limited to the channel `reference` resolves to.
    pub async fn list_items(
        &self,
        reference: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<Item>, SyncError> {
        let channel = match reference {
            Some(reference) => {
                let mut session = self.db.session().await?;
                let channel = resolve_channel(&mut session, reference).await?;
                session.discard().await?;
                Some(channel)
            }
            None => None,
        };

        Ok(self
            .db
            .list_items(channel.as_ref().map(|c| c.id.as_str()), limit)
            .await?)
    }
}

// Channel ids go straight into the feed URL's query string
fn is_valid_channel_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
