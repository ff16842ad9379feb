use crate::download::Downloader;
use crate::storage::{Channel, DatabaseError, Item, Session, SessionEnd};

use super::poller::PollResult;

/// Switches that hold for a whole synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Stage everything, simulate downloads, then discard instead of commit
    pub dry_run: bool,
    /// Global download switch; when off no download runs for any channel
    pub download_enabled: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            download_enabled: true,
        }
    }
}

/// A previously unseen item found during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub channel_name: String,
    pub title: String,
    pub url: String,
    /// Value staged for the item's `downloaded` flag
    pub downloaded: bool,
    /// Set when the download operation ran and failed
    pub download_error: Option<String>,
}

/// A channel whose feed could not be fetched this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub channel_id: String,
    pub channel_name: String,
    pub error: String,
}

/// Everything a synchronization run found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// New items in the order they were reconciled
    pub new_items: Vec<NewItem>,
    pub failures: Vec<FetchFailure>,
    pub end: SessionEnd,
}

impl SyncReport {
    pub fn downloads(&self) -> usize {
        self.new_items
            .iter()
            .filter(|i| i.downloaded && i.download_error.is_none())
            .count()
    }

    pub fn download_failures(&self) -> impl Iterator<Item = &NewItem> {
        self.new_items.iter().filter(|i| i.download_error.is_some())
    }
}

/// Folds poll results into a session, one channel at a time.
///
/// Known item ids are skipped. New items are reported, downloaded when both
/// the run and the channel allow it, and staged on the session. Download
/// failures are recorded on the item's report entry and never abort the run.
pub struct Reconciler<'a> {
    downloader: &'a dyn Downloader,
    options: SyncOptions,
    new_items: Vec<NewItem>,
    failures: Vec<FetchFailure>,
}

impl<'a> Reconciler<'a> {
    pub fn new(downloader: &'a dyn Downloader, options: SyncOptions) -> Self {
        Self {
            downloader,
            options,
            new_items: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Reconcile one channel's fetch result. Only store errors propagate.
    pub async fn reconcile(
        &mut self,
        session: &mut Session,
        poll: PollResult,
    ) -> Result<(), DatabaseError> {
        let PollResult { channel, result } = poll;

        match result {
            Ok(items) => self.reconcile_items(session, &channel, items).await,
            Err(e) => {
                self.failures.push(FetchFailure {
                    channel_id: channel.id,
                    channel_name: channel.name,
                    error: e.to_string(),
                });
                Ok(())
            }
        }
    }

    async fn reconcile_items(
        &mut self,
        session: &mut Session,
        channel: &Channel,
        items: Vec<Item>,
    ) -> Result<(), DatabaseError> {
        let mut added = 0usize;

        for mut item in items {
            if session.get_item(&item.id).await?.is_some() {
                continue;
            }

            let mut download_error = None;
            item.downloaded = false;

            if self.options.download_enabled && channel.autodownload {
                // The flag records that the item was processed, even when simulated or failed
                item.downloaded = true;
                if let Err(e) = self.downloader.download(&item.url, self.options.dry_run).await {
                    tracing::warn!(item = %item.id, url = %item.url, error = %e, "Download failed");
                    download_error = Some(e.to_string());
                }
            }

            session.merge_item(&item).await?;
            added += 1;

            self.new_items.push(NewItem {
                channel_name: channel.name.clone(),
                title: item.title,
                url: item.url,
                downloaded: item.downloaded,
                download_error,
            });
        }

        if added > 0 {
            tracing::info!(channel = %channel.id, new_items = added, "Channel reconciled");
        }
        Ok(())
    }

    pub fn finish(self, end: SessionEnd) -> SyncReport {
        SyncReport {
            new_items: self.new_items,
            failures: self.failures,
            end,
        }
    }
}

/// Stage a freshly subscribed channel's back-catalog.
///
/// Every item is marked downloaded without running the download operation.
/// Returns the number of items staged.
pub async fn accept_back_catalog(
    session: &mut Session,
    items: Vec<Item>,
) -> Result<usize, DatabaseError> {
    let count = items.len();
    for mut item in items {
        item.downloaded = true;
        session.merge_item(&item).await?;
    }
    Ok(count)
}
