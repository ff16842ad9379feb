use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::feed::{fetch_items, FeedSource, FetchError};
use crate::storage::{Channel, Item};

/// Outcome of fetching one channel's feed.
#[derive(Debug)]
pub struct PollResult {
    pub channel: Channel,
    /// Items in feed order, or the error that stopped this channel
    pub result: Result<Vec<Item>, FetchError>,
}

/// Fetches every channel's feed on a bounded pool of `concurrency` workers.
///
/// Results arrive on the returned receiver in completion order, not input
/// order, while later fetches are still running. A failing channel yields an
/// `Err` result for that channel only; its siblings are unaffected. The
/// receiver closes once every channel has reported.
pub fn spawn_poller(
    source: Arc<dyn FeedSource>,
    channels: Vec<Channel>,
    concurrency: usize,
) -> mpsc::Receiver<PollResult> {
    let concurrency = concurrency.max(1);
    let (tx, rx) = mpsc::channel(concurrency);
    let total = channels.len();

    tokio::spawn(async move {
        let mut results = stream::iter(channels)
            .map(|channel| {
                let source = Arc::clone(&source);
                async move {
                    let result = fetch_items(source.as_ref(), &channel).await;
                    if let Err(e) = &result {
                        tracing::warn!(channel = %channel.id, error = %e, "Feed fetch failed");
                    }
                    PollResult { channel, result }
                }
            })
            .buffer_unordered(concurrency);

        let mut done = 0usize;
        while let Some(result) = results.next().await {
            done += 1;
            tracing::debug!(channel = %result.channel.id, done, total, "Feed fetched");
            if tx.send(result).await.is_err() {
                tracing::debug!("Poll receiver dropped, stopping");
                break;
            }
        }
    });

    rx
}

/// Fetches every channel and collects all results in completion order.
pub async fn poll_all(
    source: Arc<dyn FeedSource>,
    channels: Vec<Channel>,
    concurrency: usize,
) -> Vec<PollResult> {
    let mut rx = spawn_poller(source, channels, concurrency);
    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    results
}
