//! Integration tests for the channel lifecycle: subscribe, toggle,
//! download, list, unsubscribe.

mod common;

use common::{entry, feed_url, test_db, video_url, RecordingDownloader, ScriptedSource};
use pretty_assertions::assert_eq;
use std::sync::Arc;

use tubefeed::feed::IdentityError;
use tubefeed::storage::SessionEnd;
use tubefeed::sync::{SyncEngine, SyncError};

const PAGE_URL: &str = "https://www.youtube.com/@example";

const CHANNEL_PAGE: &str = r#"<!DOCTYPE html><html><head>
<link rel="alternate" type="application/rss+xml" title="RSS" href="https://www.youtube.com/feeds/videos.xml?channel_id=UCexample">
</head><body>
<meta itemprop="name" content="Example Channel">
<meta itemprop="channelId" content="UCexample">
</body></html>"#;

struct Harness {
    engine: SyncEngine,
    source: Arc<ScriptedSource>,
    downloader: Arc<RecordingDownloader>,
}

async fn harness() -> Harness {
    let source = Arc::new(ScriptedSource::default());
    let downloader = Arc::new(RecordingDownloader::default());
    let engine = SyncEngine::new(
        test_db().await,
        source.clone(),
        downloader.clone(),
        2,
    );
    Harness {
        engine,
        source,
        downloader,
    }
}

fn five_entries() -> Vec<tubefeed::feed::FeedEntry> {
    (1..=5).map(|n| entry(&format!("v{n}"), n)).collect()
}

// ============================================================================
// Subscribe by page
// ============================================================================

#[tokio::test]
async fn test_subscribe_by_page_marks_back_catalog_downloaded() {
    let h = harness().await;
    h.source.set_page(PAGE_URL, CHANNEL_PAGE);
    h.source
        .set_feed(&feed_url("UCexample"), Some("Example Channel"), five_entries());

    let sub = h.engine.subscribe_url(PAGE_URL, true, false).await.unwrap();

    assert_eq!(sub.end, SessionEnd::Committed);
    assert_eq!(sub.items, 5);
    assert_eq!(sub.channel.id, "UCexample");
    assert_eq!(sub.channel.name, "Example Channel");
    assert_eq!(sub.channel.url, PAGE_URL);
    assert_eq!(sub.channel.feed_url, feed_url("UCexample"));
    assert!(sub.channel.autodownload);

    let items = h.engine.list_items(Some("UCexample"), None).await.unwrap();
    assert_eq!(items.len(), 5);
    assert!(items.iter().all(|i| i.downloaded));
    assert!(h.downloader.calls().is_empty());
}

#[tokio::test]
async fn test_back_catalog_is_not_new_on_next_update() {
    let h = harness().await;
    h.source.set_page(PAGE_URL, CHANNEL_PAGE);
    h.source
        .set_feed(&feed_url("UCexample"), Some("Example Channel"), five_entries());
    h.engine.subscribe_url(PAGE_URL, true, false).await.unwrap();

    let report = h.engine.update(Default::default()).await.unwrap();

    assert!(report.new_items.is_empty());
    assert!(h.downloader.calls().is_empty());
}

#[tokio::test]
async fn test_subscribed_url_resolves_as_typed() {
    let h = harness().await;
    h.source.set_page("https://example.com", CHANNEL_PAGE);
    h.source
        .set_feed(&feed_url("UCexample"), Some("Example Channel"), five_entries());

    let sub = h
        .engine
        .subscribe_url(" https://example.com ", true, false)
        .await
        .unwrap();
    assert_eq!(sub.channel.url, "https://example.com");

    let removed = h
        .engine
        .unsubscribe("https://example.com", false)
        .await
        .unwrap();
    assert_eq!(removed.channel.id, "UCexample");
    assert_eq!(removed.items_removed, 5);
}

#[tokio::test]
async fn test_subscribe_page_without_markers_suggests_id() {
    let h = harness().await;
    h.source.set_page(PAGE_URL, "<html><head></head><body></body></html>");

    let err = h.engine.subscribe_url(PAGE_URL, true, false).await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::Identity(IdentityError::MissingMarker(_))
    ));
    assert!(err.to_string().contains("channel id"));
    assert!(h.engine.list_channels().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_subscribe_rejects_invalid_url() {
    let h = harness().await;
    assert!(matches!(
        h.engine.subscribe_url("ftp://example.com/c", true, false).await,
        Err(SyncError::InvalidUrl(_))
    ));
}

#[tokio::test]
async fn test_subscribe_unreachable_page_fails() {
    let h = harness().await;
    assert!(matches!(
        h.engine.subscribe_url(PAGE_URL, true, false).await,
        Err(SyncError::Fetch { .. })
    ));
}

#[tokio::test]
async fn test_subscribe_dry_run_stores_nothing() {
    let h = harness().await;
    h.source.set_page(PAGE_URL, CHANNEL_PAGE);
    h.source
        .set_feed(&feed_url("UCexample"), Some("Example Channel"), five_entries());

    let sub = h.engine.subscribe_url(PAGE_URL, true, true).await.unwrap();

    assert_eq!(sub.end, SessionEnd::Discarded);
    assert_eq!(sub.items, 5);
    assert!(h.engine.list_channels().await.unwrap().is_empty());
    assert!(h.engine.list_items(None, None).await.unwrap().is_empty());
}

// ============================================================================
// Subscribe by id
// ============================================================================

#[tokio::test]
async fn test_subscribe_by_id_derives_addresses_and_name() {
    let h = harness().await;
    h.source
        .set_feed(&feed_url("UC42"), Some("  Answer Channel "), five_entries());

    let sub = h.engine.subscribe_id("UC42", false, false).await.unwrap();

    assert_eq!(sub.channel.name, "Answer Channel");
    assert_eq!(sub.channel.url, "https://www.youtube.com/channel/UC42");
    assert_eq!(sub.channel.feed_url, feed_url("UC42"));
    assert!(!sub.channel.autodownload);
    assert_eq!(sub.items, 5);
    assert_eq!(h.source.feed_requests(), vec![feed_url("UC42")]);
    assert!(h.downloader.calls().is_empty());
}

#[tokio::test]
async fn test_subscribe_by_id_without_feed_title_uses_id() {
    let h = harness().await;
    h.source.set_feed(&feed_url("UC42"), None, Vec::new());

    let sub = h.engine.subscribe_id("UC42", true, false).await.unwrap();

    assert_eq!(sub.channel.name, "UC42");
}

#[tokio::test]
async fn test_subscribe_by_id_rejects_malformed_id() {
    let h = harness().await;
    assert!(matches!(
        h.engine.subscribe_id("UC1&evil=1", true, false).await,
        Err(SyncError::InvalidChannelId(_))
    ));
    assert!(h.source.feed_requests().is_empty());
}

#[tokio::test]
async fn test_resubscribe_updates_channel_and_keeps_items() {
    let h = harness().await;
    h.source.set_feed(&feed_url("UC1"), Some("Old Name"), vec![entry("v1", 1)]);
    h.engine.subscribe_id("UC1", true, false).await.unwrap();

    h.source.set_feed(&feed_url("UC1"), Some("New Name"), vec![entry("v2", 1)]);
    h.engine.subscribe_id("UC1", false, false).await.unwrap();

    let channels = h.engine.list_channels().await.unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].channel.name, "New Name");
    assert!(!channels[0].channel.autodownload);
    assert_eq!(channels[0].items, 2);
}

// ============================================================================
// Autodownload toggle
// ============================================================================

#[tokio::test]
async fn test_toggle_autodownload() {
    let h = harness().await;
    h.source.set_feed(&feed_url("UC1"), Some("One"), Vec::new());
    h.engine.subscribe_id("UC1", true, false).await.unwrap();

    let (channel, end) = h.engine.set_autodownload("One", false, false).await.unwrap();
    assert_eq!(end, SessionEnd::Committed);
    assert!(!channel.autodownload);
    assert!(!h.engine.list_channels().await.unwrap()[0].channel.autodownload);

    let (_, end) = h.engine.set_autodownload("One", true, true).await.unwrap();
    assert_eq!(end, SessionEnd::Discarded);
    assert!(!h.engine.list_channels().await.unwrap()[0].channel.autodownload);
}

// ============================================================================
// Single-item download
// ============================================================================

#[tokio::test]
async fn test_download_item_marks_downloaded() {
    let h = harness().await;
    h.source.set_feed(&feed_url("UC1"), Some("One"), Vec::new());
    h.engine.subscribe_id("UC1", false, false).await.unwrap();
    h.source.set_feed(&feed_url("UC1"), Some("One"), vec![entry("v1", 1)]);
    h.engine.update(Default::default()).await.unwrap();

    let (item, end) = h.engine.download_item("v1", false).await.unwrap();

    assert_eq!(end, SessionEnd::Committed);
    assert!(item.downloaded);
    assert_eq!(h.downloader.calls(), vec![(video_url("v1"), false)]);
    assert!(h.engine.list_items(None, None).await.unwrap()[0].downloaded);
}

#[tokio::test]
async fn test_download_item_dry_run_simulates_and_keeps_flag() {
    let h = harness().await;
    h.source.set_feed(&feed_url("UC1"), Some("One"), Vec::new());
    h.engine.subscribe_id("UC1", false, false).await.unwrap();
    h.source.set_feed(&feed_url("UC1"), Some("One"), vec![entry("v1", 1)]);
    h.engine.update(Default::default()).await.unwrap();

    let (_, end) = h.engine.download_item("v1", true).await.unwrap();

    assert_eq!(end, SessionEnd::Discarded);
    assert_eq!(h.downloader.calls(), vec![(video_url("v1"), true)]);
    assert!(!h.engine.list_items(None, None).await.unwrap()[0].downloaded);
}

#[tokio::test]
async fn test_download_item_failure_propagates() {
    let h = harness().await;
    h.source.set_feed(&feed_url("UC1"), Some("One"), Vec::new());
    h.engine.subscribe_id("UC1", false, false).await.unwrap();
    h.source.set_feed(&feed_url("UC1"), Some("One"), vec![entry("v1", 1)]);
    h.engine.update(Default::default()).await.unwrap();
    h.downloader.fail_on(&video_url("v1"));

    assert!(matches!(
        h.engine.download_item("v1", false).await,
        Err(SyncError::Download(_))
    ));
    assert!(!h.engine.list_items(None, None).await.unwrap()[0].downloaded);
}

#[tokio::test]
async fn test_download_unknown_item() {
    let h = harness().await;
    assert!(matches!(
        h.engine.download_item("nope", false).await,
        Err(SyncError::ItemNotFound(id)) if id == "nope"
    ));
}

// ============================================================================
// Listing and unsubscribe
// ============================================================================

#[tokio::test]
async fn test_list_items_by_channel_newest_first_with_limit() {
    let h = harness().await;
    h.source.set_feed(
        &feed_url("UC1"),
        Some("One"),
        vec![entry("old", 10), entry("new", 1), entry("mid", 5)],
    );
    h.source.set_feed(&feed_url("UC2"), Some("Two"), vec![entry("x", 0)]);
    h.engine.subscribe_id("UC1", true, false).await.unwrap();
    h.engine.subscribe_id("UC2", true, false).await.unwrap();

    let items = h.engine.list_items(Some("One"), None).await.unwrap();
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["new", "mid", "old"]);

    let limited = h.engine.list_items(None, Some(2)).await.unwrap();
    let ids: Vec<&str> = limited.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["x", "new"]);
}

#[tokio::test]
async fn test_unsubscribe_removes_channel_and_items() {
    let h = harness().await;
    h.source.set_feed(&feed_url("UC1"), Some("One"), five_entries());
    h.source.set_feed(&feed_url("UC2"), Some("Two"), vec![entry("keep", 1)]);
    h.engine.subscribe_id("UC1", true, false).await.unwrap();
    h.engine.subscribe_id("UC2", true, false).await.unwrap();

    let removed = h
        .engine
        .unsubscribe("https://www.youtube.com/channel/UC1", false)
        .await
        .unwrap();

    assert_eq!(removed.end, SessionEnd::Committed);
    assert_eq!(removed.channel.id, "UC1");
    assert_eq!(removed.items_removed, 5);

    let channels = h.engine.list_channels().await.unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].channel.id, "UC2");
    let items = h.engine.list_items(None, None).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "keep");
}

#[tokio::test]
async fn test_unsubscribe_dry_run_keeps_everything() {
    let h = harness().await;
    h.source.set_feed(&feed_url("UC1"), Some("One"), five_entries());
    h.engine.subscribe_id("UC1", true, false).await.unwrap();

    let removed = h.engine.unsubscribe("UC1", true).await.unwrap();

    assert_eq!(removed.end, SessionEnd::Discarded);
    assert_eq!(removed.items_removed, 5);
    assert_eq!(h.engine.list_channels().await.unwrap().len(), 1);
    assert_eq!(h.engine.list_items(None, None).await.unwrap().len(), 5);
}
