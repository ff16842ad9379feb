//! Scripted in-process collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use tubefeed::download::{DownloadError, Downloader};
use tubefeed::feed::{FeedEntry, FeedSource, FetchError, ParsedFeed};
use tubefeed::storage::{Channel, Database};

pub const FEED_BASE: &str = "https://www.youtube.com/feeds/videos.xml?channel_id=";

pub async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

pub fn feed_url(channel_id: &str) -> String {
    format!("{FEED_BASE}{channel_id}")
}

pub fn video_url(item_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={item_id}")
}

pub fn channel(id: &str, name: &str, autodownload: bool) -> Channel {
    Channel {
        id: id.to_string(),
        url: format!("https://www.youtube.com/channel/{id}"),
        name: name.to_string(),
        feed_url: feed_url(id),
        autodownload,
    }
}

/// Entry `id` published `age` hours before a fixed reference time.
pub fn entry(id: &str, age: i64) -> FeedEntry {
    FeedEntry {
        id: id.to_string(),
        url: video_url(id),
        title: format!("Video {id}"),
        published: Utc.timestamp_opt(1_700_000_000 - age * 3600, 0).unwrap(),
    }
}

enum Script {
    Feed {
        title: Option<String>,
        entries: Vec<FeedEntry>,
    },
    Fail(u16),
}

/// Serves feeds and pages from a script that tests can change between runs.
#[derive(Default)]
pub struct ScriptedSource {
    feeds: Mutex<HashMap<String, Script>>,
    pages: Mutex<HashMap<String, String>>,
    feed_requests: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn set_feed(&self, feed_url: &str, title: Option<&str>, entries: Vec<FeedEntry>) {
        self.feeds.lock().unwrap().insert(
            feed_url.to_string(),
            Script::Feed {
                title: title.map(str::to_string),
                entries,
            },
        );
    }

    pub fn fail_feed(&self, feed_url: &str, status: u16) {
        self.feeds
            .lock()
            .unwrap()
            .insert(feed_url.to_string(), Script::Fail(status));
    }

    pub fn set_page(&self, url: &str, html: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), html.to_string());
    }

    pub fn feed_requests(&self) -> Vec<String> {
        self.feed_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn fetch_feed(&self, feed_url: &str) -> Result<ParsedFeed, FetchError> {
        self.feed_requests.lock().unwrap().push(feed_url.to_string());
        match self.feeds.lock().unwrap().get(feed_url) {
            Some(Script::Feed { title, entries }) => Ok(ParsedFeed {
                title: title.clone(),
                entries: entries.clone(),
                skipped: 0,
            }),
            Some(Script::Fail(status)) => Err(FetchError::HttpStatus(*status)),
            None => Err(FetchError::HttpStatus(404)),
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(FetchError::HttpStatus(404))
    }
}

/// Records every download call; URLs listed in `failing` fail.
#[derive(Default)]
pub struct RecordingDownloader {
    calls: Mutex<Vec<(String, bool)>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingDownloader {
    pub fn fail_on(&self, url: &str) {
        self.failing.lock().unwrap().push(url.to_string());
    }

    pub fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls().into_iter().map(|(url, _)| url).collect()
    }
}

#[async_trait]
impl Downloader for RecordingDownloader {
    async fn download(&self, url: &str, simulate: bool) -> Result<(), DownloadError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), simulate));
        if self.failing.lock().unwrap().iter().any(|u| u == url) {
            return Err(DownloadError::Spawn {
                program: "yt-dlp".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted failure"),
            });
        }
        Ok(())
    }
}
