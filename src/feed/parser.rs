use chrono::{DateTime, Utc};
use feed_rs::parser;
use sha2::{Digest, Sha256};

use crate::util::strip_control_chars;

/// Entry ids in channel feeds carry this prefix before the video id
const VIDEO_ID_PREFIX: &str = "yt:video:";

/// One entry of a channel feed, before it is attached to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: String,
    pub url: String,
    pub title: String,
    pub published: DateTime<Utc>,
}

/// A parsed feed document.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    /// Feed title; for channel feeds this is the channel's display name
    pub title: Option<String>,
    /// Entries in document order
    pub entries: Vec<FeedEntry>,
    /// Entries dropped because they had no link or no timestamp
    pub skipped: usize,
}

/// Parses an RSS/Atom document into entries, keeping document order.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, feed_rs::parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let title = feed
        .title
        .map(|t| strip_control_chars(t.content.trim()).into_owned())
        .filter(|t| !t.is_empty());

    let mut skipped = 0;
    let mut entries = Vec::with_capacity(feed.entries.len());

    for entry in feed.entries {
        let Some(url) = entry.links.first().map(|l| l.href.clone()) else {
            skipped += 1;
            continue;
        };
        let Some(published) = entry.published.or(entry.updated) else {
            skipped += 1;
            continue;
        };
        let title = entry
            .title
            .map(|t| strip_control_chars(&t.content).into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        let id = entry_id(&entry.id, &url, &title, published);

        entries.push(FeedEntry {
            id,
            url,
            title,
            published,
        });
    }

    Ok(ParsedFeed {
        title,
        entries,
        skipped,
    })
}

/// Stable id for an entry: the video id when present, else a content hash.
fn entry_id(existing: &str, url: &str, title: &str, published: DateTime<Utc>) -> String {
    let trimmed = existing.trim();
    if !trimmed.is_empty() {
        return trimmed
            .strip_prefix(VIDEO_ID_PREFIX)
            .unwrap_or(trimmed)
            .to_string();
    }

    let input = format!("{}|{}|{}", url, title, published.timestamp());
    format!("{:x}", Sha256::digest(input.as_bytes()))
}
