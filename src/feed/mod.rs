//! Feed retrieval and channel page scraping.
//!
//! - [`parser`] - turns an RSS/Atom document into ordered entries using `feed-rs`
//! - [`fetcher`] - the [`FeedSource`] seam, its HTTP implementation, and
//!   [`fetch_items`] which maps a channel's feed into items
//! - [`page`] - channel identity extraction from a channel's web page

mod fetcher;
mod page;
mod parser;

pub use fetcher::{feed_items, fetch_items, FeedSource, FetchError, HttpFeedSource};
pub use page::{extract_channel_identity, ChannelIdentity, IdentityError};
pub use parser::{parse_feed, FeedEntry, ParsedFeed};
