//! The subscription synchronization engine.
//!
//! - [`resolver`] - turns a user-supplied id, url, or name into one channel
//! - [`poller`] - fetches all feeds on a bounded worker pool
//! - [`reconciler`] - detects new items and applies the autodownload policy
//! - [`engine`] - [`SyncEngine`], which runs each operation in one session

mod engine;
mod poller;
mod reconciler;
mod resolver;

pub use engine::{ChannelSummary, Subscription, SyncEngine, SyncError, Unsubscription};
pub use poller::{poll_all, spawn_poller, PollResult};
pub use reconciler::{
    accept_back_catalog, FetchFailure, NewItem, Reconciler, SyncOptions, SyncReport,
};
pub use resolver::{resolve_channel, ResolveError};
