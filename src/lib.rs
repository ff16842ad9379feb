//! Channel subscription tracking: poll channel feeds, detect new items, and
//! download them according to each channel's autodownload policy.

pub mod config;
pub mod download;
pub mod feed;
pub mod storage;
pub mod sync;
pub mod util;
