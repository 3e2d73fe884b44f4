//! keyharvest-bluesky: Bluesky post search adapter
//!
//! Logs in with an app password, pages through `app.bsky.feed.searchPosts`
//! and hands each page to the batch runner as records keyed by post URI.

pub mod adapter;
pub mod api;
pub mod config;
pub mod http;

pub use adapter::{BlueskyAdapter, PLATFORM};
pub use api::DEDUP_FIELD;
pub use config::Config;
pub use http::{HttpError, HttpTransport, Transport};
