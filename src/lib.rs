//! # Activity Feed
//!
//! An activity feed with a durable history and a live push stream.
//!
//! ## Core Concepts
//!
//! - **Activities**: immutable events keyed by a monotonically increasing id
//! - **Store**: append-only log with a descending range scan
//! - **Broadcaster**: fan-out of new activities to live listeners, with
//!   heartbeats and eviction of listeners that fall behind
//! - **Catch-up**: replay of what a reconnecting listener missed
//! - **Feed**: validation, append-then-publish, and history paging
//!
//! ## Example
//!
//! ```ignore
//! use activity_feed::{ActivityInput, ActivityKind, Broadcaster, Feed, FileStore, StoreConfig};
//!
//! let store = Arc::new(FileStore::open_or_create(StoreConfig {
//!     path: "./data".into(),
//!     ..Default::default()
//! })?);
//! let broadcaster = Arc::new(Broadcaster::default());
//! let feed = Feed::new(store, broadcaster.clone(), 50);
//!
//! // Listen, replaying everything after id 41
//! let mut listener = feed.connect(Some(ActivityId(41))).await;
//!
//! // Submit
//! feed.submit(ActivityInput::new(ActivityKind::TokenTransfer))?;
//!
//! // History
//! let page = feed.page(None, None, Some(20))?;
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod store;
pub mod types;

// Re-exports
pub use broadcast::{
    BroadcastConfig, BroadcastStats, Broadcaster, CatchUp, FrameDecoder, Listener, Sink,
};
pub use config::FeedConfig;
pub use error::{FeedError, Result};
pub use feed::{Feed, Page};
pub use store::{ActivityStore, FileStore, MemoryStore, ScanRange, StoreConfig};
pub use types::{Activity, ActivityId, ActivityInput, ActivityKind, CreateActivity};
