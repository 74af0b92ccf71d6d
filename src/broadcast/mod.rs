//! Real-time fan-out of activities to connected listeners.
//!
//! This module provides the live half of the feed:
//! - [`Broadcaster`]: registry of live sinks, publish and heartbeat
//! - [`CatchUp`]: replay of missed activities before registration
//! - [`Listener`]: the read half handed to a connection
//! - [`frame`]: text event stream framing and a client-side decoder
//!
//! Sinks are bounded channels written without waiting. A sink that is full
//! or closed when a frame is delivered is evicted on the spot; no frame is
//! ever retried. The listener reconnects with its last id and catch-up fills
//! the gap.
//!
//! # Example
//!
//! ```ignore
//! let broadcaster = Arc::new(Broadcaster::default());
//! let heartbeat = broadcaster.spawn_heartbeat(shutdown.clone());
//!
//! let catch_up = CatchUp::new(store.clone(), DEFAULT_CATCHUP_BATCH);
//! let mut listener = catch_up.connect(&broadcaster, Some(ActivityId(41))).await;
//!
//! while let Some(frame) = listener.recv().await {
//!     // ": connected", replayed data frames, then live frames
//! }
//! ```

mod broadcaster;
mod catchup;
pub mod frame;
mod listener;
mod sink;

pub use broadcaster::{
    BroadcastConfig, BroadcastStats, Broadcaster, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_SINK_BUFFER,
};
pub use catchup::{CatchUp, DEFAULT_CATCHUP_BATCH};
pub use frame::FrameDecoder;
pub use listener::Listener;
pub use sink::{channel, Sink, SinkError};
