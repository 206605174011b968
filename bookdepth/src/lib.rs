pub mod backoff;
pub mod config;
pub mod error;
pub mod handoff;
pub mod orderbook;
pub mod request;
pub mod rest;
pub mod types;
pub mod view;
pub mod ws;

// ---- Top-level re-exports ----

pub use backoff::{Backoff, BackoffKind, ReconnectPolicy};
pub use config::{BookConfig, StreamConfig};
pub use error::{BookError, Result};

// Snapshots + request surface
pub use request::{request_view, USAGE_HINT};
pub use rest::snapshot::SnapshotFetcher;

// Store
pub use orderbook::{
    ApplyOutcome, BookReader, BookState, OrderBookSide, OrderBookSnapshot, OrderBookStore,
};

// Views
pub use view::{compile_snapshot, compile_state, DerivedView, PriceFormat, PriceWindow};

// Streaming
pub use ws::events::{parse_depth_update, DepthUpdateEvent};
pub use ws::{DepthStream, SessionStatus, StreamCounters};

pub use types::{Market, PriceLevel, Symbol};
