mod market;
mod orderbook;

pub use market::{Market, Symbol};
pub use orderbook::{DepthSnapshotResponse, PriceLevel};
