//! On-demand view requests: validate the argument, fetch with fallback,
//! compile.

use tracing::{info, warn};

use crate::error::{BookError, Result};
use crate::rest::snapshot::SnapshotFetcher;
use crate::types::{Market, Symbol};
use crate::view::{compile_snapshot, DerivedView};

pub const USAGE_HINT: &str = "usage: view <SYMBOL>, e.g. view BTCUSDT";

/// Serve one view request.
///
/// # Errors
///
/// - [`BookError::MalformedInput`] when `symbol_arg` is missing or not a
///   symbol.
/// - [`BookError::Unavailable`] when neither market returns a usable book.
pub async fn request_view(
    fetcher: &SnapshotFetcher,
    symbol_arg: Option<&str>,
    preferred_market: Market,
) -> Result<DerivedView> {
    let Some(raw) = symbol_arg.filter(|s| !s.trim().is_empty()) else {
        warn!("view requested without a symbol");
        return Err(BookError::MalformedInput(USAGE_HINT.into()));
    };
    let symbol = Symbol::parse(raw).map_err(|_| {
        warn!(symbol = raw, "view requested with an invalid symbol");
        BookError::MalformedInput(format!("{USAGE_HINT} (got {raw:?})"))
    })?;

    let snapshot = fetcher.fetch_with_fallback(&symbol, preferred_market).await?;
    let view = compile_snapshot(&snapshot);
    info!(
        %symbol,
        market = %snapshot.market,
        current_price = %view.current_price,
        bids = view.bids.len(),
        asks = view.asks.len(),
        "view compiled"
    );
    Ok(view)
}
