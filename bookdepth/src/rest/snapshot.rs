//! One-shot REST depth snapshots with spot/futures fallback.

use tracing::{debug, info, warn};

use crate::config::BookConfig;
use crate::error::{BookError, Result};
use crate::orderbook::OrderBookSnapshot;
use crate::rest::DepthHttpClient;
use crate::types::{DepthSnapshotResponse, Market, Symbol};

/// Fetches full order books from the spot and futures depth endpoints.
///
/// Request-scoped: no shared state, no retries beyond the single fallback to
/// the other market.
#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    http: DepthHttpClient,
    config: BookConfig,
}

impl SnapshotFetcher {
    pub fn new(config: BookConfig) -> Result<Self> {
        let http = DepthHttpClient::new(config.request_timeout)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &BookConfig {
        &self.config
    }

    /// `GET <depth endpoint>?symbol=<SYMBOL>&limit=<depth_limit>` on one market.
    pub async fn fetch_snapshot(
        &self,
        symbol: &Symbol,
        market: Market,
    ) -> Result<OrderBookSnapshot> {
        let url = self.config.rest_url(market);
        let limit = self.config.depth_limit.to_string();
        debug!(%symbol, %market, url, "fetching depth snapshot");

        let response: DepthSnapshotResponse = self
            .http
            .get(url, &[("symbol", symbol.as_str()), ("limit", &limit)])
            .await?;
        let snapshot = OrderBookSnapshot::from_response(symbol.clone(), market, response);

        info!(
            %symbol,
            %market,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            last_update_id = ?snapshot.last_update_id,
            "depth snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Try `preferred`, then the other market once.
    ///
    /// A market counts as failed on a non-success status, a transport error or
    /// timeout, an undecodable body, or a book with no levels at all.
    ///
    /// # Errors
    ///
    /// [`BookError::Unavailable`] when both markets fail.
    pub async fn fetch_with_fallback(
        &self,
        symbol: &Symbol,
        preferred: Market,
    ) -> Result<OrderBookSnapshot> {
        for market in preferred.fallback_order() {
            match self.fetch_snapshot(symbol, market).await {
                Ok(snapshot) if !snapshot.is_empty() => return Ok(snapshot),
                Ok(_) => warn!(%symbol, %market, "depth snapshot is empty"),
                Err(e) => warn!(%symbol, %market, error = %e, "depth snapshot failed"),
            }
        }
        Err(BookError::Unavailable(symbol.to_string()))
    }
}
