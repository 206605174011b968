use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One price level: `volume` resting at `price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub volume: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, volume: Decimal) -> Self {
        Self { price, volume }
    }
}

impl From<(Decimal, Decimal)> for PriceLevel {
    fn from((price, volume): (Decimal, Decimal)) -> Self {
        Self { price, volume }
    }
}

/// REST depth response: `GET /api/v3/depth` (spot) or `GET /fapi/v1/depth`
/// (futures). Each level is `[priceString, quantityString]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSnapshotResponse {
    #[serde(default)]
    pub last_update_id: Option<u64>,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}
