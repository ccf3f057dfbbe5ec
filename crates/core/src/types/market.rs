//! Normalized market and account message types.
//!
//! These are the canonical internal shapes. The stream decoder converts
//! wire frames into them; the reconciler and strategy layer consume them
//! without ever seeing raw JSON.

use serde::{Deserialize, Serialize};

use super::order::{BrokerOrderId, Symbol, Venue};
use super::price::Price;
use super::quantity::Quantity;
use super::timestamp::Timestamp;

/// Normalized ticker snapshot for one symbol, already converted to
/// internal units.
///
/// Each new snapshot replaces the previous one for the same symbol in the
/// tick buffer; no per-symbol history is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    /// Source venue.
    pub venue: Venue,
    /// Trading pair.
    pub symbol: Symbol,
    /// Best bid.
    pub bid: Price,
    /// Best ask.
    pub ask: Price,
    /// Size at the best bid, in internal units.
    pub bid_size: Quantity,
    /// Size at the best ask, in internal units.
    pub ask_size: Quantity,
    /// Last traded price.
    pub last: Price,
    /// Daily volume, in internal units.
    pub volume: Quantity,
    /// Daily high.
    pub high: Price,
    /// Daily low.
    pub low: Price,
    /// When the snapshot was decoded.
    pub timestamp: Timestamp,
}

impl Tick {
    /// The snapshot's headline price: the scaled last-trade price.
    #[inline]
    pub fn price(&self) -> Price {
        self.last
    }

    /// Midpoint `(bid + ask) / 2`, truncating.
    pub fn mid_price(&self) -> Price {
        (self.bid + self.ask) / 2
    }

    /// Spread `ask - bid`.
    pub fn spread(&self) -> Price {
        self.ask - self.bid
    }
}

/// A trade execution/update report in raw exchange units.
///
/// Ephemeral: consumed by the fill reconciler immediately after decoding.
/// `amount_executed` keeps the exchange's sign convention (negative =
/// sell). Fields absent from the short legacy wire layout are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeExecution {
    /// Venue-assigned sequence tag.
    pub sequence: String,
    /// Trade identifier; absent in the legacy layout.
    pub trade_id: Option<i64>,
    /// Currency pair.
    pub pair: Symbol,
    /// Execution time.
    pub timestamp: Timestamp,
    /// Exchange order id this execution belongs to.
    pub broker_order_id: BrokerOrderId,
    /// Signed executed amount, exchange units (pre-scaling).
    pub amount_executed: Quantity,
    /// Execution price, exchange units (pre-scaling).
    pub price_executed: Price,
    /// Venue order-type string, passed through for diagnostics.
    pub order_kind: String,
    /// Original order price if reported.
    pub order_price: Option<Price>,
    /// Fee in `fee_currency` units; absent in the legacy layout.
    pub fee: Option<Price>,
    /// Currency the fee was charged in.
    pub fee_currency: Option<String>,
}

/// One wallet entry from a wallet snapshot message.
///
/// Wallet messages are full snapshots: every message replaces the whole
/// balance set, it is never a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    /// Wallet name as reported by the venue (e.g. "exchange", "trading").
    pub wallet: String,
    /// Currency code.
    pub currency: String,
    /// Balance in native currency units (unscaled).
    pub balance: Price,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tick() -> Tick {
        Tick {
            venue: Venue::Bitfinex,
            symbol: Symbol::new("BTCUSD"),
            bid: Price::new(43251, 4),  // 4.3251
            ask: Price::new(43274, 4),  // 4.3274
            bid_size: Quantity::new(580, 0),
            ask_size: Quantity::new(0, 0),
            last: Price::new(43272, 4), // 4.3272
            volume: Quantity::new(2006746, 0),
            high: Price::new(44279, 4),
            low: Price::new(42726, 4),
            timestamp: Timestamp::from_millis(1706000000000),
        }
    }

    #[test]
    fn test_price_is_scaled_last() {
        assert_eq!(sample_tick().price(), Price::new(43272, 4));
    }

    #[test]
    fn test_mid_price_and_spread() {
        let t = sample_tick();
        // (4.3251 + 4.3274) / 2 = 4.32625
        assert_eq!(t.mid_price(), Price::new(43262, 4)); // truncating division
        assert_eq!(t.spread(), Price::new(23, 4));
    }

    #[test]
    fn test_wallet_balance_fields() {
        let w = WalletBalance {
            wallet: "exchange".to_string(),
            currency: "USD".to_string(),
            balance: Price::new(1050075, 2),
        };
        assert_eq!(w.balance.to_string(), "10500.75");
    }
}
