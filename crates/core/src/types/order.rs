//! Order-related identifiers and the collaborator-facing order request.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::price::Price;
use super::quantity::Quantity;

/// Venues the connectivity layer speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    /// Bitfinex spot, v1 wire protocol.
    Bitfinex,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::Bitfinex => write!(f, "Bitfinex"),
        }
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy / long.
    Buy,
    /// Sell / short.
    Sell,
}

impl Side {
    /// Direction implied by a signed quantity: negative means sell.
    #[inline]
    pub fn of(quantity: Quantity) -> Self {
        if quantity.is_negative() {
            Side::Sell
        } else {
            Side::Buy
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "Buy"),
            Side::Sell => write!(f, "Sell"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Limit order at a specified price.
    Limit,
    /// Market order at the best available price.
    Market,
    /// Stop order that becomes a market order at the stop price.
    StopMarket,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Limit => write!(f, "Limit"),
            OrderType::Market => write!(f, "Market"),
            OrderType::StopMarket => write!(f, "StopMarket"),
        }
    }
}

/// Locally assigned order identifier, owned by the strategy layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LOC-{}", self.0)
    }
}

/// Exchange-assigned order identifier. A single local order can accumulate
/// several of these across cancel-replace cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrokerOrderId(pub String);

impl BrokerOrderId {
    /// Construct from anything stringly.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for BrokerOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trading pair symbol (e.g., "BTCUSD").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    /// Create a new symbol, upper-cased to the venue convention.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    /// Base currency: the first three letters of the pair.
    pub fn base(&self) -> &str {
        &self.0[..self.0.len().min(3)]
    }

    /// Quote currency: everything after the base.
    pub fn quote(&self) -> &str {
        if self.0.len() > 3 {
            &self.0[3..]
        } else {
            ""
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An order as requested by the strategy layer.
///
/// Direction is carried by the sign of `quantity` (negative = sell). The
/// price that goes on the wire is the limit price for limit orders, the
/// stop price for stop orders, and zero for market orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Trading pair.
    pub symbol: Symbol,
    /// Signed quantity in exchange units; negative sells.
    pub quantity: Quantity,
    /// Order type.
    pub order_type: OrderType,
    /// Limit price, for [`OrderType::Limit`].
    pub limit_price: Option<Price>,
    /// Stop price, for [`OrderType::StopMarket`].
    pub stop_price: Option<Price>,
}

impl OrderRequest {
    /// Side inferred from the quantity's sign.
    #[inline]
    pub fn side(&self) -> Side {
        Side::of(self.quantity)
    }

    /// The price to submit: limit price, else stop price, else zero.
    pub fn wire_price(&self) -> Price {
        self.limit_price
            .or(self.stop_price)
            .unwrap_or_else(|| Price::zero(0))
    }
}
