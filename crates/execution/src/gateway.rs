//! Order gateway: the REST path for placement, cancellation,
//! cancel-replace, and account queries.
//!
//! [`BitfinexGateway`] composes the signed REST client with the shared
//! order tracker and event queue. Placements and cancels mutate the same
//! tracker the fill reconciler reads, which is what keeps REST-reported
//! and push-reported views of an order consistent however the two
//! interleave.

use std::sync::Arc;

use async_trait::async_trait;

use coral_core::scaling::{parse_price, parse_quantity, ScaleCodec};
use coral_core::types::{
    BrokerOrderId, OrderId, OrderRequest, OrderType, Price, Quantity, Side, Symbol, Venue,
};
use coral_oms::{OrderEvent, OrderEventQueue, OrderStatus, OrderTracker, TrackedOrder};

use crate::rest::{BitfinexRestClient, OrderResponse, PositionResponse, RestError};

/// Venue-agnostic order operations exposed to the strategy layer.
///
/// `Ok(false)` means the venue processed the call but the operation
/// failed (rejected placement, partial cancel); `Err` means the call
/// itself failed. Events describing each outcome go to the shared queue
/// either way.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit a new order under a caller-assigned local id.
    async fn place_order(&self, local_id: OrderId, request: &OrderRequest)
        -> Result<bool, RestError>;

    /// Cancel an order, addressing every broker id it has accumulated.
    async fn cancel_order(&self, local_id: OrderId) -> Result<bool, RestError>;

    /// Cancel-replace an order with new price/quantity, collecting the
    /// fresh broker ids.
    async fn replace_order(
        &self,
        local_id: OrderId,
        request: &OrderRequest,
    ) -> Result<bool, RestError>;
}

/// An open order as confirmed by the venue, in internal units.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    /// Broker-assigned id.
    pub broker_id: BrokerOrderId,
    /// Pair.
    pub symbol: Symbol,
    /// Side.
    pub side: Side,
    /// Order price, scaled.
    pub price: Price,
    /// Requested quantity, internal units, signed.
    pub original: Quantity,
    /// Executed so far, internal units, absolute.
    pub executed: Quantity,
    /// Still open, internal units, absolute.
    pub remaining: Quantity,
    /// Derived status.
    pub status: OrderStatus,
}

/// A margin position, in internal units.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    /// Pair.
    pub symbol: Symbol,
    /// Signed position size, internal units.
    pub quantity: Quantity,
    /// Average entry price, scaled.
    pub average_price: Price,
    /// Unrealized profit/loss, scaled.
    pub unrealized_pl: Price,
}

/// One account balance with its conversion rate into the base currency.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalance {
    /// Wallet name.
    pub wallet: String,
    /// Currency code, upper case.
    pub currency: String,
    /// Amount in native currency units.
    pub amount: Price,
    /// Units of base currency per unit of this currency (1 for the base
    /// currency itself; 0 when no conversion rate could be derived).
    pub rate_to_base: Price,
}

/// REST order gateway for Bitfinex.
pub struct BitfinexGateway {
    rest: BitfinexRestClient,
    tracker: Arc<OrderTracker>,
    events: Arc<OrderEventQueue>,
    codec: ScaleCodec,
    base_currency: String,
}

impl BitfinexGateway {
    /// Create a gateway over the shared tracker and event queue.
    pub fn new(
        rest: BitfinexRestClient,
        tracker: Arc<OrderTracker>,
        events: Arc<OrderEventQueue>,
        codec: ScaleCodec,
        base_currency: impl Into<String>,
    ) -> Self {
        Self {
            rest,
            tracker,
            events,
            codec,
            base_currency: base_currency.into(),
        }
    }

    /// Open orders as confirmed by the venue. Tracked orders that the
    /// venue reports differently are overwritten with the confirmed
    /// price, quantities, and (non-terminal) status.
    pub async fn open_orders(&self) -> Result<Vec<OpenOrder>, RestError> {
        let responses = self.rest.active_orders().await?;
        let mut orders = Vec::with_capacity(responses.len());

        for resp in &responses {
            let Some(open) = map_open_order(resp, &self.codec) else {
                tracing::warn!(id = resp.broker_id(), "skipping unmappable open order");
                continue;
            };

            if let Some(local_id) = self.tracker.local_id_of(&open.broker_id) {
                let confirmed = open.clone();
                self.tracker.with_order(local_id, |order| {
                    order.request.limit_price = Some(confirmed.price);
                    order.request.quantity = confirmed.original;
                    order.filled = confirmed.executed;
                    if !confirmed.status.is_terminal() {
                        order.status = confirmed.status;
                    }
                });
            }
            orders.push(open);
        }

        Ok(orders)
    }

    /// Open margin positions.
    pub async fn holdings(&self) -> Result<Vec<Holding>, RestError> {
        let positions = self.rest.active_positions().await?;
        Ok(positions
            .iter()
            .filter_map(|p| map_holding(p, &self.codec))
            .collect())
    }

    /// Account balances with conversion rates into the base currency.
    ///
    /// Rates come from the public ticker midpoint; a currency with no
    /// derivable rate is reported with rate zero rather than failing the
    /// whole query.
    pub async fn balances(&self) -> Result<Vec<AccountBalance>, RestError> {
        let responses = self.rest.balances().await?;
        let mut balances = Vec::with_capacity(responses.len());

        for resp in responses {
            let Ok(amount) = parse_price(&resp.amount) else {
                tracing::warn!(currency = %resp.currency, "skipping balance with unparseable amount");
                continue;
            };
            let currency = resp.currency.to_uppercase();

            let rate_to_base = if currency.eq_ignore_ascii_case(&self.base_currency) {
                Price::new(1, 0)
            } else {
                let pair = format!("{}{}", currency, self.base_currency.to_uppercase());
                match self.rest.ticker(&pair).await {
                    Ok(ticker) => parse_price(&ticker.mid).unwrap_or_else(|_| Price::zero(0)),
                    Err(e) => {
                        tracing::warn!(pair = %pair, error = %e, "no conversion rate");
                        Price::zero(0)
                    }
                }
            };

            balances.push(AccountBalance {
                wallet: resp.wallet,
                currency,
                amount,
                rate_to_base,
            });
        }

        Ok(balances)
    }

    fn emit(&self, local_id: OrderId, symbol: &Symbol, status: OrderStatus, message: &str) {
        self.events.push(OrderEvent::transition(
            local_id,
            Venue::Bitfinex,
            symbol.clone(),
            status,
            message,
        ));
    }
}

#[async_trait]
impl OrderGateway for BitfinexGateway {
    async fn place_order(
        &self,
        local_id: OrderId,
        request: &OrderRequest,
    ) -> Result<bool, RestError> {
        let amount = request.quantity.abs().to_string();
        let price = request.wire_price().to_string();

        let resp = match self
            .rest
            .new_order(
                &request.symbol.0,
                &amount,
                &price,
                side_str(request.side()),
                venue_order_type(request.order_type),
            )
            .await
        {
            Ok(resp) => resp,
            Err(RestError::Request { status, body, .. }) => {
                tracing::warn!(status, body = %body, "placement rejected");
                self.emit(local_id, &request.symbol, OrderStatus::Invalid, "placement rejected");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let broker_id = resp.broker_id();
        if broker_id <= 0 {
            self.emit(
                local_id,
                &request.symbol,
                OrderStatus::Invalid,
                "venue assigned no order id",
            );
            return Ok(false);
        }

        let broker_id = BrokerOrderId::new(broker_id.to_string());
        if self.tracker.get(local_id).is_some() {
            // A prior placement under this local id (e.g. via replace)
            // already tracks it; just attach the new broker id.
            let _ = self.tracker.add_broker_id(local_id, broker_id);
        } else if let Err(e) = self.tracker.add(TrackedOrder::new(
            local_id,
            request.clone(),
            broker_id,
        )) {
            tracing::error!(order_id = %local_id, error = %e, "failed to track placement");
        }
        self.emit(local_id, &request.symbol, OrderStatus::Submitted, "order accepted");

        // A market order can come back already fully executed; nothing
        // further will arrive for it on the stream.
        if request.order_type == OrderType::Market && resp.is_fully_executed() {
            let executed = parse_quantity(&resp.executed_amount)
                .map(|q| self.codec.scale_quantity(q).abs())
                .unwrap_or_else(|_| Quantity::zero(0));
            let signed = match request.side() {
                Side::Sell => -executed,
                Side::Buy => executed,
            };
            let fill_price = parse_price(&resp.avg_execution_price)
                .or_else(|_| parse_price(&resp.price))
                .map(|p| self.codec.scale_price(p))
                .unwrap_or_else(|_| Price::zero(0));

            self.tracker.remove(local_id);
            self.events.push(OrderEvent {
                timestamp: coral_core::types::Timestamp::now(),
                local_id,
                venue: Venue::Bitfinex,
                symbol: request.symbol.clone(),
                status: OrderStatus::Filled,
                fill_quantity: signed,
                fill_price,
                fee: Price::zero(0),
                message: "market order executed on placement".to_string(),
            });
        }

        Ok(true)
    }

    async fn cancel_order(&self, local_id: OrderId) -> Result<bool, RestError> {
        let Some(order) = self.tracker.get(local_id) else {
            tracing::warn!(order_id = %local_id, "cancel for untracked order");
            return Ok(false);
        };

        // A cancel-replace may have left several live broker ids; the
        // cancel succeeds only if every one of them cancels.
        let mut all_ok = !order.broker_ids.is_empty();
        for broker_id in &order.broker_ids {
            let Ok(id) = broker_id.0.parse::<i64>() else {
                all_ok = false;
                continue;
            };
            if id <= 0 {
                all_ok = false;
                continue;
            }

            match self.rest.cancel_order(id).await {
                Ok(resp) if resp.broker_id() != 0 => {
                    self.emit(local_id, &order.request.symbol, OrderStatus::Canceled, "canceled");
                }
                Ok(_) => all_ok = false,
                Err(RestError::Request { status, body, .. }) => {
                    tracing::warn!(status, body = %body, broker_id = %broker_id, "cancel rejected");
                    all_ok = false;
                }
                Err(e) => return Err(e),
            }
        }

        if all_ok {
            self.tracker.remove(local_id);
        }
        Ok(all_ok)
    }

    async fn replace_order(
        &self,
        local_id: OrderId,
        request: &OrderRequest,
    ) -> Result<bool, RestError> {
        let Some(order) = self.tracker.get(local_id) else {
            tracing::warn!(order_id = %local_id, "replace for untracked order");
            return Ok(false);
        };

        let amount = request.quantity.abs().to_string();
        let price = request.wire_price().to_string();

        let mut all_ok = !order.broker_ids.is_empty();
        for broker_id in &order.broker_ids {
            let Ok(id) = broker_id.0.parse::<i64>() else {
                all_ok = false;
                continue;
            };

            let resp = match self
                .rest
                .cancel_replace(
                    id,
                    &request.symbol.0,
                    &amount,
                    &price,
                    side_str(request.side()),
                    venue_order_type(request.order_type),
                )
                .await
            {
                Ok(resp) => resp,
                Err(RestError::Request { status, body, .. }) => {
                    tracing::warn!(status, body = %body, broker_id = %broker_id, "replace rejected");
                    all_ok = false;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let new_id = resp.broker_id();
            if new_id <= 0 {
                all_ok = false;
                continue;
            }
            let _ = self
                .tracker
                .add_broker_id(local_id, BrokerOrderId::new(new_id.to_string()));
        }

        Ok(all_ok)
    }
}

/// Venue order-type string for an [`OrderType`].
fn venue_order_type(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Limit => "exchange limit",
        OrderType::Market => "exchange market",
        OrderType::StopMarket => "exchange stop",
    }
}

/// Venue side string.
fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

/// Map a venue order-status response into internal units.
fn map_open_order(resp: &OrderResponse, codec: &ScaleCodec) -> Option<OpenOrder> {
    let broker_id = resp.broker_id();
    if broker_id <= 0 {
        return None;
    }

    let price = codec.scale_price(parse_price(&resp.price).ok()?);
    let original = codec.scale_quantity(parse_quantity(&resp.original_amount).ok()?);
    let executed = codec
        .scale_quantity(parse_quantity(&resp.executed_amount).unwrap_or_else(|_| Quantity::zero(0)))
        .abs();
    let remaining = codec
        .scale_quantity(parse_quantity(&resp.remaining_amount).unwrap_or_else(|_| Quantity::zero(0)))
        .abs();

    let side = if resp.side.eq_ignore_ascii_case("sell") {
        Side::Sell
    } else {
        Side::Buy
    };
    let original = if side == Side::Sell { -original.abs() } else { original.abs() };

    let status = if resp.is_cancelled {
        OrderStatus::Canceled
    } else if !executed.is_zero() && !remaining.is_zero() {
        OrderStatus::PartiallyFilled
    } else if !executed.is_zero() {
        OrderStatus::Filled
    } else {
        OrderStatus::Submitted
    };

    Some(OpenOrder {
        broker_id: BrokerOrderId::new(broker_id.to_string()),
        symbol: Symbol::new(&resp.symbol),
        side,
        price,
        original,
        executed,
        remaining,
        status,
    })
}

/// Map a position response into internal units.
fn map_holding(resp: &PositionResponse, codec: &ScaleCodec) -> Option<Holding> {
    Some(Holding {
        symbol: Symbol::new(&resp.symbol),
        quantity: codec.scale_quantity(parse_quantity(&resp.amount).ok()?),
        average_price: codec.scale_price(parse_price(&resp.base).ok()?),
        unrealized_pl: parse_price(&resp.pl)
            .map(|p| codec.scale_price(p))
            .unwrap_or_else(|_| Price::zero(0)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> ScaleCodec {
        ScaleCodec::new(100).unwrap()
    }

    fn status_response(json: &str) -> OrderResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_venue_order_type_mapping() {
        assert_eq!(venue_order_type(OrderType::Limit), "exchange limit");
        assert_eq!(venue_order_type(OrderType::Market), "exchange market");
        assert_eq!(venue_order_type(OrderType::StopMarket), "exchange stop");
    }

    #[test]
    fn test_side_str() {
        assert_eq!(side_str(Side::Buy), "buy");
        assert_eq!(side_str(Side::Sell), "sell");
    }

    #[test]
    fn test_map_open_order_scales_price() {
        // Exchange-confirmed price 456 scales to 4.56 internally.
        let resp = status_response(
            r#"{"id":1,"symbol":"btcusd","price":"456","side":"buy","is_live":true,
                "original_amount":"1","remaining_amount":"1","executed_amount":"0"}"#,
        );
        let open = map_open_order(&resp, &codec()).unwrap();
        assert_eq!(open.price, Price::new(456, 2));
        assert_eq!(open.symbol, Symbol::new("BTCUSD"));
        assert_eq!(open.original, Quantity::new(100, 0));
        assert_eq!(open.status, OrderStatus::Submitted);
    }

    #[test]
    fn test_map_open_order_status_derivation() {
        let partially = status_response(
            r#"{"id":1,"price":"456","original_amount":"2","remaining_amount":"1","executed_amount":"1"}"#,
        );
        assert_eq!(
            map_open_order(&partially, &codec()).unwrap().status,
            OrderStatus::PartiallyFilled
        );

        let filled = status_response(
            r#"{"id":1,"price":"456","original_amount":"1","remaining_amount":"0","executed_amount":"1"}"#,
        );
        assert_eq!(
            map_open_order(&filled, &codec()).unwrap().status,
            OrderStatus::Filled
        );

        let cancelled = status_response(
            r#"{"id":1,"price":"456","is_cancelled":true,"original_amount":"1",
                "remaining_amount":"1","executed_amount":"0"}"#,
        );
        assert_eq!(
            map_open_order(&cancelled, &codec()).unwrap().status,
            OrderStatus::Canceled
        );
    }

    #[test]
    fn test_map_open_order_sell_sign() {
        let resp = status_response(
            r#"{"id":1,"price":"456","side":"sell","original_amount":"2",
                "remaining_amount":"2","executed_amount":"0"}"#,
        );
        let open = map_open_order(&resp, &codec()).unwrap();
        assert_eq!(open.side, Side::Sell);
        assert_eq!(open.original, Quantity::new(-200, 0));
    }

    #[test]
    fn test_map_open_order_rejects_missing_id() {
        let resp = status_response(r#"{"price":"456","original_amount":"1"}"#);
        assert!(map_open_order(&resp, &codec()).is_none());
    }

    #[test]
    fn test_map_holding() {
        let resp: PositionResponse = serde_json::from_str(
            r#"{"id":9,"symbol":"btcusd","status":"ACTIVE","amount":"-1.5","base":"430","pl":"12.5"}"#,
        )
        .unwrap();
        let holding = map_holding(&resp, &codec()).unwrap();
        assert_eq!(holding.symbol, Symbol::new("BTCUSD"));
        assert_eq!(holding.quantity, Quantity::new(-150, 0));
        assert_eq!(holding.average_price, Price::new(430, 2));
        assert_eq!(holding.unrealized_pl, Price::new(125, 3));
    }
}
