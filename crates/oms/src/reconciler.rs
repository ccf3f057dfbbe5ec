//! Fill reconciliation.
//!
//! [`FillReconciler`] consumes trade execution reports from the stream,
//! matches them to tracked orders by broker id, converts exchange units to
//! internal units, normalizes fees into the quote currency, and emits one
//! order event per matched execution.
//!
//! Executions that reference an unknown broker id are recorded for
//! diagnostics and otherwise dropped: the order may belong to another
//! session, so neither an event nor an error is appropriate.

use std::sync::Arc;

use parking_lot::Mutex;

use coral_core::scaling::ScaleCodec;
use coral_core::types::{BrokerOrderId, Price, TradeExecution, Venue};

use crate::events::{OrderEvent, OrderEventQueue};
use crate::tracker::{OrderStatus, OrderTracker};

/// Matches trade executions against the order tracker and emits
/// normalized order events.
pub struct FillReconciler {
    tracker: Arc<OrderTracker>,
    events: Arc<OrderEventQueue>,
    codec: ScaleCodec,
    venue: Venue,
    unknown: Mutex<Vec<BrokerOrderId>>,
}

impl FillReconciler {
    /// Create a reconciler over the shared tracker and event queue.
    pub fn new(
        tracker: Arc<OrderTracker>,
        events: Arc<OrderEventQueue>,
        codec: ScaleCodec,
        venue: Venue,
    ) -> Self {
        Self {
            tracker,
            events,
            codec,
            venue,
            unknown: Mutex::new(Vec::new()),
        }
    }

    /// Process one trade execution report.
    pub fn on_execution(&self, exec: &TradeExecution) {
        let Some(local_id) = self.tracker.local_id_of(&exec.broker_order_id) else {
            tracing::debug!(
                broker_id = %exec.broker_order_id,
                pair = %exec.pair,
                "execution for unknown broker id"
            );
            self.unknown.lock().push(exec.broker_order_id.clone());
            return;
        };

        let exec_units = self.codec.scale_quantity(exec.amount_executed).abs();
        let fill_price = self.codec.scale_price(exec.price_executed);
        let fee = self.normalize_fee(exec);

        // Clamping and status derivation happen under the order's entry
        // lock so a racing cancel or second fill cannot interleave.
        let outcome = self.tracker.with_order(local_id, |order| {
            let requested = self.codec.scale_quantity(order.request.quantity).abs();
            let remaining = requested - order.filled;

            let mut units = exec_units;
            if units > remaining {
                tracing::warn!(
                    order_id = %local_id,
                    reported = %units,
                    remaining = %remaining,
                    "execution exceeds open quantity; clamping"
                );
                units = remaining;
            }

            order.filled = order.filled + units;
            let full = !requested.is_zero() && order.filled >= requested;
            order.status = if full {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            (units, order.status, order.request.symbol.clone())
        });

        let Some((units, status, symbol)) = outcome else {
            // Removed between lookup and mutation; treat like unknown.
            self.unknown.lock().push(exec.broker_order_id.clone());
            return;
        };

        if status == OrderStatus::Filled {
            self.tracker.remove(local_id);
        }

        let signed = if exec.amount_executed.is_negative() {
            -units
        } else {
            units
        };

        self.events.push(OrderEvent {
            timestamp: exec.timestamp,
            local_id,
            venue: self.venue,
            symbol,
            status,
            fill_quantity: signed,
            fill_price,
            fee,
            message: format!("{} fill", self.venue),
        });
    }

    /// Broker ids of executions that matched no tracked order.
    pub fn unknown_fills(&self) -> Vec<BrokerOrderId> {
        self.unknown.lock().clone()
    }

    /// Fee in quote-currency internal units.
    ///
    /// Fees reported in a currency other than the pair's quote currency
    /// (typically the base asset) are converted through the execution
    /// price before scaling: `fee * price / factor`. Quote-currency fees
    /// scale directly: `fee / factor`.
    fn normalize_fee(&self, exec: &TradeExecution) -> Price {
        let Some(fee) = exec.fee else {
            return Price::zero(0);
        };
        let in_quote = match &exec.fee_currency {
            Some(currency) => currency.eq_ignore_ascii_case(exec.pair.quote()),
            None => true,
        };
        if in_quote {
            self.codec.scale_price(fee)
        } else {
            self.codec.scale_price(fee * exec.price_executed)
        }
    }
}
