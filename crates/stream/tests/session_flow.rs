//! End-to-end decode/route flows across the registry, reconciler, and
//! tick-path invariants, driven by raw wire frames.

use std::sync::Arc;

use coral_core::scaling::ScaleCodec;
use coral_core::types::{
    BrokerOrderId, OrderId, OrderRequest, OrderType, Price, Quantity, Symbol, Venue,
};
use coral_oms::{FillReconciler, OrderEventQueue, OrderStatus, OrderTracker, TrackedOrder};
use coral_stream::{decode, ChannelKind, ChannelRegistry, StreamMessage};

fn limit_order(qty: i64) -> OrderRequest {
    OrderRequest {
        symbol: Symbol::new("BTCUSD"),
        quantity: Quantity::new(qty, 0),
        order_type: OrderType::Limit,
        limit_price: Some(Price::new(4, 0)),
        stop_price: None,
    }
}

#[test]
fn hard_reset_rebuild_preserves_symbols_and_drops_stale_ids() {
    let registry = ChannelRegistry::new();

    // Initial session: acks assign ids 1 and 2.
    for (raw, id, pair) in [
        (r#"{"event":"subscribed","channel":"ticker","chanId":1,"pair":"BTCUSD"}"#, 1u32, "BTCUSD"),
        (r#"{"event":"subscribed","channel":"ticker","chanId":2,"pair":"ETHUSD"}"#, 2u32, "ETHUSD"),
    ] {
        let msg = decode(raw, &registry).unwrap();
        let StreamMessage::Subscribed { channel_id, symbol } = msg else {
            panic!("expected subscription ack");
        };
        assert_eq!(channel_id, id);
        registry.register(channel_id, ChannelKind::Ticker, symbol.unwrap());
        assert_eq!(registry.lookup(id).unwrap().1, Symbol::new(pair));
    }

    let ticker_on_1 = "[1,432.51,5.79,432.74,0.1,-6.41,-0.01,432.72,20067.46,442.79,427.26]";
    assert!(matches!(
        decode(ticker_on_1, &registry).unwrap(),
        StreamMessage::Ticker { .. }
    ));

    // Hard reset: capture the symbol set, then rebuild wholesale.
    let reset = decode(r#"{"event":"info","code":"20051"}"#, &registry).unwrap();
    assert_eq!(reset, StreamMessage::HardReset);
    let captured = registry.symbols_of(ChannelKind::Ticker);
    registry.clear();

    // Between the reset and resubscription no ticker frame may land: the
    // stale channel id resolves to nothing.
    assert_eq!(decode(ticker_on_1, &registry).unwrap(), StreamMessage::Ignored);

    // Resubscription acks arrive under fresh ids, possibly permuted.
    registry.register(7, ChannelKind::Ticker, Symbol::new("ETHUSD"));
    registry.register(9, ChannelKind::Ticker, Symbol::new("BTCUSD"));

    assert_eq!(registry.symbols_of(ChannelKind::Ticker), captured);
    assert!(registry.lookup(1).is_none());

    let ticker_on_9 = "[9,432.51,5.79,432.74,0.1,-6.41,-0.01,432.72,20067.46,442.79,427.26]";
    let StreamMessage::Ticker { symbol, .. } = decode(ticker_on_9, &registry).unwrap() else {
        panic!("expected ticker after resubscription");
    };
    assert_eq!(symbol, Symbol::new("BTCUSD"));
}

#[test]
fn soft_reset_resubscription_supersedes_per_symbol() {
    let registry = ChannelRegistry::new();
    registry.register(1, ChannelKind::Ticker, Symbol::new("BTCUSD"));

    assert_eq!(
        decode(r#"{"event":"info","code":20061,"msg":"resync ended"}"#, &registry).unwrap(),
        StreamMessage::SoftReset
    );

    // The replayed subscription lands on a different id; the old entry
    // for the symbol is superseded, not left to coexist.
    registry.register(2, ChannelKind::Ticker, Symbol::new("BTCUSD"));
    assert!(registry.lookup(1).is_none());
    assert_eq!(
        registry.lookup(2),
        Some((ChannelKind::Ticker, Symbol::new("BTCUSD")))
    );

    // A frame on the stale id is misroutable no longer.
    let stale = "[1,432.51,5.79,432.74,0.1,-6.41,-0.01,432.72,20067.46,442.79,427.26]";
    assert_eq!(decode(stale, &registry).unwrap(), StreamMessage::Ignored);
}

#[test]
fn wire_trades_reconcile_to_fill_events() {
    let registry = ChannelRegistry::new();
    let tracker = Arc::new(OrderTracker::new());
    let events = Arc::new(OrderEventQueue::new());
    let codec = ScaleCodec::new(100).unwrap();
    let reconciler = FillReconciler::new(tracker.clone(), events.clone(), codec, Venue::Bitfinex);

    tracker
        .add(TrackedOrder::new(
            OrderId(1),
            limit_order(4),
            BrokerOrderId::new("2"),
        ))
        .unwrap();

    // Partial execution of 2 against the 4-quantity order.
    let partial = r#"[0,"te",["abc123","1","BTCUSD","1453989092 ","2","2","4","<ORD_TYPE>","5","0",""]]"#;
    let StreamMessage::Trade(execution) = decode(partial, &registry).unwrap() else {
        panic!("expected trade");
    };
    reconciler.on_execution(&execution);

    let drained = events.drain();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].symbol, Symbol::new("BTCUSD"));
    assert_eq!(drained[0].fill_quantity, Quantity::new(200, 0));
    assert_eq!(drained[0].fill_price, Price::new(4, 2));
    assert_eq!(drained[0].status, OrderStatus::PartiallyFilled);
    assert!(tracker.get(OrderId(1)).is_some());

    // The closing execution consumes the remainder and evicts the order.
    let closing = r#"[0,"tu",["abc124","2","BTCUSD","1453989093","2","2","4","<ORD_TYPE>","5","6","USD"]]"#;
    let StreamMessage::Trade(execution) = decode(closing, &registry).unwrap() else {
        panic!("expected trade");
    };
    reconciler.on_execution(&execution);

    let drained = events.drain();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].fill_quantity, Quantity::new(200, 0));
    assert_eq!(drained[0].fee, Price::new(6, 2)); // 0.06
    assert_eq!(drained[0].status, OrderStatus::Filled);
    assert!(tracker.get(OrderId(1)).is_none());
    assert!(tracker.local_id_of(&BrokerOrderId::new("2")).is_none());
}

#[test]
fn unknown_fill_from_wire_is_diagnostic_only() {
    let registry = ChannelRegistry::new();
    let tracker = Arc::new(OrderTracker::new());
    let events = Arc::new(OrderEventQueue::new());
    let codec = ScaleCodec::new(100).unwrap();
    let reconciler = FillReconciler::new(tracker, events.clone(), codec, Venue::Bitfinex);

    let raw = r#"[0,"te",["abc123","BTCUSD",1457729043,77,0.00543202,420.95,"MARKET",null]]"#;
    let StreamMessage::Trade(execution) = decode(raw, &registry).unwrap() else {
        panic!("expected trade");
    };
    reconciler.on_execution(&execution);

    assert!(events.is_empty());
    assert_eq!(reconciler.unknown_fills(), vec![BrokerOrderId::new("77")]);
}
