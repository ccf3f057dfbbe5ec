//! Wire-frame decoding.
//!
//! The venue pushes two frame shapes: positional JSON arrays led by a
//! channel id (or `0` for control arrays) and a short type tag, and keyed
//! JSON objects with an `event` field. [`decode`] turns either into
//! exactly one [`StreamMessage`] variant or a [`DecodeError`] that carries
//! the raw payload for diagnostics. Nothing downstream ever sees raw JSON.
//!
//! Numeric sub-fields are parsed tolerantly: a field that fails to parse
//! inside an otherwise valid message is skipped (ticker fields surface as
//! `None`, optional trade fields as `None`), never aborting the frame.
//! Fee fields go through the exponential-safe parser since fee magnitudes
//! are routinely small enough to serialize as `1.2e-6`.

use serde_json::Value;

use coral_core::scaling::{parse_price, parse_quantity};
use coral_core::types::{
    BrokerOrderId, Price, Quantity, Symbol, Timestamp, TradeExecution, WalletBalance,
};

use crate::channels::{ChannelKind, ChannelRegistry};

/// Info code demanding a full reconnect.
const CODE_HARD_RESET: u32 = 20051;
/// Info code demanding re-auth and resubscription on the live socket.
const CODE_SOFT_RESET: u32 = 20061;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Liveness beacon; refreshes the last-seen clock and nothing else.
    Heartbeat {
        /// Channel the beacon arrived on.
        channel_id: u32,
    },
    /// Trade execution or update for one of our orders.
    Trade(TradeExecution),
    /// Full wallet snapshot; replaces the balance set atomically.
    WalletSnapshot(Vec<WalletBalance>),
    /// Ticker snapshot for a registered ticker channel.
    Ticker {
        /// Channel it arrived on.
        channel_id: u32,
        /// Symbol resolved through the registry.
        symbol: Symbol,
        /// Raw (unscaled) field values; `None` = field unparseable.
        frame: TickerFrame,
    },
    /// Subscription ack assigning a channel id.
    Subscribed {
        /// Assigned channel id.
        channel_id: u32,
        /// Pair, when the ack names one.
        symbol: Option<Symbol>,
    },
    /// Authentication accepted.
    AuthAck,
    /// Authentication rejected — fatal for the connection.
    AuthFailure,
    /// Venue demands a full reconnect.
    HardReset,
    /// Venue demands re-auth and resubscription without dropping the
    /// socket.
    SoftReset,
    /// Recognized as noise (unknown shape, unregistered channel);
    /// logged by the caller and dropped.
    Ignored,
}

/// Positional ticker fields in wire units. Unparseable fields are `None`
/// and the prior value is retained downstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickerFrame {
    /// Best bid.
    pub bid: Option<Price>,
    /// Size at the best bid.
    pub bid_size: Option<Quantity>,
    /// Best ask.
    pub ask: Option<Price>,
    /// Size at the best ask.
    pub ask_size: Option<Quantity>,
    /// Daily change.
    pub daily_change: Option<Price>,
    /// Daily change, percent.
    pub daily_change_pct: Option<Price>,
    /// Last traded price.
    pub last: Option<Price>,
    /// Daily volume.
    pub volume: Option<Quantity>,
    /// Daily high.
    pub high: Option<Price>,
    /// Daily low.
    pub low: Option<Price>,
}

/// Decode failure carrying the raw payload for diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}; raw frame: {raw}")]
pub struct DecodeError {
    /// What went wrong.
    pub message: String,
    /// The offending frame, verbatim.
    pub raw: String,
}

impl DecodeError {
    fn new(message: impl Into<String>, raw: &str) -> Self {
        Self {
            message: message.into(),
            raw: raw.to_string(),
        }
    }
}

/// Decode one raw text frame into a typed message.
///
/// The registry is consulted to classify positional arrays whose first
/// element is a known ticker channel id; after a hard reset has cleared
/// the registry, such frames decode to [`StreamMessage::Ignored`] until
/// the channel is re-registered — stale ids never reach the tick buffer.
pub fn decode(raw: &str, registry: &ChannelRegistry) -> Result<StreamMessage, DecodeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::new(format!("not JSON: {e}"), raw))?;

    match value {
        Value::Array(items) => decode_array(&items, registry, raw),
        Value::Object(_) => decode_object(&value, raw),
        _ => Ok(StreamMessage::Ignored),
    }
}

fn decode_array(
    items: &[Value],
    registry: &ChannelRegistry,
    raw: &str,
) -> Result<StreamMessage, DecodeError> {
    if items.len() < 2 {
        return Ok(StreamMessage::Ignored);
    }

    if let Some(tag) = items[1].as_str() {
        match tag {
            "hb" => {
                return Ok(StreamMessage::Heartbeat {
                    channel_id: as_u32(&items[0]).unwrap_or(0),
                })
            }
            "te" | "tu" => {
                let fields = items
                    .get(2)
                    .and_then(Value::as_array)
                    .ok_or_else(|| DecodeError::new("trade frame without payload array", raw))?;
                return decode_trade(fields, raw).map(StreamMessage::Trade);
            }
            "ws" => {
                let entries = items
                    .get(2)
                    .and_then(Value::as_array)
                    .ok_or_else(|| DecodeError::new("wallet frame without payload array", raw))?;
                return Ok(StreamMessage::WalletSnapshot(decode_wallet(entries)));
            }
            _ => {}
        }
    }

    if let Some(channel_id) = as_u32(&items[0]) {
        if let Some((ChannelKind::Ticker, symbol)) = registry.lookup(channel_id) {
            return Ok(StreamMessage::Ticker {
                channel_id,
                symbol,
                frame: decode_ticker(items),
            });
        }
    }

    Ok(StreamMessage::Ignored)
}

/// Positional trade payload. Two layouts exist on the wire; the field map
/// is selected by observed arity. Current (11 fields):
/// `[seq, trade_id, pair, timestamp, order_id, amount, price, kind,
/// order_price, fee, fee_currency]`. Legacy (8 fields) omits the trade
/// id and the trailing fee pair.
fn decode_trade(fields: &[Value], raw: &str) -> Result<TradeExecution, DecodeError> {
    let long_form = fields.len() >= 11;
    if fields.len() < 8 {
        return Err(DecodeError::new(
            format!("trade payload has {} fields, expected 8 or 11", fields.len()),
            raw,
        ));
    }

    // Index map per layout.
    let (ix_pair, ix_ts, ix_ord, ix_amount, ix_price, ix_kind, ix_ord_price) = if long_form {
        (2, 3, 4, 5, 6, 7, 8)
    } else {
        (1, 2, 3, 4, 5, 6, 7)
    };

    let pair = text(&fields[ix_pair])
        .ok_or_else(|| DecodeError::new("trade frame missing pair", raw))?;
    let broker_order_id = integer(&fields[ix_ord])
        .ok_or_else(|| DecodeError::new("trade frame missing order id", raw))?;
    let amount_executed = text(&fields[ix_amount])
        .and_then(|s| parse_quantity(&s).ok())
        .ok_or_else(|| DecodeError::new("trade frame has unparseable amount", raw))?;
    let price_executed = text(&fields[ix_price])
        .and_then(|s| parse_price(&s).ok())
        .ok_or_else(|| DecodeError::new("trade frame has unparseable price", raw))?;

    let timestamp = text(&fields[ix_ts])
        .and_then(|s| s.trim().parse::<f64>().ok())
        .map(Timestamp::from_secs_f64)
        .unwrap_or_else(Timestamp::now);

    Ok(TradeExecution {
        sequence: text(&fields[0]).unwrap_or_default(),
        trade_id: long_form.then(|| integer(&fields[1])).flatten(),
        pair: Symbol::new(pair),
        timestamp,
        broker_order_id: BrokerOrderId::new(broker_order_id.to_string()),
        amount_executed,
        price_executed,
        order_kind: text(&fields[ix_kind]).unwrap_or_default(),
        order_price: text(&fields[ix_ord_price]).and_then(|s| parse_price(&s).ok()),
        // Exponential-safe parse: fees are small fractions on the wire.
        fee: long_form
            .then(|| text(&fields[9]).and_then(|s| parse_price(&s).ok()))
            .flatten(),
        fee_currency: long_form
            .then(|| text(&fields[10]).filter(|s| !s.is_empty()))
            .flatten(),
    })
}

/// Wallet snapshot: nested arrays of `[wallet, currency, balance, ...]`.
/// Entries with an unparseable balance are skipped, not fatal.
fn decode_wallet(entries: &[Value]) -> Vec<WalletBalance> {
    entries
        .iter()
        .filter_map(|entry| {
            let fields = entry.as_array()?;
            let wallet = text(fields.first()?)?;
            let currency = text(fields.get(1)?)?.to_uppercase();
            let balance = text(fields.get(2)?).and_then(|s| parse_price(&s).ok());
            match balance {
                Some(balance) => Some(WalletBalance {
                    wallet,
                    currency,
                    balance,
                }),
                None => {
                    tracing::debug!(currency, "skipping wallet entry with unparseable balance");
                    None
                }
            }
        })
        .collect()
}

/// Positional ticker frame after the channel id. Each numeric field is
/// parsed independently; failures yield `None`.
fn decode_ticker(items: &[Value]) -> TickerFrame {
    let price_at = |i: usize| items.get(i).and_then(text).and_then(|s| parse_price(&s).ok());
    let qty_at = |i: usize| {
        items
            .get(i)
            .and_then(text)
            .and_then(|s| parse_quantity(&s).ok())
    };

    TickerFrame {
        bid: price_at(1),
        bid_size: qty_at(2),
        ask: price_at(3),
        ask_size: qty_at(4),
        daily_change: price_at(5),
        daily_change_pct: price_at(6),
        last: price_at(7),
        volume: qty_at(8),
        high: price_at(9),
        low: price_at(10),
    }
}

fn decode_object(value: &Value, raw: &str) -> Result<StreamMessage, DecodeError> {
    let event = value.get("event").and_then(Value::as_str);

    // Subscription ack. Checked before the channel-0 control rule: acks
    // can legitimately arrive with chanId 0.
    if event == Some("subscribed") && value.get("channel").and_then(Value::as_str) == Some("ticker")
    {
        let channel_id = value
            .get("chanId")
            .and_then(as_u32)
            .ok_or_else(|| DecodeError::new("subscription ack without chanId", raw))?;
        let symbol = value
            .get("pair")
            .and_then(text)
            .filter(|s| !s.is_empty())
            .map(Symbol::new);
        return Ok(StreamMessage::Subscribed { channel_id, symbol });
    }

    // Channel-0 control object: the auth acknowledgment.
    if value.get("chanId").and_then(as_u32) == Some(0) {
        return Ok(match value.get("status").and_then(Value::as_str) {
            Some("FAIL") => StreamMessage::AuthFailure,
            _ => StreamMessage::AuthAck,
        });
    }

    // Info events carry reset codes as either JSON numbers or strings.
    if event == Some("info") {
        return Ok(match value.get("code").and_then(as_u32) {
            Some(CODE_HARD_RESET) => StreamMessage::HardReset,
            Some(CODE_SOFT_RESET) => StreamMessage::SoftReset,
            _ => StreamMessage::Ignored,
        });
    }

    Ok(StreamMessage::Ignored)
}

/// String content of a value: strings pass through trimmed, numbers are
/// stringified, everything else (null included) is `None`.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integer content of a value, tolerating numeric strings.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `u32` content of a value, tolerating numeric strings.
fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_ticker(id: u32, symbol: &str) -> ChannelRegistry {
        let r = ChannelRegistry::new();
        r.register(id, ChannelKind::Ticker, Symbol::new(symbol));
        r
    }

    // ── arrays ──

    #[test]
    fn test_heartbeat() {
        let r = ChannelRegistry::new();
        let msg = decode(r#"[7,"hb"]"#, &r).unwrap();
        assert_eq!(msg, StreamMessage::Heartbeat { channel_id: 7 });
    }

    #[test]
    fn test_trade_current_layout_with_string_fields() {
        let r = ChannelRegistry::new();
        let raw = r#"[0,"tu",["abc123","1","BTCUSD","1453989092 ","2","3","4","<ORD_TYPE>","5","6","USD"]]"#;
        let msg = decode(raw, &r).unwrap();

        let StreamMessage::Trade(t) = msg else {
            panic!("expected trade, got {msg:?}")
        };
        assert_eq!(t.sequence, "abc123");
        assert_eq!(t.trade_id, Some(1));
        assert_eq!(t.pair, Symbol::new("BTCUSD"));
        assert_eq!(t.timestamp.to_millis(), 1453989092000);
        assert_eq!(t.broker_order_id, BrokerOrderId::new("2"));
        assert_eq!(t.amount_executed, Quantity::new(3, 0));
        assert_eq!(t.price_executed, Price::new(4, 0));
        assert_eq!(t.order_kind, "<ORD_TYPE>");
        assert_eq!(t.order_price, Some(Price::new(5, 0)));
        assert_eq!(t.fee, Some(Price::new(6, 0)));
        assert_eq!(t.fee_currency, Some("USD".to_string()));
    }

    #[test]
    fn test_trade_legacy_layout_with_numeric_fields() {
        let r = ChannelRegistry::new();
        let raw = r#"[0,"te",["abc123","BTCUSD",1457729043,2,0.00543202,420.95,"MARKET",null]]"#;
        let msg = decode(raw, &r).unwrap();

        let StreamMessage::Trade(t) = msg else {
            panic!("expected trade, got {msg:?}")
        };
        assert_eq!(t.trade_id, None);
        assert_eq!(t.pair, Symbol::new("BTCUSD"));
        assert_eq!(t.broker_order_id, BrokerOrderId::new("2"));
        assert_eq!(t.amount_executed, Quantity::new(543202, 8));
        assert_eq!(t.price_executed, Price::new(42095, 2));
        assert_eq!(t.order_kind, "MARKET");
        assert_eq!(t.order_price, None);
        assert_eq!(t.fee, None);
        assert_eq!(t.fee_currency, None);
    }

    #[test]
    fn test_trade_fee_in_scientific_notation() {
        let r = ChannelRegistry::new();
        let raw = r#"[0,"tu",["s","9","BTCUSD","1453989092","2","3","4","LIMIT","5","1.2e-6","BTC"]]"#;
        let StreamMessage::Trade(t) = decode(raw, &r).unwrap() else {
            panic!("expected trade")
        };
        assert_eq!(t.fee, Some(Price::new(12, 7)));
        assert_eq!(t.fee_currency, Some("BTC".to_string()));
    }

    #[test]
    fn test_trade_unparseable_amount_is_an_error_with_raw() {
        let r = ChannelRegistry::new();
        let raw = r#"[0,"tu",["s","1","BTCUSD","1453989092","2","??","4","LIMIT","5","6","USD"]]"#;
        let err = decode(raw, &r).unwrap_err();
        assert!(err.message.contains("amount"));
        assert_eq!(err.raw, raw);
    }

    #[test]
    fn test_trade_too_short_payload() {
        let r = ChannelRegistry::new();
        let err = decode(r#"[0,"te",["a","b"]]"#, &r).unwrap_err();
        assert!(err.message.contains("fields"));
    }

    #[test]
    fn test_wallet_snapshot() {
        let r = ChannelRegistry::new();
        let raw = r#"[0,"ws",[["exchange","usd","10500.75",null],["exchange","btc","0.5",null]]]"#;
        let StreamMessage::WalletSnapshot(balances) = decode(raw, &r).unwrap() else {
            panic!("expected wallet snapshot")
        };
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].wallet, "exchange");
        assert_eq!(balances[0].currency, "USD");
        assert_eq!(balances[0].balance, Price::new(1050075, 2));
        assert_eq!(balances[1].currency, "BTC");
    }

    #[test]
    fn test_wallet_bad_entry_skipped() {
        let r = ChannelRegistry::new();
        let raw = r#"[0,"ws",[["exchange","usd","oops",null],["exchange","btc","0.5",null]]]"#;
        let StreamMessage::WalletSnapshot(balances) = decode(raw, &r).unwrap() else {
            panic!("expected wallet snapshot")
        };
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].currency, "BTC");
    }

    #[test]
    fn test_ticker_on_registered_channel() {
        let r = registry_with_ticker(2, "BTCUSD");
        let raw = "[2,432.51,5.79789796,432.74,0.00009992,-6.41,-0.01,432.72,20067.46166511,442.79,427.26]";
        let StreamMessage::Ticker { channel_id, symbol, frame } = decode(raw, &r).unwrap() else {
            panic!("expected ticker")
        };
        assert_eq!(channel_id, 2);
        assert_eq!(symbol, Symbol::new("BTCUSD"));
        assert_eq!(frame.bid, Some(Price::new(43251, 2)));
        assert_eq!(frame.ask, Some(Price::new(43274, 2)));
        assert_eq!(frame.last, Some(Price::new(43272, 2)));
        assert_eq!(frame.daily_change, Some(Price::new(-641, 2)));
        assert_eq!(frame.high, Some(Price::new(44279, 2)));
        assert_eq!(frame.low, Some(Price::new(42726, 2)));
    }

    #[test]
    fn test_ticker_with_string_channel_id_and_fields() {
        // Some gateways stringify every array element.
        let r = registry_with_ticker(0, "BTCUSD");
        let raw = r#"["0","0.01","0.01","0.01","0.01","0.01","0.01","1","0.01","0.01","0.01"]"#;
        let StreamMessage::Ticker { symbol, frame, .. } = decode(raw, &r).unwrap() else {
            panic!("expected ticker")
        };
        assert_eq!(symbol, Symbol::new("BTCUSD"));
        assert_eq!(frame.last, Some(Price::new(1, 0)));
        assert_eq!(frame.bid, Some(Price::new(1, 2)));
    }

    #[test]
    fn test_ticker_bad_field_is_none_not_fatal() {
        let r = registry_with_ticker(2, "BTCUSD");
        let raw = r#"[2,"x",5.79,"y",0.1,-6.41,-0.01,432.72,20067.46,442.79,427.26]"#;
        let StreamMessage::Ticker { frame, .. } = decode(raw, &r).unwrap() else {
            panic!("expected ticker")
        };
        assert_eq!(frame.bid, None);
        assert_eq!(frame.ask, None);
        assert_eq!(frame.last, Some(Price::new(43272, 2)));
    }

    #[test]
    fn test_unregistered_channel_ignored() {
        let r = ChannelRegistry::new();
        let raw = "[2,432.51,5.79,432.74,0.1,-6.41,-0.01,432.72,20067.46,442.79,427.26]";
        assert_eq!(decode(raw, &r).unwrap(), StreamMessage::Ignored);
    }

    // ── objects ──

    #[test]
    fn test_subscribed_ack() {
        let r = ChannelRegistry::new();
        let raw = r#"{"event":"subscribed","channel":"ticker","chanId":2,"pair":"BTCUSD"}"#;
        assert_eq!(
            decode(raw, &r).unwrap(),
            StreamMessage::Subscribed {
                channel_id: 2,
                symbol: Some(Symbol::new("BTCUSD")),
            }
        );
    }

    #[test]
    fn test_subscribed_ack_string_chan_id_no_pair() {
        let r = ChannelRegistry::new();
        let raw = r#"{"event":"subscribed","channel":"ticker","chanId":"0"}"#;
        assert_eq!(
            decode(raw, &r).unwrap(),
            StreamMessage::Subscribed {
                channel_id: 0,
                symbol: None,
            }
        );
    }

    #[test]
    fn test_auth_ack_and_failure() {
        let r = ChannelRegistry::new();
        assert_eq!(
            decode(r#"{"event":"auth","chanId":0,"status":"OK","userId":7}"#, &r).unwrap(),
            StreamMessage::AuthAck
        );
        assert_eq!(
            decode(r#"{"event":"auth","chanId":0,"status":"FAIL","code":10100}"#, &r).unwrap(),
            StreamMessage::AuthFailure
        );
    }

    #[test]
    fn test_info_reset_codes_string_and_number() {
        let r = ChannelRegistry::new();
        assert_eq!(
            decode(r#"{"event":"info","code":"20051"}"#, &r).unwrap(),
            StreamMessage::HardReset
        );
        assert_eq!(
            decode(
                r#"{"event":"info","code":20061,"msg":"Resync from the Trading Engine ended"}"#,
                &r
            )
            .unwrap(),
            StreamMessage::SoftReset
        );
    }

    #[test]
    fn test_info_without_reset_code_ignored() {
        let r = ChannelRegistry::new();
        assert_eq!(
            decode(r#"{"event":"info","version":1.1}"#, &r).unwrap(),
            StreamMessage::Ignored
        );
    }

    #[test]
    fn test_unknown_shapes_ignored() {
        let r = ChannelRegistry::new();
        assert_eq!(decode(r#"{"event":"pong"}"#, &r).unwrap(), StreamMessage::Ignored);
        assert_eq!(decode("[1]", &r).unwrap(), StreamMessage::Ignored);
        assert_eq!(decode("42", &r).unwrap(), StreamMessage::Ignored);
    }

    #[test]
    fn test_non_json_is_error_with_raw() {
        let r = ChannelRegistry::new();
        let err = decode("not json at all", &r).unwrap_err();
        assert!(err.message.contains("JSON"));
        assert_eq!(err.raw, "not json at all");
    }
}
