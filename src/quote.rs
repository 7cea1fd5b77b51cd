//! Typed inbound/outbound records and their string-map parsing.
//!
//! The wire-level quote is an opaque string-keyed map (decimal strings for
//! numeric fields). [`Quote::from_map`] parses it once, at the boundary,
//! into this typed form — the rest of the crate never touches a
//! `HashMap<String, String>` again, per the "parse once at the boundary"
//! design note this crate's distillation carries forward.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Which side of the book an order or quote belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    #[must_use]
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// Market orders consume liquidity at whatever price is available and
/// never rest; limit orders cross while price allows, then rest any
/// residual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
}

/// A malformed quote field.
#[derive(Debug)]
#[non_exhaustive]
pub enum InvalidQuote {
    MissingField {
        field: &'static str,
    },
    BadInteger {
        field: &'static str,
        message: String,
    },
    BadEnum {
        field: &'static str,
        value: String,
    },
}

impl fmt::Display for InvalidQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidQuote::MissingField { field } => write!(f, "missing quote field: {field}"),
            InvalidQuote::BadInteger { field, message } => {
                write!(f, "invalid integer in field {field}: {message}")
            }
            InvalidQuote::BadEnum { field, value } => {
                write!(f, "invalid value {value:?} for field {field}")
            }
        }
    }
}

impl std::error::Error for InvalidQuote {}

/// The parsed, typed form of an inbound quote record.
#[derive(Debug, Clone)]
pub struct Quote {
    pub kind: OrderKind,
    pub side: Side,
    pub quantity: BigUint,
    /// Required for limit orders; ignored for market orders.
    pub price: Option<BigUint>,
    /// Set by the engine on insert; required on cancel/modify.
    pub order_id: Option<u64>,
    pub timestamp: u64,
    pub trade_id: String,
    pub pair_name: String,
}

impl Quote {
    /// Parse a wire-level string map into a typed `Quote`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidQuote`] if a required field is absent or malformed.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, InvalidQuote> {
        let kind = match field(map, "type")?.as_str() {
            "market" => OrderKind::Market,
            "limit" => OrderKind::Limit,
            other => {
                return Err(InvalidQuote::BadEnum {
                    field: "type",
                    value: other.to_string(),
                });
            }
        };
        let side = match field(map, "side")?.as_str() {
            "bid" => Side::Bid,
            "ask" => Side::Ask,
            other => {
                return Err(InvalidQuote::BadEnum {
                    field: "side",
                    value: other.to_string(),
                });
            }
        };
        let quantity = parse_biguint(map, "quantity")?;
        let price = match map.get("price") {
            Some(raw) if !raw.is_empty() => Some(parse_str::<BigUint>(raw, "price")?),
            _ => None,
        };
        if kind == OrderKind::Limit && price.is_none() {
            return Err(InvalidQuote::MissingField { field: "price" });
        }
        let order_id = match map.get("order_id") {
            Some(raw) if !raw.is_empty() => Some(parse_str::<u64>(raw, "order_id")?),
            _ => None,
        };
        let timestamp = match map.get("timestamp") {
            Some(raw) if !raw.is_empty() => parse_str::<u64>(raw, "timestamp")?,
            _ => crate::utils::current_time_millis(),
        };
        let trade_id = map.get("trade_id").cloned().unwrap_or_default();
        let pair_name = field(map, "pair_name")?;

        Ok(Self {
            kind,
            side,
            quantity,
            price,
            order_id,
            timestamp,
            trade_id,
            pair_name,
        })
    }
}

fn field(map: &HashMap<String, String>, name: &'static str) -> Result<String, InvalidQuote> {
    map.get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or(InvalidQuote::MissingField { field: name })
}

fn parse_biguint(
    map: &HashMap<String, String>,
    name: &'static str,
) -> Result<BigUint, InvalidQuote> {
    let raw = field(map, name)?;
    parse_str::<BigUint>(&raw, name)
}

fn parse_str<T: FromStr>(raw: &str, name: &'static str) -> Result<T, InvalidQuote>
where
    T::Err: fmt::Display,
{
    raw.parse::<T>().map_err(|e| InvalidQuote::BadInteger {
        field: name,
        message: e.to_string(),
    })
}

/// A record produced by matching, carrying the crossing price and filled
/// quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: u64,
    pub price: BigUint,
    pub quantity: BigUint,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn parses_valid_limit_quote() {
        let map = sample_map(&[
            ("type", "limit"),
            ("side", "bid"),
            ("quantity", "5"),
            ("price", "100"),
            ("trade_id", "t1"),
            ("pair_name", "BTC/USD"),
        ]);
        let quote = Quote::from_map(&map).unwrap();
        assert_eq!(quote.kind, OrderKind::Limit);
        assert_eq!(quote.side, Side::Bid);
        assert_eq!(quote.quantity, BigUint::from(5u32));
        assert_eq!(quote.price, Some(BigUint::from(100u32)));
    }

    #[test]
    fn limit_without_price_is_invalid() {
        let map = sample_map(&[
            ("type", "limit"),
            ("side", "bid"),
            ("quantity", "5"),
            ("pair_name", "BTC/USD"),
        ]);
        assert!(matches!(
            Quote::from_map(&map),
            Err(InvalidQuote::MissingField { field: "price" })
        ));
    }

    #[test]
    fn market_quote_does_not_require_price() {
        let map = sample_map(&[
            ("type", "market"),
            ("side", "ask"),
            ("quantity", "5"),
            ("pair_name", "BTC/USD"),
        ]);
        let quote = Quote::from_map(&map).unwrap();
        assert_eq!(quote.kind, OrderKind::Market);
        assert!(quote.price.is_none());
    }

    #[test]
    fn unparsable_quantity_is_invalid() {
        let map = sample_map(&[
            ("type", "market"),
            ("side", "ask"),
            ("quantity", "not-a-number"),
            ("pair_name", "BTC/USD"),
        ]);
        assert!(matches!(
            Quote::from_map(&map),
            Err(InvalidQuote::BadInteger {
                field: "quantity",
                ..
            })
        ));
    }

    #[test]
    fn unknown_side_is_invalid() {
        let map = sample_map(&[
            ("type", "market"),
            ("side", "sideways"),
            ("quantity", "5"),
            ("pair_name", "BTC/USD"),
        ]);
        assert!(matches!(
            Quote::from_map(&map),
            Err(InvalidQuote::BadEnum { field: "side", .. })
        ));
    }
}
