//! Gateway wire protocol.
//!
//! JSON text frames tagged by `type`. Field names are camelCase.

use crate::error::{GatewayError, GatewayResult};
use perpline_core::{AprRate, PositionSnapshot, PriceQuote, PriceTick};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client to server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Subscribe {
        channel: String,
    },
    Unsubscribe {
        channel: String,
    },
    Ping,
}

const CLIENT_TYPES: [&str; 4] = ["auth", "subscribe", "unsubscribe", "ping"];

impl ClientMessage {
    /// Parse a raw text frame.
    ///
    /// Unknown `type` values are reported by name; anything else that does
    /// not fit the schema is `InvalidMessage`.
    pub fn parse(raw: &str) -> GatewayResult<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| GatewayError::InvalidMessage(e.to_string()))?;
        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(other) => return Err(GatewayError::UnknownType(other.to_string())),
            None => {
                return Err(GatewayError::InvalidMessage(
                    "missing `type` field".to_string(),
                ))
            }
        };
        if !CLIENT_TYPES.contains(&kind.as_str()) {
            return Err(GatewayError::UnknownType(kind));
        }
        serde_json::from_value(value).map_err(|e| GatewayError::InvalidMessage(e.to_string()))
    }
}

/// Server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Welcome { client_id: String, timestamp: i64 },
    #[serde(rename_all = "camelCase")]
    AuthSuccess { user_id: String, timestamp: i64 },
    Subscribed { channel: String, timestamp: i64 },
    Unsubscribed { channel: String, timestamp: i64 },
    Pong { timestamp: i64 },
    Error { error: String, timestamp: i64 },

    PricesSnapshot { data: Vec<PriceQuote>, timestamp: i64 },
    PortfolioSnapshot { data: Vec<PositionSnapshot>, timestamp: i64 },
    AprRatesSnapshot { data: Vec<AprRate>, timestamp: i64 },

    /// One price-history tick from the change feed.
    PriceUpdate { data: PriceTick, timestamp: i64 },
    /// Periodic watch-list refresh.
    PricesUpdate { data: Vec<PriceQuote>, timestamp: i64 },
    PositionUpdate { data: PositionSnapshot, timestamp: i64 },
    AprUpdate { data: AprRate, timestamp: i64 },
}

impl ServerMessage {
    pub fn error(error: impl ToString, timestamp: i64) -> Self {
        Self::Error {
            error: error.to_string(),
            timestamp,
        }
    }

    pub fn to_json(&self) -> GatewayResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_client_messages() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"auth","userId":"0xabc"}"#).unwrap(),
            ClientMessage::Auth {
                user_id: "0xabc".to_string()
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"subscribe","channel":"prices"}"#).unwrap(),
            ClientMessage::Subscribe {
                channel: "prices".to_string()
            }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        );
    }

    #[test]
    fn test_unknown_type_is_named() {
        let err = ClientMessage::parse(r#"{"type":"trade","size":1}"#).unwrap_err();
        assert!(matches!(err, GatewayError::UnknownType(ref t) if t == "trade"));
        assert_eq!(err.to_string(), "Unknown message type: trade");
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            ClientMessage::parse("{not json"),
            Err(GatewayError::InvalidMessage(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"channel":"prices"}"#),
            Err(GatewayError::InvalidMessage(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"subscribe"}"#),
            Err(GatewayError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_server_message_shapes() {
        let welcome = ServerMessage::Welcome {
            client_id: "abc".to_string(),
            timestamp: 5,
        };
        let json: Value = serde_json::from_str(&welcome.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "welcome");
        assert_eq!(json["clientId"], "abc");
        assert_eq!(json["timestamp"], 5);

        let update = ServerMessage::PriceUpdate {
            data: PriceTick {
                symbol: "APT".to_string(),
                price: dec!(8.50),
                change_24h: dec!(0),
                volume_24h: None,
                timestamp: 1,
            },
            timestamp: 2,
        };
        let json: Value = serde_json::from_str(&update.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "price_update");
        assert_eq!(json["data"]["symbol"], "APT");
        assert_eq!(json["data"]["price"], 8.5);
        assert_eq!(json["data"]["change24h"], 0.0);

        let snapshot = ServerMessage::AprRatesSnapshot {
            data: Vec::new(),
            timestamp: 0,
        };
        assert!(snapshot.to_json().unwrap().contains("\"apr_rates_snapshot\""));
    }
}
