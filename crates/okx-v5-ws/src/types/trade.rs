/*
[INPUT]:  Order-management requests and their replies
[OUTPUT]: Typed trade ops, requests and responses
[POS]:    Data layer - trade operation wire types
[UPDATE]: When the venue adds trade ops over the WebSocket API
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::OkxWsError;

/// Trade operations correlated by request id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TradeOp {
    Order,
    BatchOrders,
    CancelOrder,
    BatchCancelOrders,
    AmendOrder,
    BatchAmendOrders,
}

impl TradeOp {
    pub const ALL: [TradeOp; 6] = [
        TradeOp::Order,
        TradeOp::BatchOrders,
        TradeOp::CancelOrder,
        TradeOp::BatchCancelOrders,
        TradeOp::AmendOrder,
        TradeOp::BatchAmendOrders,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeOp::Order => "order",
            TradeOp::BatchOrders => "batch-orders",
            TradeOp::CancelOrder => "cancel-order",
            TradeOp::BatchCancelOrders => "batch-cancel-orders",
            TradeOp::AmendOrder => "amend-order",
            TradeOp::BatchAmendOrders => "batch-amend-orders",
        }
    }
}

impl fmt::Display for TradeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeOp {
    type Err = OkxWsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TradeOp::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| OkxWsError::UnknownTradeOp(s.to_string()))
    }
}

/// Outbound trade request: `{"id"?, "op", ...fields}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub op: TradeOp,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TradeRequest {
    /// Request with the usual `args` array
    pub fn new(op: TradeOp, args: Vec<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert("args".to_string(), Value::Array(args));
        Self {
            id: None,
            op,
            fields,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Assign a fresh id when the caller did not choose one
    pub(crate) fn ensure_id(&mut self) -> &str {
        self.id
            .get_or_insert_with(|| Uuid::new_v4().simple().to_string())
            .as_str()
    }
}

/// Reply to a trade request
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradeResponse {
    pub id: String,
    pub op: TradeOp,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default, rename = "inTime", skip_serializing_if = "Option::is_none")]
    pub in_time: Option<String>,
    #[serde(default, rename = "outTime", skip_serializing_if = "Option::is_none")]
    pub out_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trade_op_from_str() {
        assert_eq!("batch-amend-orders".parse::<TradeOp>().unwrap(), TradeOp::BatchAmendOrders);
        assert!(matches!(
            "subscribe".parse::<TradeOp>(),
            Err(OkxWsError::UnknownTradeOp(op)) if op == "subscribe"
        ));
    }

    #[test]
    fn test_trade_request_wire_shape() {
        let request = TradeRequest::new(
            TradeOp::CancelOrder,
            vec![json!({"instId": "BTC-USDT", "ordId": "2510789768709120"})],
        )
        .with_id("1512");
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(
            wire,
            json!({
                "id": "1512",
                "op": "cancel-order",
                "args": [{"instId": "BTC-USDT", "ordId": "2510789768709120"}]
            })
        );
    }

    #[test]
    fn test_ensure_id_generates_compact_token() {
        let mut request = TradeRequest::new(TradeOp::Order, vec![]);
        let id = request.ensure_id().to_string();
        assert_eq!(id.len(), 32);
        assert!(!id.contains('-'));
        assert_eq!(request.ensure_id(), id);
    }
}
