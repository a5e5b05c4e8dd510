/*
[INPUT]:  Server reply frames for control operations and channel pushes
[OUTPUT]: Typed login/subscription replies and channel messages
[POS]:    Data layer - inbound envelope types
[UPDATE]: When reply envelopes change shape
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SubscriptionTopic;

/// Reply to a `login` operation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoginResponse {
    pub event: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(rename = "connId", default, skip_serializing_if = "Option::is_none")]
    pub conn_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// `arg` of a subscription reply, either one topic or several
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TopicArg {
    Many(Vec<SubscriptionTopic>),
    Single(SubscriptionTopic),
}

impl TopicArg {
    pub fn topics(&self) -> Vec<&SubscriptionTopic> {
        match self {
            TopicArg::Many(topics) => topics.iter().collect(),
            TopicArg::Single(topic) => vec![topic],
        }
    }
}

/// Reply to a `subscribe` operation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SubscriptionResponse {
    pub event: String,
    pub arg: TopicArg,
    #[serde(rename = "connId", default, skip_serializing_if = "Option::is_none")]
    pub conn_id: Option<String>,
}

/// Reply to an `unsubscribe` operation
pub type UnsubscriptionResponse = SubscriptionResponse;

/// Push delivered to channel handlers
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChannelMessage {
    pub arg: SubscriptionTopic,
    #[serde(default)]
    pub data: Value,
    /// `snapshot` / `update` on order book channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_response_single_arg() {
        let reply: SubscriptionResponse = serde_json::from_str(
            r#"{"event":"subscribe","arg":{"channel":"tickers","instId":"BTC-USDT"},"connId":"a4d3ae55"}"#,
        )
        .unwrap();
        assert_eq!(
            reply.arg.topics(),
            vec![&SubscriptionTopic::instrument("tickers", "BTC-USDT")]
        );
        assert_eq!(reply.conn_id.as_deref(), Some("a4d3ae55"));
    }

    #[test]
    fn test_subscription_response_many_args() {
        let reply: SubscriptionResponse = serde_json::from_str(
            r#"{"event":"unsubscribe","arg":[{"channel":"status"},{"channel":"account","ccy":"BTC"}]}"#,
        )
        .unwrap();
        assert_eq!(reply.arg.topics().len(), 2);
    }

    #[test]
    fn test_channel_message_action() {
        let push: ChannelMessage = serde_json::from_str(
            r#"{"arg":{"channel":"books","instId":"BTC-USDT"},"action":"snapshot","data":[{"asks":[],"bids":[]}]}"#,
        )
        .unwrap();
        assert_eq!(push.action.as_deref(), Some("snapshot"));
        assert!(push.data.is_array());
    }
}
