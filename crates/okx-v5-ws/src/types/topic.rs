/*
[INPUT]:  Channel descriptors from callers and `arg` objects from pushes
[OUTPUT]: SubscriptionTopic with a stable canonical key
[POS]:    Data layer - subscription topic model
[UPDATE]: When the venue adds topic fields that identify a stream
*/

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Descriptor of a subscribable data stream.
///
/// Only the fields below identify a stream. Anything else the server echoes
/// back in `arg` (for example `uid`) is dropped on deserialization, so a
/// pushed topic and a caller-built topic compare by the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionTopic {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inst_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inst_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ccy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inst_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algo_id: Option<String>,
}

impl SubscriptionTopic {
    /// Topic with only a channel name (e.g. `status`)
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ..Self::default()
        }
    }

    /// Instrument-scoped public channel (`tickers`, `trades`, `books`, ...)
    pub fn instrument(channel: impl Into<String>, inst_id: impl Into<String>) -> Self {
        Self::new(channel).with_inst_id(inst_id)
    }

    pub fn with_inst_type(mut self, inst_type: impl Into<String>) -> Self {
        self.inst_type = Some(inst_type.into());
        self
    }

    pub fn with_inst_family(mut self, inst_family: impl Into<String>) -> Self {
        self.inst_family = Some(inst_family.into());
        self
    }

    pub fn with_ccy(mut self, ccy: impl Into<String>) -> Self {
        self.ccy = Some(ccy.into());
        self
    }

    pub fn with_inst_id(mut self, inst_id: impl Into<String>) -> Self {
        self.inst_id = Some(inst_id.into());
        self
    }

    pub fn with_algo_id(mut self, algo_id: impl Into<String>) -> Self {
        self.algo_id = Some(algo_id.into());
        self
    }

    /// Projection onto the fixed ordered field list
    fn fields(&self) -> [(&'static str, Option<&str>); 6] {
        [
            ("channel", Some(self.channel.as_str())),
            ("instType", self.inst_type.as_deref()),
            ("instFamily", self.inst_family.as_deref()),
            ("ccy", self.ccy.as_deref()),
            ("instId", self.inst_id.as_deref()),
            ("algoId", self.algo_id.as_deref()),
        ]
    }

    /// Stable textual key used by the subscriber table.
    pub fn canonical_key(&self) -> String {
        let mut map = Map::new();
        for (name, value) in self.fields() {
            if let Some(value) = value {
                map.insert(name.to_string(), Value::String(value.to_string()));
            }
        }
        Value::Object(map).to_string()
    }
}

impl std::fmt::Display for SubscriptionTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_declaration_order() {
        let a: SubscriptionTopic =
            serde_json::from_str(r#"{"instId":"BTC-USDT","channel":"tickers"}"#).unwrap();
        let b = SubscriptionTopic::instrument("tickers", "BTC-USDT");
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn test_key_ignores_unknown_and_null_fields() {
        let pushed: SubscriptionTopic = serde_json::from_str(
            r#"{"channel":"account","ccy":"USDT","uid":"77982378738415879","instId":null}"#,
        )
        .unwrap();
        let local = SubscriptionTopic::new("account").with_ccy("USDT");
        assert_eq!(pushed.canonical_key(), local.canonical_key());
    }

    #[test]
    fn test_key_distinguishes_fields() {
        let spot = SubscriptionTopic::new("orders").with_inst_type("SPOT");
        let swap = SubscriptionTopic::new("orders").with_inst_type("SWAP");
        assert_ne!(spot.canonical_key(), swap.canonical_key());
    }

    #[test]
    fn test_serialize_skips_missing_fields() {
        let topic = SubscriptionTopic::instrument("tickers", "BTC-USDT");
        let json = serde_json::to_value(&topic).unwrap();
        assert_eq!(json, serde_json::json!({"channel": "tickers", "instId": "BTC-USDT"}));
    }
}
