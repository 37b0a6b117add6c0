//! Realtime change-feed wire protocol.
//!
//! Phoenix-channel JSON frames: one `phx_join` per table carrying a
//! `postgres_changes` filter, `phx_reply` acknowledgements, and
//! `postgres_changes` events with the changed row.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Upstream tables the bridge follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Positions,
    PriceHistory,
    AprHistory,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positions => "positions",
            Self::PriceHistory => "price_history",
            Self::AprHistory => "apr_history",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "positions" => Some(Self::Positions),
            "price_history" => Some(Self::PriceHistory),
            "apr_history" => Some(Self::AprHistory),
            _ => None,
        }
    }

    /// Channel topic for this table, e.g. `realtime:public:positions`.
    pub fn topic(self, schema: &str) -> String {
        format!("realtime:{schema}:{}", self.as_str())
    }

    /// Table named by a `realtime:<schema>:<table>` topic.
    pub fn from_topic(topic: &str) -> Option<Self> {
        topic
            .strip_prefix("realtime:")
            .and_then(|rest| rest.rsplit(':').next())
            .and_then(Self::parse)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A row-level change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub table: Table,
    pub kind: ChangeKind,
    /// New row; `None` for deletes.
    pub record: Option<Value>,
    /// Previous row, when the upstream replicates it.
    pub old_record: Option<Value>,
    pub commit_timestamp: Option<String>,
}

impl ChangeNotification {
    /// Extract from a `postgres_changes` payload.
    ///
    /// Falls back to the topic for the table name.
    pub fn from_payload(payload: &Value, topic: &str) -> Option<Self> {
        let data = payload.get("data").unwrap_or(payload);
        let table = data
            .get("table")
            .and_then(Value::as_str)
            .and_then(Table::parse)
            .or_else(|| Table::from_topic(topic))?;
        let kind = data
            .get("type")
            .or_else(|| data.get("eventType"))
            .and_then(Value::as_str)
            .and_then(ChangeKind::parse)?;
        let non_null = |key: &str| data.get(key).filter(|v| !v.is_null()).cloned();
        Some(Self {
            table,
            kind,
            record: non_null("record").or_else(|| non_null("new")),
            old_record: non_null("old_record").or_else(|| non_null("old")),
            commit_timestamp: data
                .get("commit_timestamp")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// A Phoenix channel frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixFrame {
    /// `phx_join` subscribing to every change on one table.
    pub fn join(table: Table, schema: &str, access_token: &str, reference: u64) -> Self {
        let reference = reference.to_string();
        Self {
            topic: table.topic(schema),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [
                        { "event": "*", "schema": schema, "table": table.as_str() }
                    ]
                },
                "access_token": access_token
            }),
            reference: Some(reference.clone()),
            join_ref: Some(reference),
        }
    }

    /// Socket-level keepalive on the `phoenix` topic.
    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    /// Reply status for `phx_reply` frames.
    pub fn reply_status(&self) -> Option<&str> {
        (self.event == "phx_reply")
            .then(|| self.payload.get("status").and_then(Value::as_str))
            .flatten()
    }
}
