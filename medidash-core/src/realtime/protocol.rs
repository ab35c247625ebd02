//! Frame types for the hosted Realtime websocket.
//!
//! The server speaks the Phoenix channel protocol: JSON frames of the form
//! `{"topic", "event", "payload", "ref"}`. A channel joins a topic with a
//! `postgres_changes` filter and then receives one frame per row change.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::{ChangeKind, ChannelSignal};

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const PHOENIX_TOPIC: &str = "phoenix";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
}

/// What an inbound frame means for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Reply to a join or leave we sent, matched by `msg_ref`.
    Reply { msg_ref: String, ok: bool },
    Signal(ChannelSignal),
    Change { table: String, kind: ChangeKind },
    Ignored,
}

/// Topic name for one channel; the id keeps channels on one table apart.
pub fn channel_topic(table: &str, channel_id: u64) -> String {
    format!("realtime:{}-{}", table, channel_id)
}

impl Frame {
    pub fn join(topic: &str, schema: &str, table: &str, msg_ref: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_JOIN.to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [
                        { "event": "*", "schema": schema, "table": table }
                    ]
                }
            }),
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    pub fn leave(topic: &str, msg_ref: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    pub fn heartbeat(msg_ref: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn classify(&self) -> Inbound {
        match self.event.as_str() {
            EVENT_REPLY => match &self.msg_ref {
                Some(msg_ref) => Inbound::Reply {
                    msg_ref: msg_ref.clone(),
                    ok: self.payload.get("status").and_then(Value::as_str) == Some("ok"),
                },
                None => Inbound::Ignored,
            },
            EVENT_ERROR => Inbound::Signal(ChannelSignal::ChannelError),
            EVENT_CLOSE => Inbound::Signal(ChannelSignal::Closed),
            EVENT_POSTGRES_CHANGES => {
                let data = self.payload.get("data").unwrap_or(&self.payload);
                change_from(data)
            }
            // Older servers send the change type as the event name.
            "INSERT" | "UPDATE" | "DELETE" => change_from(&self.payload),
            "system" => {
                if self.payload.get("status").and_then(Value::as_str) == Some("error") {
                    Inbound::Signal(ChannelSignal::ChannelError)
                } else {
                    Inbound::Ignored
                }
            }
            _ => Inbound::Ignored,
        }
    }
}

fn change_from(data: &Value) -> Inbound {
    let kind = data
        .get("type")
        .or_else(|| data.get("eventType"))
        .and_then(Value::as_str)
        .and_then(|t| t.parse::<ChangeKind>().ok());
    let table = data.get("table").and_then(Value::as_str);

    match (kind, table) {
        (Some(kind), Some(table)) => Inbound::Change {
            table: table.to_string(),
            kind,
        },
        _ => Inbound::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_topic() {
        assert_eq!(channel_topic("ambulances", 7), "realtime:ambulances-7");
    }

    #[test]
    fn test_join_frame_shape() {
        let frame = Frame::join("realtime:beds-1", "public", "beds", "3");
        let encoded: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();

        assert_eq!(encoded["event"], "phx_join");
        assert_eq!(encoded["ref"], "3");
        assert_eq!(
            encoded["payload"]["config"]["postgres_changes"][0]["table"],
            "beds"
        );
        assert_eq!(
            encoded["payload"]["config"]["postgres_changes"][0]["event"],
            "*"
        );
    }

    #[test]
    fn test_classify_reply() {
        let frame = Frame::decode(
            r#"{"topic":"realtime:beds-1","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"3"}"#,
        )
        .unwrap();
        assert_eq!(
            frame.classify(),
            Inbound::Reply {
                msg_ref: "3".into(),
                ok: true
            }
        );

        let frame = Frame::decode(
            r#"{"topic":"realtime:beds-1","event":"phx_reply","payload":{"status":"error","response":{"reason":"unauthorized"}},"ref":"4"}"#,
        )
        .unwrap();
        assert_eq!(
            frame.classify(),
            Inbound::Reply {
                msg_ref: "4".into(),
                ok: false
            }
        );
    }

    #[test]
    fn test_classify_postgres_change() {
        let frame = Frame::decode(
            r#"{"topic":"realtime:ambulances-2","event":"postgres_changes","payload":{"data":{"type":"INSERT","table":"ambulances","schema":"public","record":{"id":"A2"}},"ids":[1]},"ref":null}"#,
        )
        .unwrap();
        assert_eq!(
            frame.classify(),
            Inbound::Change {
                table: "ambulances".into(),
                kind: ChangeKind::Insert
            }
        );
    }

    #[test]
    fn test_classify_legacy_change() {
        let frame = Frame::decode(
            r#"{"topic":"realtime:public:beds","event":"DELETE","payload":{"type":"DELETE","table":"beds","old_record":{"id":"B1"}},"ref":null}"#,
        )
        .unwrap();
        assert_eq!(
            frame.classify(),
            Inbound::Change {
                table: "beds".into(),
                kind: ChangeKind::Delete
            }
        );
    }

    #[test]
    fn test_classify_errors_and_unknowns() {
        let error = Frame::decode(r#"{"topic":"t","event":"phx_error","payload":{}}"#).unwrap();
        assert_eq!(error.classify(), Inbound::Signal(ChannelSignal::ChannelError));

        let close = Frame::decode(r#"{"topic":"t","event":"phx_close","payload":{}}"#).unwrap();
        assert_eq!(close.classify(), Inbound::Signal(ChannelSignal::Closed));

        let presence =
            Frame::decode(r#"{"topic":"t","event":"presence_state","payload":{}}"#).unwrap();
        assert_eq!(presence.classify(), Inbound::Ignored);

        let broken =
            Frame::decode(r#"{"topic":"t","event":"postgres_changes","payload":{"data":{}}}"#)
                .unwrap();
        assert_eq!(broken.classify(), Inbound::Ignored);
    }
}
