//! Decoding of raw server-pushed frames into typed events.
//!
//! The stream is best-effort: anything that does not decode, or that lacks the
//! fields its kind requires, is dropped rather than reported.

use serde_json::Value;

/// One undecoded frame as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Optional SSE `event:` name.
    pub event: Option<String>,
    /// Joined `data:` lines.
    pub data: String,
}

impl RawFrame {
    /// Creates a frame with only a data payload.
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }
}

/// Normalized event carried by a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Backend accepted the request and assigned a run id.
    Started { run_id: Option<String> },
    /// Incremental answer text.
    AnswerToken { text: String },
    /// A tool call began.
    ToolStart { tool: Option<String> },
    /// A tool call finished.
    ToolEnd {
        ok: Option<bool>,
        error: Option<String>,
        rows_count: Option<u64>,
    },
    /// Rows or documents were retrieved from a table.
    Retrieve {
        table: Option<String>,
        rows_count: Option<u64>,
        docs_count: Option<u64>,
    },
    /// Trace output; reasoning channels are identified by `source`.
    TraceToken { text: String, source: Option<String> },
    /// Complete answer emitted at the end of an agent run.
    Final { answer: String },
    /// Explicit failure reported by the backend.
    Error { message: String },
    /// End of stream marker.
    Done,
}

impl ServerEvent {
    /// Wire name of the event kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "start",
            Self::AnswerToken { .. } => "answer_token",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::Retrieve { .. } => "retrieve",
            Self::TraceToken { .. } => "trace_token",
            Self::Final { .. } => "final",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }
}

/// A decoded frame together with the agent that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub agent_id: Option<String>,
    pub event: ServerEvent,
}

#[derive(serde::Deserialize)]
struct WireFrame {
    #[serde(rename = "type", alias = "kind", default)]
    kind: Option<String>,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Decodes a raw frame. Returns `None` for anything that should be ignored.
pub fn parse_frame(frame: &RawFrame) -> Option<ParsedFrame> {
    let data = frame.data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    let wire: WireFrame = serde_json::from_str(data).ok()?;
    let kind = wire
        .kind
        .filter(|k| !k.trim().is_empty())
        .or_else(|| frame.event.clone())?;
    let payload = &wire.data;

    let event = match kind.trim() {
        "start" => ServerEvent::Started {
            run_id: wire.run_id.filter(|id| !id.is_empty()),
        },
        "answer_token" => ServerEvent::AnswerToken {
            text: str_field(payload, "text").filter(|t| !t.is_empty())?,
        },
        "tool_start" => ServerEvent::ToolStart {
            tool: non_blank(str_field(payload, "tool")),
        },
        "tool_end" => ServerEvent::ToolEnd {
            ok: payload.get("ok").and_then(Value::as_bool),
            error: non_blank(str_field(payload, "error")),
            rows_count: count_field(payload, "rows_count"),
        },
        "retrieve" => ServerEvent::Retrieve {
            table: non_blank(str_field(payload, "table")),
            rows_count: count_field(payload, "rows_count"),
            docs_count: count_field(payload, "docs_count"),
        },
        "trace_token" => ServerEvent::TraceToken {
            text: str_field(payload, "text")?,
            source: non_blank(str_field(payload, "source")),
        },
        "final" => ServerEvent::Final {
            answer: str_field(payload, "answer")?,
        },
        "error" => ServerEvent::Error {
            message: str_field(payload, "message")?,
        },
        "done" => ServerEvent::Done,
        _ => return None,
    };

    Some(ParsedFrame {
        agent_id: wire.agent_id.filter(|id| !id.is_empty()),
        event,
    })
}

fn str_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(ToOwned::to_owned)
}

fn count_field(payload: &Value, key: &str) -> Option<u64> {
    payload.get(key).and_then(Value::as_u64)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Option<ServerEvent> {
        parse_frame(&RawFrame::data(json)).map(|f| f.event)
    }

    #[test]
    fn decodes_backend_answer_token() {
        let frame = RawFrame::data(
            r#"{"type":"answer_token","run_id":"r1","agent_id":"manager","data":{"text":"Hi"}}"#,
        );
        let parsed = parse_frame(&frame).expect("parsed");
        assert_eq!(parsed.agent_id.as_deref(), Some("manager"));
        assert_eq!(parsed.event, ServerEvent::AnswerToken { text: "Hi".into() });
    }

    #[test]
    fn kind_alias_and_sse_event_name_are_accepted() {
        assert_eq!(parse(r#"{"kind":"done"}"#), Some(ServerEvent::Done));
        let frame = RawFrame {
            event: Some("done".into()),
            data: "{}".into(),
        };
        assert_eq!(parse_frame(&frame).map(|f| f.event), Some(ServerEvent::Done));
    }

    #[test]
    fn malformed_and_unknown_frames_are_ignored() {
        assert_eq!(parse("not json"), None);
        assert_eq!(parse(r#"{"type":"unknown","data":{}}"#), None);
        assert_eq!(parse("[DONE]"), None);
        assert_eq!(parse(r#"{"data":{"text":"no kind"}}"#), None);
    }

    #[test]
    fn missing_required_fields_are_ignored() {
        assert_eq!(parse(r#"{"type":"answer_token","data":{}}"#), None);
        assert_eq!(parse(r#"{"type":"answer_token","data":{"text":""}}"#), None);
        assert_eq!(parse(r#"{"type":"final","data":{"answer":42}}"#), None);
        assert_eq!(parse(r#"{"type":"error","data":"boom"}"#), None);
    }

    #[test]
    fn optional_fields_fall_back_to_none() {
        assert_eq!(
            parse(r#"{"type":"tool_start","data":{"tool":" "}}"#),
            Some(ServerEvent::ToolStart { tool: None })
        );
        assert_eq!(
            parse(r#"{"type":"retrieve","data":{"table":"wko_companies","rows_count":"7"}}"#),
            Some(ServerEvent::Retrieve {
                table: Some("wko_companies".into()),
                rows_count: None,
                docs_count: None,
            })
        );
    }

    #[test]
    fn start_frame_keeps_run_id() {
        assert_eq!(
            parse(r#"{"type":"start","run_id":"abc","data":{}}"#),
            Some(ServerEvent::Started {
                run_id: Some("abc".into())
            })
        );
    }
}
