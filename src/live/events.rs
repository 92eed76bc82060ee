// ABOUTME: Parses inbound WebSocket text frames into typed stream events
// ABOUTME: Unknown event types are preserved so the dispatcher can log them

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

/// Vote totals pushed by the vote stream.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteSummary {
    /// Hex map identifier, as used for store keys.
    pub map_id: String,
    pub upvotes: u32,
    pub downvotes: u32,
    pub hash: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    MapUpdate(Value),
    MapDelete(String),
    Vote(VoteSummary),
    /// Any other `type`; carries the type name.
    Unhandled(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    msg: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVote {
    map_id: Value,
    upvotes: u32,
    downvotes: u32,
    hash: Option<String>,
    score: Option<f64>,
}

pub fn parse_frame(text: &str) -> Result<StreamEvent> {
    let envelope: Envelope = serde_json::from_str(text).context("Frame is not a JSON event")?;

    match envelope.kind.as_str() {
        "MAP_UPDATE" => Ok(StreamEvent::MapUpdate(envelope.msg)),
        "MAP_DELETE" => {
            let id = envelope
                .msg
                .as_str()
                .context("MAP_DELETE message is not a map id")?;
            Ok(StreamEvent::MapDelete(id.to_string()))
        }
        "VOTE" => {
            let vote: RawVote =
                serde_json::from_value(envelope.msg).context("Malformed VOTE message")?;
            Ok(StreamEvent::Vote(VoteSummary {
                map_id: vote_map_id(&vote.map_id)?,
                upvotes: vote.upvotes,
                downvotes: vote.downvotes,
                hash: vote.hash,
                score: vote.score,
            }))
        }
        _ => Ok(StreamEvent::Unhandled(envelope.kind)),
    }
}

/// The vote stream sends the numeric key; the store is keyed by its hex form.
fn vote_map_id(value: &Value) -> Result<String> {
    match value {
        Value::Number(n) => {
            let key = n.as_u64().context("VOTE mapId is not an unsigned integer")?;
            Ok(format!("{:x}", key))
        }
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        other => anyhow::bail!("VOTE mapId has unexpected value {}", other),
    }
}
