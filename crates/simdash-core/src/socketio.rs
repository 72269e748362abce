//! Socket.IO (Engine.IO v4) text framing for the simulation event stream.
//!
//! Only the subset the dashboard needs is covered: the open handshake,
//! ping/pong, namespace connect and plain JSON events. Binary packets are
//! reported as unsupported instead of being guessed at.

use crate::{Simulation, SimulationId, SimulationStatus, StatusEvent};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "/";
pub const STATUS_EVENT: &str = "estado_simulacion";
pub const CREATED_EVENT: &str = "nueva_simulacion";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown engine packet type '{0}'")]
    UnknownEnginePacket(char),
    #[error("unknown socket packet type '{0}'")]
    UnknownSocketPacket(char),
    #[error("unsupported packet: {0}")]
    Unsupported(&'static str),
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("malformed '{event}' event: {reason}")]
    MalformedEvent { event: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OpenPayload {
    pub sid: String,
    #[serde(default, rename = "pingInterval")]
    pub ping_interval_ms: u64,
    #[serde(default, rename = "pingTimeout")]
    pub ping_timeout_ms: u64,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default, rename = "maxPayload")]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenPayload),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        payload: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        payload: Option<Value>,
    },
}

/// Application-level meaning of one event frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Status(StatusEvent),
    Announced(Simulation),
    Ignored { event: String },
}

pub fn decode_engine_packet(frame: &str) -> Result<EnginePacket, FrameError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(FrameError::Empty)?;
    let body = chars.as_str();
    match kind {
        '0' => serde_json::from_str::<OpenPayload>(body)
            .map(EnginePacket::Open)
            .map_err(|err| FrameError::Decode(err.to_string())),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(body.to_string())),
        '3' => Ok(EnginePacket::Pong(body.to_string())),
        '4' => decode_socket_packet(body).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(FrameError::UnknownEnginePacket(other)),
    }
}

pub fn decode_socket_packet(body: &str) -> Result<SocketPacket, FrameError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(FrameError::Empty)?;
    match kind {
        '0'..='4' => {}
        '5' | '6' => return Err(FrameError::Unsupported("binary socket packet")),
        other => return Err(FrameError::UnknownSocketPacket(other)),
    }
    let mut rest = chars.as_str();

    let namespace = if rest.starts_with('/') {
        match rest.find(',') {
            Some(idx) => {
                let namespace = rest[..idx].to_string();
                rest = &rest[idx + 1..];
                namespace
            }
            None => {
                let namespace = rest.to_string();
                rest = "";
                namespace
            }
        }
    } else {
        DEFAULT_NAMESPACE.to_string()
    };

    let digits = rest
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(rest.len());
    let ack_id = if digits > 0 {
        let parsed = rest[..digits]
            .parse::<u64>()
            .map_err(|err| FrameError::Decode(format!("ack id: {err}")))?;
        rest = &rest[digits..];
        Some(parsed)
    } else {
        None
    };

    let payload = if rest.trim().is_empty() {
        None
    } else {
        Some(
            serde_json::from_str::<Value>(rest)
                .map_err(|err| FrameError::Decode(err.to_string()))?,
        )
    };

    match kind {
        '0' => Ok(SocketPacket::Connect { namespace, payload }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let mut args = match payload {
                Some(Value::Array(items)) => items,
                _ => return Err(FrameError::Decode("event payload must be an array".to_string())),
            };
            if args.is_empty() {
                return Err(FrameError::Decode("event payload is missing a name".to_string()));
            }
            let name = match args.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(FrameError::Decode(format!(
                        "event name must be a string, got {other}"
                    )))
                }
            };
            Ok(SocketPacket::Event {
                namespace,
                ack_id,
                name,
                args,
            })
        }
        '3' => {
            let ack_id =
                ack_id.ok_or_else(|| FrameError::Decode("ack packet without id".to_string()))?;
            let args = match payload {
                Some(Value::Array(items)) => items,
                Some(other) => vec![other],
                None => Vec::new(),
            };
            Ok(SocketPacket::Ack {
                namespace,
                ack_id,
                args,
            })
        }
        _ => Ok(SocketPacket::ConnectError { namespace, payload }),
    }
}

pub fn connect_frame(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE {
        "40".to_string()
    } else {
        format!("40{namespace},")
    }
}

pub fn disconnect_frame(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE {
        "41".to_string()
    } else {
        format!("41{namespace},")
    }
}

pub fn pong_frame(probe: &str) -> String {
    format!("3{probe}")
}

/// Encodes an event frame as the server emits it.
pub fn event_frame(name: &str, payload: &Value) -> String {
    format!("42{}", Value::Array(vec![Value::String(name.to_string()), payload.clone()]))
}

#[derive(Debug, Deserialize)]
struct StatusWire {
    id: SimulationId,
    #[serde(alias = "estado", alias = "p_status")]
    status: SimulationStatus,
    #[serde(default, alias = "progreso", deserialize_with = "lenient_progress")]
    progress: Option<f64>,
}

/// Numbers, numeric strings and quote-wrapped numerals. Anything else drops
/// the progress only; the status still applies.
fn lenient_progress<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(match &val {
        Value::Null => None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_matches(|c: char| c == '\'' || c == '"')
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .ok(),
        _ => None,
    })
}

pub fn stream_message(name: &str, args: &[Value]) -> Result<StreamMessage, FrameError> {
    let malformed = |reason: String| FrameError::MalformedEvent {
        event: name.to_string(),
        reason,
    };
    match name {
        STATUS_EVENT => {
            let first = args
                .first()
                .ok_or_else(|| malformed("missing payload".to_string()))?;
            let wire = StatusWire::deserialize(first).map_err(|err| malformed(err.to_string()))?;
            Ok(StreamMessage::Status(StatusEvent {
                id: wire.id,
                status: wire.status,
                progress: wire
                    .progress
                    .filter(|value| value.is_finite())
                    .map(|value| value.clamp(0.0, 100.0).round() as u8),
            }))
        }
        CREATED_EVENT => {
            let first = args
                .first()
                .ok_or_else(|| malformed("missing payload".to_string()))?;
            Simulation::deserialize(first)
                .map(StreamMessage::Announced)
                .map_err(|err| malformed(err.to_string()))
        }
        other => Ok(StreamMessage::Ignored {
            event: other.to_string(),
        }),
    }
}
