//! Text packet codec for the tracking transport.
//!
//! The backend speaks Socket.IO (protocol v5) over Engine.IO (protocol v4)
//! WebSocket frames. Only text packets are supported; binary attachments are
//! rejected since no courier event carries them.
//!
//! ```text
//! engine:  <type>[data]                       e.g. "2" (ping), "4..." (message)
//! socket:  <type>[/namespace,][ack id][json]  e.g. "2/tracking,[\"joinDriver\",{...}]"
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ErrorInfo;

pub const ENGINE_PROTOCOL_VERSION: u8 = 4;

/// Contents of the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }

    pub fn decode(text: &str) -> Result<Self, ErrorInfo> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ErrorInfo::new("empty_packet", "engine packet is empty"))?;
        let rest = chars.as_str();
        match kind {
            '0' => serde_json::from_str(rest).map(EnginePacket::Open).map_err(|err| {
                ErrorInfo::new("invalid_handshake", format!("open packet is invalid: {}", err))
            }),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(rest.to_string())),
            '3' => Ok(EnginePacket::Pong(rest.to_string())),
            '4' => Ok(EnginePacket::Message(rest.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(ErrorInfo::new(
                "unknown_packet",
                format!("unknown engine packet type: {}", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        payload: Value,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        data: Value,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    pub fn event(namespace: &str, name: &str, payload: Value) -> Self {
        SocketPacket::Event {
            namespace: namespace.to_string(),
            ack_id: None,
            name: name.to_string(),
            payload,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    pub fn encode(&self) -> String {
        let (kind, namespace, ack_id, data) = match self {
            SocketPacket::Connect { namespace, data } => ('0', namespace, None, data.clone()),
            SocketPacket::Disconnect { namespace } => ('1', namespace, None, None),
            SocketPacket::Event {
                namespace,
                ack_id,
                name,
                payload,
            } => {
                let mut args = vec![Value::String(name.clone())];
                if !payload.is_null() {
                    args.push(payload.clone());
                }
                ('2', namespace, *ack_id, Some(Value::Array(args)))
            }
            SocketPacket::Ack {
                namespace,
                ack_id,
                data,
            } => ('3', namespace, Some(*ack_id), Some(data.clone())),
            SocketPacket::ConnectError { namespace, data } => ('4', namespace, None, data.clone()),
        };

        let mut out = String::new();
        out.push(kind);
        if !namespace.is_empty() && namespace != "/" {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(id) = ack_id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = data {
            out.push_str(&data.to_string());
        }
        out
    }

    pub fn decode(text: &str) -> Result<Self, ErrorInfo> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ErrorInfo::new("empty_packet", "socket packet is empty"))?;
        let mut rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(ErrorInfo::new(
                "unsupported_packet",
                "binary socket packets are not supported",
            ));
        }

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(index) => {
                    let namespace = rest[..index].to_string();
                    rest = &rest[index + 1..];
                    namespace
                }
                None => {
                    let namespace = rest.to_string();
                    rest = "";
                    namespace
                }
            }
        } else {
            "/".to_string()
        };

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let ack_id = if digits > 0 {
            let id = rest[..digits].parse::<u64>().map_err(|err| {
                ErrorInfo::new("invalid_ack_id", format!("ack id is invalid: {}", err))
            })?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(rest).map_err(|err| {
                ErrorInfo::new("invalid_json", format!("socket packet data is invalid: {}", err))
            })?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace, data }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let mut args = match data {
                    Some(Value::Array(args)) => args.into_iter(),
                    _ => {
                        return Err(ErrorInfo::new(
                            "invalid_event",
                            "event data must be a non-empty array",
                        ))
                    }
                };
                let name = match args.next() {
                    Some(Value::String(name)) => name,
                    _ => {
                        return Err(ErrorInfo::new(
                            "invalid_event",
                            "event name must be a string",
                        ))
                    }
                };
                Ok(SocketPacket::Event {
                    namespace,
                    ack_id,
                    name,
                    payload: args.next().unwrap_or(Value::Null),
                })
            }
            '3' => {
                let ack_id = ack_id
                    .ok_or_else(|| ErrorInfo::new("invalid_ack_id", "ack packet needs an id"))?;
                Ok(SocketPacket::Ack {
                    namespace,
                    ack_id,
                    data: data.unwrap_or(Value::Array(Vec::new())),
                })
            }
            '4' => Ok(SocketPacket::ConnectError { namespace, data }),
            other => Err(ErrorInfo::new(
                "unknown_packet",
                format!("unknown socket packet type: {}", other),
            )),
        }
    }

    /// Wraps the packet in an Engine.IO message, ready to send as a text frame.
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}
