#![forbid(unsafe_code)]

// Link protocol - Message types for the ground-station WebSocket

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

/// Path of the upgraded link endpoint, appended to the WebSocket base URL.
pub const CONNECT_PATH: &str = "/api/v1/ground-station-link/connect";

/// Which identification message opens the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum HandshakeKind {
    /// `{"type":"connect"}`, sent by the load test
    #[default]
    Connect,
    /// `{"type":"hello"}`, sent by a real ground station
    Hello,
}

/// Client-to-Server messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello { token: String },
    Connect { token: String },
}

impl ClientMessage {
    pub fn identify(kind: HandshakeKind, token: &str) -> Self {
        let token = token.to_string();
        match kind {
            HandshakeKind::Connect => ClientMessage::Connect { token },
            HandshakeKind::Hello => ClientMessage::Hello { token },
        }
    }
}

/// First frame the server sends back after a valid identification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Confirmation {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// Server-to-Client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A flight plan was scheduled for this station. The server follows it with
    /// one more frame holding the command script.
    ScheduleTransmission {
        request_id: String,
        #[serde(default)]
        frames: u32,
        data: ScheduleTransmissionData,
    },
    /// Any message type this client does not act on
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTransmissionData {
    #[serde(default)]
    pub satellite: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub flight_plan_id: i64,
    #[serde(default)]
    pub satellite_id: i64,
    #[serde(default)]
    pub ground_station_id: i64,
}

/// How a link ended from the reader's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseKind {
    /// Peer closed with normal-closure or going-away, or the close handshake
    /// had already completed.
    Graceful(Option<u16>),
    /// Any other close code, a reset, or an I/O failure.
    Abnormal(String),
}

impl CloseKind {
    pub fn from_frame(frame: Option<&CloseFrame>) -> Self {
        match frame {
            Some(f) if matches!(f.code, CloseCode::Normal | CloseCode::Away) => {
                CloseKind::Graceful(Some(u16::from(f.code)))
            }
            Some(f) => CloseKind::Abnormal(format!(
                "closed with code {} ({})",
                u16::from(f.code),
                f.reason.as_str()
            )),
            None => CloseKind::Abnormal("closed without a status code".to_string()),
        }
    }

    pub fn from_error(err: &tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                CloseKind::Graceful(None)
            }
            other => CloseKind::Abnormal(other.to_string()),
        }
    }

    pub fn is_graceful(&self) -> bool {
        matches!(self, CloseKind::Graceful(_))
    }
}
