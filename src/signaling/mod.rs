#![forbid(unsafe_code)]

// Signaling module - client side of the ground-station WebSocket link

pub mod protocol;

use crate::control_plane::AccessToken;
use crate::error::{LinkError, LinkResult};
use futures_util::{Sink, SinkExt, StreamExt};
use protocol::{ClientMessage, Confirmation, HandshakeKind, CONNECT_PATH};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = futures_util::stream::SplitSink<WsStream, Message>;
pub type WsSource = futures_util::stream::SplitStream<WsStream>;

/// Longest slice of a frame that ends up in a log line.
pub const LOG_PREVIEW_CHARS: usize = 100;

/// Full link endpoint for a WebSocket base URL such as `ws://localhost:5111`.
pub fn connect_url(ws_base: &str) -> String {
    format!("{}{}", ws_base.trim_end_matches('/'), CONNECT_PATH)
}

/// Opens the upgraded connection. No frames are exchanged yet.
pub async fn connect(url: &str) -> LinkResult<WsStream> {
    let (ws_stream, _) = connect_async(url).await?;
    Ok(ws_stream)
}

/// Sends the identification message and waits for exactly one confirmation frame.
///
/// Control frames arriving first are skipped. A close frame or end of stream here
/// means the server refused the link.
pub async fn identify(ws: &mut WsStream, kind: HandshakeKind, token: &AccessToken) -> LinkResult<String> {
    send_message(ws, &ClientMessage::identify(kind, token.as_str())).await?;

    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(describe_confirmation(text.as_str())),
            Some(Ok(Message::Binary(data))) => {
                return Ok(format!("<{} binary bytes>", data.len()));
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|f| format!("code {} ({})", u16::from(f.code), f.reason.as_str()))
                    .unwrap_or_else(|| "no status".to_string());
                return Err(LinkError::Protocol(format!(
                    "server closed the link before confirming: {}",
                    reason
                )));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(LinkError::Protocol(
                    "connection ended before confirmation".to_string(),
                ))
            }
        }
    }
}

fn describe_confirmation(text: &str) -> String {
    match serde_json::from_str::<Confirmation>(text) {
        Ok(c) if !c.message.is_empty() => match c.id {
            Some(id) => format!("{} (station {})", c.message, id),
            None => c.message,
        },
        _ => truncate_for_log(text, LOG_PREVIEW_CHARS),
    }
}

pub async fn send_message<S>(write: &mut S, msg: &ClientMessage) -> LinkResult<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(msg)?;
    write.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Starts the close handshake with a normal-closure code.
pub async fn send_close<S>(write: &mut S) -> LinkResult<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    };
    write.send(Message::Close(Some(frame))).await?;
    Ok(())
}

/// Cuts `s` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_for_log(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
