#![forbid(unsafe_code)]

// Reader task - the only place a session reads from its transport

use super::state::{InboundFrame, SessionEvent};
use crate::signaling::protocol::CloseKind;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};

/// Capacity of the reader-to-session channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Handle to a running reader. Aborts the task when dropped, so the reader
/// never outlives its session even if the session task itself is aborted.
pub struct ReaderTask {
    handle: JoinHandle<()>,
}

impl Drop for ReaderTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns the reader over `source` and returns the receiving end of its events.
pub fn spawn<S>(source: S) -> (ReaderTask, mpsc::Receiver<SessionEvent>)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let handle = tokio::spawn(read_loop(source, tx));
    (ReaderTask { handle }, rx)
}

/// Forwards data frames in arrival order, then exactly one `PeerClosed`.
/// Ping and pong frames are answered by tungstenite and not forwarded.
async fn read_loop<S>(mut source: S, tx: mpsc::Sender<SessionEvent>)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let closed = loop {
        let event = match source.next().await {
            Some(Ok(Message::Text(text))) => SessionEvent::Inbound(InboundFrame::Text(text.as_str().to_string())),
            Some(Ok(Message::Binary(data))) => SessionEvent::Inbound(InboundFrame::Binary(data.len())),
            Some(Ok(Message::Close(frame))) => break CloseKind::from_frame(frame.as_ref()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => break CloseKind::from_error(&e),
            None => break CloseKind::Graceful(None),
        };
        if tx.send(event).await.is_err() {
            // Session is gone
            return;
        }
    };
    let _ = tx.send(SessionEvent::PeerClosed(closed)).await;
}
