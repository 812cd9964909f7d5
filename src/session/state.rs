#![forbid(unsafe_code)]

// Session state machine - pure transitions, no I/O

use crate::signaling::protocol::CloseKind;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Init,
    Authenticating,
    Connecting,
    AwaitingConfirmation,
    Active,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Next step of the handshake sequence, `None` once the link is up.
    fn handshake_successor(self) -> Option<SessionState> {
        match self {
            SessionState::Init => Some(SessionState::Authenticating),
            SessionState::Authenticating => Some(SessionState::Connecting),
            SessionState::Connecting => Some(SessionState::AwaitingConfirmation),
            SessionState::AwaitingConfirmation => Some(SessionState::Active),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Init => "init",
            SessionState::Authenticating => "authenticating",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingConfirmation => "awaiting-confirmation",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A data frame forwarded by the reader task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Inbound(InboundFrame),
    /// The reader saw the link end. Always its last event.
    PeerClosed(CloseKind),
    Stop,
    KeepaliveDue,
    /// Our close frame went unanswered for too long.
    CloseTimedOut,
}

/// What the session loop must do in response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    Continue,
    CountMessage(InboundFrame),
    SendPing,
    SendClose,
    Finish { error: bool },
}

#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    messages_received: u64,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Init,
            messages_received: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    /// Moves one step along `Init → Authenticating → Connecting →
    /// AwaitingConfirmation → Active`. Other states are left unchanged.
    pub fn advance(&mut self) -> SessionState {
        if let Some(next) = self.state.handshake_successor() {
            self.state = next;
        }
        self.state
    }

    /// Absorbing failure. Terminal states stay as they are.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Failed;
        }
    }

    /// A ping or close frame could not be written.
    pub fn on_send_failed(&mut self) -> Reaction {
        self.fail();
        Reaction::Finish { error: true }
    }

    pub fn on_event(&mut self, event: SessionEvent) -> Reaction {
        match (self.state, event) {
            (SessionState::Active | SessionState::Closing, SessionEvent::Inbound(frame)) => {
                self.messages_received += 1;
                Reaction::CountMessage(frame)
            }
            (SessionState::Active, SessionEvent::PeerClosed(kind)) => {
                self.state = SessionState::Closed;
                Reaction::Finish {
                    error: !kind.is_graceful(),
                }
            }
            // Our close is already out, so any way the peer ends the link is orderly
            (SessionState::Closing, SessionEvent::PeerClosed(_)) => {
                self.state = SessionState::Closed;
                Reaction::Finish { error: false }
            }
            (SessionState::Active, SessionEvent::Stop) => {
                self.state = SessionState::Closing;
                Reaction::SendClose
            }
            (SessionState::Active, SessionEvent::KeepaliveDue) => Reaction::SendPing,
            (SessionState::Closing, SessionEvent::CloseTimedOut) => {
                self.state = SessionState::Closed;
                Reaction::Finish { error: false }
            }
            (state, _) if state.is_terminal() => Reaction::Finish { error: false },
            _ => Reaction::Continue,
        }
    }
}
