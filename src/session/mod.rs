#![forbid(unsafe_code)]

// Session module - one simulated ground station from token exchange to close

pub mod reader;
pub mod state;

pub use state::{InboundFrame, Reaction, SessionEvent, SessionMachine, SessionState};

use crate::control_plane::{AccessToken, ControlPlaneClient, Identity};
use crate::error::{LinkError, LinkResult};
use crate::metrics::FleetMetrics;
use crate::signaling::protocol::{CloseKind, HandshakeKind, ServerMessage};
use crate::signaling::{self, WsSink, WsStream, LOG_PREVIEW_CHARS};
use crate::stop::StopListener;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
/// How long a session waits for the peer to answer its close frame.
pub const CLOSE_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Settings shared by every session of a fleet.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Full link endpoint, see [`signaling::connect_url`]
    pub connect_url: String,
    pub handshake: HandshakeKind,
    pub keepalive_interval: Duration,
    pub handshake_timeout: Duration,
}

impl SessionConfig {
    pub fn new(ws_base: &str) -> Self {
        Self {
            connect_url: signaling::connect_url(ws_base),
            handshake: HandshakeKind::default(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// Final word on one session, collected by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub client_id: usize,
    pub name: String,
    pub state: SessionState,
    pub messages_received: u64,
}

/// One ground station's link. Counters it touches are the fleet's; everything
/// else is private to the task running it.
pub struct Session {
    client_id: usize,
    label: String,
    identity: Identity,
    control_plane: ControlPlaneClient,
    config: SessionConfig,
    metrics: FleetMetrics,
    stop: StopListener,
    machine: SessionMachine,
    inbound: InboundLog,
}

impl Session {
    pub fn new(
        client_id: usize,
        identity: Identity,
        control_plane: ControlPlaneClient,
        config: SessionConfig,
        metrics: FleetMetrics,
        stop: StopListener,
    ) -> Self {
        let label = format!("client-{} ({})", client_id, identity.name);
        Self {
            client_id,
            label,
            identity,
            control_plane,
            config,
            metrics,
            stop,
            machine: SessionMachine::new(),
            inbound: InboundLog::default(),
        }
    }

    /// Runs the session to `Closed` or `Failed`. Never returns an error: failures
    /// are logged and counted instead.
    pub async fn run(mut self) -> SessionReport {
        match self.establish().await {
            Ok((ws, confirmation)) => {
                info!("{}: link confirmed: {}", self.label, confirmation);
                self.run_active(ws).await;
            }
            Err(e) => {
                error!("{}: {} failed: {}", self.label, self.machine.state(), e);
                self.machine.fail();
                self.metrics.record_failure();
            }
        }

        info!(
            "{}: session {} after {} messages",
            self.label,
            self.machine.state(),
            self.machine.messages_received()
        );
        SessionReport {
            client_id: self.client_id,
            name: self.identity.name.clone(),
            state: self.machine.state(),
            messages_received: self.machine.messages_received(),
        }
    }

    async fn establish(&mut self) -> LinkResult<(WsStream, String)> {
        self.machine.advance();
        let token = self
            .control_plane
            .exchange_token(&self.identity.application_id, &self.identity.api_key)
            .await?;
        debug!("{}: obtained access token", self.label);

        let handshake_timeout = self.config.handshake_timeout;
        timeout(handshake_timeout, self.handshake(&token))
            .await
            .map_err(|_| LinkError::Timeout(format!("handshake did not finish within {:?}", handshake_timeout)))?
    }

    async fn handshake(&mut self, token: &AccessToken) -> LinkResult<(WsStream, String)> {
        self.machine.advance();
        let mut ws = signaling::connect(&self.config.connect_url).await?;
        debug!("{}: connected to {}", self.label, self.config.connect_url);

        self.machine.advance();
        let confirmation = signaling::identify(&mut ws, self.config.handshake, token).await?;
        Ok((ws, confirmation))
    }

    async fn run_active(&mut self, ws: WsStream) {
        self.machine.advance();
        self.metrics.record_established();
        let _active = self.metrics.active_guard();

        let (mut write, read) = ws.split();
        let (_reader, mut events) = reader::spawn(read);

        let period = self.config.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut close_deadline: Option<Instant> = None;

        loop {
            let state = self.machine.state();
            let event = tokio::select! {
                event = events.recv() => event.unwrap_or_else(|| {
                    SessionEvent::PeerClosed(CloseKind::Abnormal("reader stopped".to_string()))
                }),
                _ = self.stop.stopped(), if state == SessionState::Active => SessionEvent::Stop,
                _ = keepalive.tick(), if state == SessionState::Active => SessionEvent::KeepaliveDue,
                _ = sleep_until(close_deadline.unwrap_or_else(Instant::now)), if close_deadline.is_some() => {
                    SessionEvent::CloseTimedOut
                }
            };

            match self.machine.on_event(event) {
                Reaction::Continue => {}
                Reaction::CountMessage(frame) => {
                    self.metrics.record_message();
                    self.inbound.log(&self.label, &frame);
                }
                Reaction::SendPing => {
                    if let Err(e) = write.send(Message::Ping(Default::default())).await {
                        warn!("{}: keepalive ping failed: {}", self.label, e);
                        let reaction = self.machine.on_send_failed();
                        self.finish(reaction);
                        break;
                    }
                    debug!("{}: sent keepalive ping", self.label);
                }
                Reaction::SendClose => {
                    info!("{}: stop received, closing link", self.label);
                    if let Err(reaction) = self.send_close(&mut write).await {
                        self.finish(reaction);
                        break;
                    }
                    close_deadline = Some(Instant::now() + CLOSE_REPLY_TIMEOUT);
                }
                reaction @ Reaction::Finish { .. } => {
                    self.finish(reaction);
                    break;
                }
            }
        }
        // `_reader` and `_active` drop here: reader aborted, active slot released.
    }

    /// A close that fails because the peer already closed is not an error;
    /// the reader will report the peer's close.
    async fn send_close(&mut self, write: &mut WsSink) -> Result<(), Reaction> {
        match signaling::send_close(write).await {
            Ok(()) => Ok(()),
            Err(LinkError::Transport(ref e)) if CloseKind::from_error(e).is_graceful() => Ok(()),
            Err(e) => {
                warn!("{}: close frame failed: {}", self.label, e);
                Err(self.machine.on_send_failed())
            }
        }
    }

    fn finish(&self, reaction: Reaction) {
        if let Reaction::Finish { error: true } = reaction {
            self.metrics.record_error();
            warn!("{}: link ended abnormally", self.label);
        }
    }
}

/// Logs inbound frames, remembering when the next frame is a command script.
#[derive(Default)]
struct InboundLog {
    expect_script: bool,
}

impl InboundLog {
    fn log(&mut self, label: &str, frame: &InboundFrame) {
        let text = match frame {
            InboundFrame::Binary(len) => {
                debug!("{}: received {} binary bytes", label, len);
                return;
            }
            InboundFrame::Text(text) => text,
        };

        if self.expect_script {
            self.expect_script = false;
            info!(
                "{}: received command script: {}",
                label,
                signaling::truncate_for_log(text, LOG_PREVIEW_CHARS)
            );
            return;
        }

        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::ScheduleTransmission { request_id, data, .. }) => {
                info!(
                    "{}: transmission scheduled for {} at {} (flight plan {}, request {})",
                    label, data.satellite, data.time, data.flight_plan_id, request_id
                );
                self.expect_script = true;
            }
            Ok(ServerMessage::Unknown) => {
                debug!("{}: received {}", label, signaling::truncate_for_log(text, LOG_PREVIEW_CHARS));
            }
            Err(e) => {
                let err = LinkError::Protocol(format!("malformed frame: {}", e));
                debug!("{}: {}", label, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::new("ws://localhost:5111/");
        assert_eq!(config.connect_url, "ws://localhost:5111/api/v1/ground-station-link/connect");
        assert_eq!(config.handshake, HandshakeKind::Connect);
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.handshake_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_schedule_is_followed_by_a_script_frame() {
        let mut log = InboundLog::default();
        let schedule = r#"{"type":"schedule_transmission","request_id":"r1","frames":1,"data":{"satellite":"S","time":"t"}}"#;
        log.log("client-1", &InboundFrame::Text(schedule.to_string()));
        assert!(log.expect_script);
        log.log("client-1", &InboundFrame::Text(r#"["cmd"]"#.to_string()));
        assert!(!log.expect_script);
    }

    #[test]
    fn test_malformed_frames_do_not_arm_script() {
        let mut log = InboundLog::default();
        log.log("client-1", &InboundFrame::Text("not json".to_string()));
        assert!(!log.expect_script);
    }

    #[tokio::test]
    async fn test_unreachable_control_plane_fails_once() {
        use crate::control_plane::Location;
        use crate::stop::StopSignal;

        let identity = Identity {
            id: 1,
            name: "LoadTest-GS-1".into(),
            application_id: "app".into(),
            api_key: "key".into(),
            location: Location { latitude: 55.0, longitude: 12.0, altitude: 100.0 },
            created_at: None,
        };
        let metrics = FleetMetrics::new();
        let stop = StopSignal::new();
        let session = Session::new(
            1,
            identity,
            ControlPlaneClient::new("http://127.0.0.1:9").unwrap(),
            SessionConfig::new("ws://127.0.0.1:9"),
            metrics.clone(),
            stop.subscribe(),
        );
        let report = session.run().await;
        assert_eq!(report.state, SessionState::Failed);
        let snap = metrics.snapshot();
        assert_eq!((snap.failed, snap.errors, snap.established, snap.active), (1, 1, 0, 0));
    }
}
