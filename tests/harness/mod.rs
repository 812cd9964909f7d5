//! In-process mock of the SatOps control plane.
//!
//! Serves the token, ground-station, image and link endpoints on a random
//! local port. Each station's link can be scripted: push frames, ping, send a
//! scheduled transmission, then close normally, close with a code, reset the
//! connection, hold until the client closes, or drop the connection as soon
//! as the client's close arrives.

#![allow(dead_code)]

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use groundlink::config::FleetConfig;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const OPERATOR_TOKEN: &str = "operator-token";

/// How a link ends once the scripted frames have been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEnd {
    /// Wait for the client's close frame and answer it.
    Hold,
    CloseNormal,
    CloseWithCode(u16),
    /// Drop the TCP connection without a close frame.
    Reset,
    /// Wait for the client's close frame, then drop the connection unanswered.
    DropOnClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkScript {
    /// Never send the confirmation frame.
    pub silent: bool,
    pub pings: usize,
    pub frames: usize,
    pub schedule: bool,
    pub end: LinkEnd,
}

impl Default for LinkScript {
    fn default() -> Self {
        Self {
            silent: false,
            pings: 0,
            frames: 0,
            schedule: false,
            end: LinkEnd::Hold,
        }
    }
}

#[derive(Debug, Clone)]
struct Station {
    id: i64,
    name: String,
    application_id: String,
    api_key: String,
}

#[derive(Default)]
pub struct MockState {
    next_id: i64,
    stations: HashMap<i64, Station>,
    tokens: HashMap<String, i64>,
    scripts: HashMap<String, LinkScript>,
    rejected: HashSet<String>,
    fail_create_at: Option<usize>,
    fail_deletes: HashSet<String>,

    pub create_calls: usize,
    pub token_requests: usize,
    pub delete_requests: Vec<i64>,
    pub identifications: Vec<String>,
    pub pings_received: usize,
    pub uploads: Vec<HashMap<String, String>>,
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockControlPlane {
    pub addr: SocketAddr,
    state: Shared,
    handle: JoinHandle<()>,
}

impl MockControlPlane {
    pub async fn spawn() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState {
            next_id: 100,
            ..Default::default()
        }));

        let app = Router::new()
            .route("/api/v1/ground-station-link/token", post(token))
            .route("/api/v1/ground-stations", post(create_station))
            .route("/api/v1/ground-stations/{id}", delete(delete_station))
            .route("/api/v1/ground-station-link/images", post(upload_image))
            .route("/api/v1/ground-station-link/connect", get(connect))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, handle }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Fleet config with timings scaled down for tests.
    pub fn fleet_config(&self, clients: usize) -> FleetConfig {
        let mut config = FleetConfig::new(&self.base_url(), &self.ws_url(), OPERATOR_TOKEN);
        config.clients = clients;
        config.duration = Duration::from_millis(400);
        config.report_interval = Duration::from_millis(100);
        config.stagger = Duration::from_millis(5);
        config.shutdown_grace = Duration::from_secs(5);
        config.handshake_timeout = Duration::from_secs(5);
        config
    }

    /// Fail the `n`-th creation call (1-based) with a 500.
    pub fn fail_create_at(&self, n: usize) {
        self.state.lock().unwrap().fail_create_at = Some(n);
    }

    /// Reject token exchange for the named station.
    pub fn reject_credentials(&self, name: &str) {
        self.state.lock().unwrap().rejected.insert(name.to_string());
    }

    /// Answer deletion of the named station with a 500 and keep it.
    pub fn fail_delete(&self, name: &str) {
        self.state.lock().unwrap().fail_deletes.insert(name.to_string());
    }

    pub fn script(&self, name: &str, script: LinkScript) {
        self.state.lock().unwrap().scripts.insert(name.to_string(), script);
    }

    /// Registers a station directly, returning its application id and key.
    pub fn register_station(&self, name: &str) -> (i64, String, String) {
        let mut state = self.state.lock().unwrap();
        let station = state.add_station(name);
        (station.id, station.application_id, station.api_key)
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&MockState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }

    pub fn station_count(&self) -> usize {
        self.state.lock().unwrap().stations.len()
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}

impl MockState {
    fn add_station(&mut self, name: &str) -> Station {
        self.next_id += 1;
        let id = self.next_id;
        let station = Station {
            id,
            name: name.to_string(),
            application_id: format!("app-{}", id),
            api_key: format!("key-{}", id),
        };
        self.stations.insert(id, station.clone());
        station
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn token(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    state.token_requests += 1;
    let app_id = body["applicationId"].as_str().unwrap_or_default();
    let api_key = body["apiKey"].as_str().unwrap_or_default();

    let station = state
        .stations
        .values()
        .find(|s| s.application_id == app_id && s.api_key == api_key)
        .cloned();
    match station {
        Some(s) if !state.rejected.contains(&s.name) => {
            let token = format!("token-{}-{}", s.id, state.token_requests);
            state.tokens.insert(token.clone(), s.id);
            (StatusCode::OK, Json(json!({ "accessToken": token }))).into_response()
        }
        _ => (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid credentials" }))).into_response(),
    }
}

async fn create_station(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if bearer(&headers).as_deref() != Some(OPERATOR_TOKEN) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut state = state.lock().unwrap();
    state.create_calls += 1;
    if state.fail_create_at == Some(state.create_calls) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }

    let name = body["name"].as_str().unwrap_or_default().to_string();
    let station = state.add_station(&name);
    let response = json!({
        "id": station.id,
        "name": station.name,
        "applicationId": station.application_id,
        "rawApiKey": station.api_key,
        "location": body["location"],
        "createdAt": "2025-01-01T12:00:00Z",
    });
    (StatusCode::CREATED, Json(response)).into_response()
}

async fn delete_station(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<i64>) -> StatusCode {
    if bearer(&headers).as_deref() != Some(OPERATOR_TOKEN) {
        return StatusCode::UNAUTHORIZED;
    }
    let mut state = state.lock().unwrap();
    state.delete_requests.push(id);
    let refused = state
        .stations
        .get(&id)
        .is_some_and(|s| state.fail_deletes.contains(&s.name));
    if refused {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    match state.stations.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn upload_image(State(state): State<Shared>, headers: HeaderMap, mut multipart: Multipart) -> StatusCode {
    let authorised = bearer(&headers)
        .map(|t| state.lock().unwrap().tokens.contains_key(&t))
        .unwrap_or(false);
    if !authorised {
        return StatusCode::UNAUTHORIZED;
    }

    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.unwrap();
        match file_name {
            Some(file_name) => {
                fields.insert(format!("{}.file_name", name), file_name);
                fields.insert(format!("{}.len", name), data.len().to_string());
            }
            None => {
                fields.insert(name, String::from_utf8_lossy(&data).into_owned());
            }
        }
    }
    state.lock().unwrap().uploads.push(fields);
    StatusCode::OK
}

async fn connect(ws: WebSocketUpgrade, State(state): State<Shared>) -> Response {
    ws.on_upgrade(move |socket| link(socket, state))
}

async fn link(mut socket: WebSocket, state: Shared) {
    let Some(Ok(Message::Text(text))) = socket.recv().await else {
        return;
    };
    let hello: Value = serde_json::from_str(text.as_str()).unwrap_or_default();
    let token = hello["token"].as_str().unwrap_or_default().to_string();

    let station = {
        let mut state = state.lock().unwrap();
        state
            .identifications
            .push(hello["type"].as_str().unwrap_or_default().to_string());
        state
            .tokens
            .get(&token)
            .and_then(|id| state.stations.get(id))
            .map(|s| (s.id, state.scripts.get(&s.name).copied().unwrap_or_default()))
    };

    let Some((id, script)) = station else {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: 1008,
                reason: "Invalid token".into(),
            })))
            .await;
        drain(&mut socket, &state).await;
        return;
    };

    if script.silent {
        drain(&mut socket, &state).await;
        return;
    }

    let confirmation = json!({ "message": "OK", "id": id.to_string() });
    if socket.send(Message::Text(confirmation.to_string().into())).await.is_err() {
        return;
    }
    for _ in 0..script.pings {
        let _ = socket.send(Message::Ping(vec![1u8].into())).await;
    }
    for seq in 0..script.frames {
        let frame = json!({ "type": "status", "seq": seq });
        let _ = socket.send(Message::Text(frame.to_string().into())).await;
    }
    if script.schedule {
        let schedule = json!({
            "request_id": "5f0c2b3e-8f7e-4a51-9d57-3c1c1f7e2a10",
            "type": "schedule_transmission",
            "frames": 1,
            "data": {
                "satellite": "MEMESAT-1",
                "time": "2025-01-01T12:00:00Z",
                "flight_plan_id": 7,
                "satellite_id": 3,
                "ground_station_id": id
            }
        });
        let _ = socket.send(Message::Text(schedule.to_string().into())).await;
        let _ = socket
            .send(Message::Text(r#"["TRANSMIT MEMESAT-1","CAPTURE"]"#.into()))
            .await;
    }

    match script.end {
        LinkEnd::Hold => {}
        LinkEnd::CloseNormal => close_with(&mut socket, 1000).await,
        LinkEnd::CloseWithCode(code) => close_with(&mut socket, code).await,
        LinkEnd::Reset => return,
        LinkEnd::DropOnClose => {
            drop_on_close(&mut socket, &state).await;
            return;
        }
    }
    drain(&mut socket, &state).await;
}

async fn close_with(socket: &mut WebSocket, code: u16) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: "".into(),
        })))
        .await;
}

/// Returns on the client's close frame before the queued reply is flushed.
async fn drop_on_close(socket: &mut WebSocket, state: &Shared) {
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Ping(_) => state.lock().unwrap().pings_received += 1,
            Message::Close(_) => return,
            _ => {}
        }
    }
}

/// Reads until the client goes away, answering its close frame on the way.
async fn drain(socket: &mut WebSocket, state: &Shared) {
    while let Some(Ok(msg)) = socket.recv().await {
        if let Message::Ping(_) = msg {
            state.lock().unwrap().pings_received += 1;
        }
    }
}
