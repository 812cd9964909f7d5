#![forbid(unsafe_code)]

// Mock ground station - one link that answers scheduled transmissions with an image

use crate::config::GroundStationConfig;
use crate::control_plane::{AccessToken, ControlPlaneClient, ImageUpload};
use crate::error::{LinkError, LinkResult};
use crate::signaling::protocol::{CloseKind, ScheduleTransmissionData, ServerMessage};
use crate::signaling::{self, WsStream, LOG_PREVIEW_CHARS};
use chrono::Utc;
use futures_util::StreamExt;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Fixed capture position reported with every upload.
pub const CAPTURE_LATITUDE: f64 = 55.676098;
pub const CAPTURE_LONGITUDE: f64 = 12.568337;
pub const IMAGE_METADATA: &str = r#"{"camera":"test","resolution":"1x1"}"#;
/// Pause after sending our close frame so the server can answer it.
pub const CLOSE_LINGER: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroundStationSummary {
    pub scheduled: usize,
    pub uploaded: usize,
}

pub struct MockGroundStation {
    config: GroundStationConfig,
    control_plane: ControlPlaneClient,
}

impl MockGroundStation {
    pub fn new(config: GroundStationConfig) -> LinkResult<Self> {
        let control_plane = ControlPlaneClient::new(&config.base_url)?;
        Ok(Self { config, control_plane })
    }

    /// Holds the link until the server closes it or `interrupt` completes.
    /// Only token exchange and the handshake are fatal.
    pub async fn run_until<F>(self, interrupt: F) -> LinkResult<GroundStationSummary>
    where
        F: Future<Output = ()>,
    {
        info!("Requesting access token...");
        let token = self
            .control_plane
            .exchange_token(&self.config.application_id, self.config.api_key.as_str())
            .await?;
        info!("Obtained access token");

        let url = signaling::connect_url(&self.config.ws_url);
        info!("Connecting to {}...", url);
        let mut ws = signaling::connect(&url).await?;
        let confirmation = signaling::identify(&mut ws, self.config.handshake, &token).await?;
        info!("Server confirmation: {}", confirmation);
        info!("Press Ctrl+C to exit");

        tokio::pin!(interrupt);
        let mut summary = GroundStationSummary::default();

        loop {
            let frame = tokio::select! {
                _ = &mut interrupt => {
                    info!("Received interrupt signal, closing connection...");
                    if let Err(e) = signaling::send_close(&mut ws).await {
                        warn!("Error during close: {}", e);
                    }
                    sleep(CLOSE_LINGER).await;
                    break;
                }
                frame = ws.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    info!("Received message: {}", signaling::truncate_for_log(text.as_str(), LOG_PREVIEW_CHARS));
                    if let Ok(ServerMessage::ScheduleTransmission { data, .. }) =
                        serde_json::from_str::<ServerMessage>(text.as_str())
                    {
                        summary.scheduled += 1;
                        if self.handle_schedule(&mut ws, &token, &data).await {
                            summary.uploaded += 1;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Server closed connection: {:?}", CloseKind::from_frame(frame.as_ref()));
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    match CloseKind::from_error(&e) {
                        CloseKind::Graceful(_) => info!("Connection closed"),
                        CloseKind::Abnormal(reason) => warn!("Read error: {}", reason),
                    }
                    break;
                }
                None => {
                    info!("Connection closed");
                    break;
                }
            }
        }

        Ok(summary)
    }

    /// Reads the script frame that follows a schedule, then uploads an image.
    /// Returns whether the upload succeeded.
    async fn handle_schedule(&self, ws: &mut WsStream, token: &AccessToken, data: &ScheduleTransmissionData) -> bool {
        info!(
            "Parsed schedule transmission for satellite '{}' (id {}), flight plan {}, ground station {}",
            data.satellite, data.satellite_id, data.flight_plan_id, data.ground_station_id
        );

        match read_data_frame(ws).await {
            Ok(script) => info!("Received script: {}", signaling::truncate_for_log(&script, LOG_PREVIEW_CHARS)),
            Err(e) => warn!("Failed to read script message: {}", e),
        }

        info!("Sending image data...");
        match self.upload(token, data).await {
            Ok(()) => {
                info!("Image data sent successfully");
                true
            }
            Err(e) => {
                warn!("Failed to send image: {}", e);
                false
            }
        }
    }

    async fn upload(&self, token: &AccessToken, data: &ScheduleTransmissionData) -> LinkResult<()> {
        let bytes = tokio::fs::read(&self.config.image).await?;
        let file_name = self
            .config
            .image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.png".to_string());
        debug!("Read {} bytes from {}", bytes.len(), self.config.image.display());

        let upload = ImageUpload {
            satellite_id: data.satellite_id,
            ground_station_id: data.ground_station_id,
            flight_plan_id: data.flight_plan_id,
            capture_time: Utc::now(),
            latitude: CAPTURE_LATITUDE,
            longitude: CAPTURE_LONGITUDE,
            metadata: IMAGE_METADATA.to_string(),
            file_name,
            bytes,
        };
        self.control_plane.upload_image(token, upload).await
    }
}

/// Next text or binary frame, skipping control frames.
async fn read_data_frame(ws: &mut WsStream) -> LinkResult<String> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_string()),
            Some(Ok(Message::Binary(data))) => return Ok(format!("<{} binary bytes>", data.len())),
            Some(Ok(Message::Close(_))) | None => {
                return Err(LinkError::Protocol("connection closed before script frame".to_string()))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_is_valid_json() {
        let value: serde_json::Value = serde_json::from_str(IMAGE_METADATA).unwrap();
        assert_eq!(value["camera"], "test");
        assert_eq!(value["resolution"], "1x1");
    }
}
