#![forbid(unsafe_code)]

// Control-plane module - request/response calls against the SatOps HTTP API

pub mod provisioner;
pub mod types;

pub use provisioner::Provisioner;
pub use types::{AccessToken, CleanupSummary, CreateGroundStationRequest, Identity, ImageUpload, Location};

use crate::error::{LinkError, LinkResult};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use types::{TokenRequest, TokenResponse};

const TOKEN_PATH: &str = "/api/v1/ground-station-link/token";
const GROUND_STATIONS_PATH: &str = "/api/v1/ground-stations";
const IMAGES_PATH: &str = "/api/v1/ground-station-link/images";

/// Upper bound for any single control-plane request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin async client over the control-plane endpoints.
///
/// Cloning is cheap: the underlying `reqwest::Client` shares its connection pool.
#[derive(Clone)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
}

impl ControlPlaneClient {
    pub fn new(base_url: &str) -> LinkResult<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchanges an application id and secret key for an access token.
    pub async fn exchange_token(&self, application_id: &str, api_key: &str) -> LinkResult<AccessToken> {
        let response = self
            .http
            .post(self.url(TOKEN_PATH))
            .json(&TokenRequest { application_id, api_key })
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(LinkError::Authentication(format!(
                "token request failed with status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| LinkError::Authentication(format!("undecodable token response: {}", e)))?;
        if body.access_token.is_empty() {
            return Err(LinkError::Authentication("token response carried no accessToken".to_string()));
        }
        Ok(AccessToken::new(body.access_token))
    }

    /// Creates one ground station. Anything other than `201 Created` is a failure.
    pub async fn create_ground_station(
        &self,
        operator_token: &str,
        request: &CreateGroundStationRequest,
    ) -> LinkResult<Identity> {
        let name = request.name.as_str();
        let response = self
            .http
            .post(self.url(GROUND_STATIONS_PATH))
            .bearer_auth(operator_token)
            .json(request)
            .send()
            .await
            .map_err(|e| LinkError::provisioning(name, None, e.to_string()))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(LinkError::provisioning(
                name,
                Some(status.as_u16()),
                format!("status {}, body: {}", status.as_u16(), body),
            ));
        }

        response
            .json::<Identity>()
            .await
            .map_err(|e| LinkError::provisioning(name, Some(status.as_u16()), format!("undecodable response: {}", e)))
    }

    /// Deletes one ground station by the id the control plane assigned.
    pub async fn delete_ground_station(&self, operator_token: &str, identity: &Identity) -> LinkResult<()> {
        let response = self
            .http
            .delete(format!("{}/{}", self.url(GROUND_STATIONS_PATH), identity.id))
            .bearer_auth(operator_token)
            .send()
            .await
            .map_err(|e| LinkError::provisioning(&identity.name, None, e.to_string()))?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            status => Err(LinkError::provisioning(
                &identity.name,
                Some(status.as_u16()),
                format!("delete returned status {}", status.as_u16()),
            )),
        }
    }

    /// Uploads one captured image with the station's own access token.
    pub async fn upload_image(&self, token: &AccessToken, upload: ImageUpload) -> LinkResult<()> {
        let size = upload.bytes.len();
        let form = Form::new()
            .text("SatelliteId", upload.satellite_id.to_string())
            .text("GroundStationId", upload.ground_station_id.to_string())
            .text("FlightPlanId", upload.flight_plan_id.to_string())
            .text("CaptureTime", upload.capture_time.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .text("Latitude", upload.latitude.to_string())
            .text("Longitude", upload.longitude.to_string())
            .text("Metadata", upload.metadata)
            .part("ImageFile", Part::bytes(upload.bytes).file_name(upload.file_name));

        let response = self
            .http
            .post(self.url(IMAGES_PATH))
            .bearer_auth(token.as_str())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(LinkError::Protocol(format!(
                "image upload failed with status {}: {}",
                status.as_u16(),
                body
            )));
        }

        debug!("Uploaded {} byte image", size);
        Ok(())
    }
}
