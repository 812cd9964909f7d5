#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateGroundStationRequest {
    pub name: String,
    pub location: Location,
}

/// A provisioned ground station. The id is assigned by the control plane.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: i64,
    pub name: String,
    pub application_id: String,
    #[serde(rename = "rawApiKey")]
    pub api_key: String,
    pub location: Location,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("application_id", &self.application_id)
            .field("api_key", &"<redacted>")
            .field("location", &self.location)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenRequest<'a> {
    pub application_id: &'a str,
    pub api_key: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenResponse {
    pub access_token: String,
}

/// Opaque, time-limited bearer credential for one ground station.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// One captured image for `POST /api/v1/ground-station-link/images`.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub satellite_id: i64,
    pub ground_station_id: i64,
    pub flight_plan_id: i64,
    pub capture_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// JSON object sent verbatim in the `Metadata` field
    pub metadata: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Outcome of a best-effort cleanup pass. Reported, never part of the verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub deleted: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_decodes_create_response() {
        let raw = r#"{
            "id": 42,
            "name": "LoadTest-GS-1",
            "applicationId": "app-42",
            "rawApiKey": "secret",
            "location": {"latitude": 55.0, "longitude": 12.0, "altitude": 100.0},
            "createdAt": "2025-01-01T12:00:00Z"
        }"#;
        let identity: Identity = serde_json::from_str(raw).unwrap();
        assert_eq!(identity.id, 42);
        assert_eq!(identity.application_id, "app-42");
        assert_eq!(identity.api_key, "secret");
        assert!(identity.created_at.is_some());
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let token = AccessToken::new("eyJhbGciOi");
        assert!(!format!("{:?}", token).contains("eyJ"));

        let identity = Identity {
            id: 1,
            name: "gs".into(),
            application_id: "app".into(),
            api_key: "top-secret".into(),
            location: Location { latitude: 0.0, longitude: 0.0, altitude: 0.0 },
            created_at: None,
        };
        let dbg = format!("{:?}", identity);
        assert!(!dbg.contains("top-secret"));
        assert!(dbg.contains("app"));
    }

    #[test]
    fn test_token_request_is_camel_case() {
        let json = serde_json::to_string(&TokenRequest { application_id: "a", api_key: "k" }).unwrap();
        assert_eq!(json, r#"{"applicationId":"a","apiKey":"k"}"#);
    }
}
