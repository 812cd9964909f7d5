#![forbid(unsafe_code)]

// Credential provisioner - creates and tears down load-test ground stations

use super::types::{AccessToken, CleanupSummary, CreateGroundStationRequest, Identity, Location};
use super::ControlPlaneClient;
use crate::error::LinkResult;
use tracing::{info, warn};

const NAME_PREFIX: &str = "LoadTest-GS";
const BASE_LATITUDE: f64 = 55.0;
const BASE_LONGITUDE: f64 = 12.0;
const ALTITUDE: f64 = 100.0;
const SPREAD_DEGREES: f64 = 0.1;

/// Creation request for the `index`-th fixture (0-based).
pub fn identity_request(index: usize) -> CreateGroundStationRequest {
    let offset = SPREAD_DEGREES * index as f64;
    CreateGroundStationRequest {
        name: format!("{}-{}", NAME_PREFIX, index + 1),
        location: Location {
            latitude: BASE_LATITUDE + offset,
            longitude: BASE_LONGITUDE + offset,
            altitude: ALTITUDE,
        },
    }
}

pub struct Provisioner {
    client: ControlPlaneClient,
    operator_token: AccessToken,
}

impl Provisioner {
    pub fn new(client: ControlPlaneClient, operator_token: AccessToken) -> Self {
        Self {
            client,
            operator_token,
        }
    }

    /// Creates `count` identities in order. Stops at the first failure; identities
    /// created before it are left in place.
    pub async fn create_identities(&self, count: usize) -> LinkResult<Vec<Identity>> {
        info!("Creating {} ground stations...", count);
        let mut identities = Vec::new();

        for index in 0..count {
            let request = identity_request(index);
            let identity = self
                .client
                .create_ground_station(self.operator_token.as_str(), &request)
                .await?;
            info!("Created ground station {} (id {})", identity.name, identity.id);
            identities.push(identity);
        }

        Ok(identities)
    }

    /// Deletes every identity, one request each. Failures are logged and counted
    /// but never stop the pass.
    pub async fn delete_identities(&self, identities: &[Identity]) -> CleanupSummary {
        info!("Cleaning up {} ground stations...", identities.len());
        let mut summary = CleanupSummary::default();

        for identity in identities {
            match self
                .client
                .delete_ground_station(self.operator_token.as_str(), identity)
                .await
            {
                Ok(()) => {
                    summary.deleted += 1;
                    info!("Deleted ground station {} (id {})", identity.name, identity.id);
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!("Failed to delete ground station {} (id {}): {}", identity.name, identity.id, e);
                }
            }
        }

        summary
    }
}
