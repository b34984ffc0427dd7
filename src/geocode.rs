//! Address to coordinate enrichment
//!
//! Geocoding is best effort: any failure or timeout yields `None` and the
//! caller stores null coordinates.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::backends::http_client;
use crate::config::settings::GeocoderSettings;
use crate::error::VaultResult;

/// A resolved coordinate pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve an address; `None` when it cannot be resolved for any reason
    async fn geocode(&self, address: &str) -> Option<Coordinates>;
}

/// Used when no provider is configured
pub struct NoopGeocoder;

#[async_trait]
impl Geocoder for NoopGeocoder {
    async fn geocode(&self, _address: &str) -> Option<Coordinates> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    addresses: Vec<GeocodeAddress>,
}

/// Coordinates arrive as decimal strings: `y` is latitude, `x` longitude
#[derive(Debug, Deserialize)]
struct GeocodeAddress {
    x: String,
    y: String,
}

/// NAVER Cloud Maps geocoding client
pub struct NaverGeocoder {
    client: Client,
    endpoint: String,
    client_id: String,
    client_secret: String,
}

impl NaverGeocoder {
    pub fn new(
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: std::time::Duration,
    ) -> VaultResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    async fn lookup(&self, address: &str) -> Result<Option<Coordinates>, String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("query", address)])
            .header("x-ncp-apigw-api-key-id", &self.client_id)
            .header("x-ncp-apigw-api-key", &self.client_secret)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("geocoder responded {}", response.status()));
        }

        let body: GeocodeResponse = response.json().await.map_err(|e| e.to_string())?;
        let Some(first) = body.addresses.first() else {
            return Ok(None);
        };

        let latitude = first.y.trim().parse::<f64>().map_err(|e| e.to_string())?;
        let longitude = first.x.trim().parse::<f64>().map_err(|e| e.to_string())?;
        Ok(Some(Coordinates {
            latitude,
            longitude,
        }))
    }
}

#[async_trait]
impl Geocoder for NaverGeocoder {
    async fn geocode(&self, address: &str) -> Option<Coordinates> {
        match self.lookup(address).await {
            Ok(Some(coords)) => {
                debug!(address, lat = coords.latitude, lng = coords.longitude, "Geocoded address");
                Some(coords)
            }
            Ok(None) => {
                debug!(address, "Geocoder found no match");
                None
            }
            Err(error) => {
                warn!(address, %error, "Geocoding failed, storing null coordinates");
                None
            }
        }
    }
}

/// Pick a geocoder from settings: NAVER when credentials exist, else no-op
pub fn build_geocoder(
    settings: &GeocoderSettings,
    timeout: std::time::Duration,
) -> VaultResult<Arc<dyn Geocoder>> {
    match (&settings.client_id, &settings.client_secret) {
        (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Ok(Arc::new(
            NaverGeocoder::new(settings.endpoint.clone(), id.clone(), secret.clone(), timeout)?,
        )),
        _ => Ok(Arc::new(NoopGeocoder)),
    }
}
