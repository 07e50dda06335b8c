use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::timeout::bounded;

/// ip-api.com - free, no API key required, 45 requests/minute
pub const DEFAULT_LOOKUP_URL: &str = "http://ip-api.com/json/?fields=status,query,city,regionName,country";

const UNKNOWN: &str = "unknown";

/// Response from the geolocation service
#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    status: String,
    #[serde(default, alias = "ip")]
    query: String,
    #[serde(default)]
    city: String,
    #[serde(rename = "regionName", alias = "region", default)]
    region: String,
    #[serde(default)]
    country: String,
}

/// Where the agent appears to be, as reported with each heartbeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub ip: String,
    /// "city, region, country"
    pub location: String,
}

impl Location {
    pub fn unknown() -> Self {
        Self { ip: UNKNOWN.to_string(), location: UNKNOWN.to_string() }
    }

    pub fn is_unknown(&self) -> bool {
        self.ip == UNKNOWN
    }

    fn from_lookup(response: LookupResponse) -> Self {
        if (!response.status.is_empty() && response.status != "success") || response.query.is_empty() {
            return Self::unknown();
        }

        let location = [response.city, response.region, response.country]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            ip: response.query,
            location: if location.is_empty() { UNKNOWN.to_string() } else { location },
        }
    }
}

/// Resolves the agent's public ip and location; never fails, falling back
/// to [`Location::unknown`].
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn locate(&self) -> Location;
}

pub struct IpApiLocator {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl IpApiLocator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into(), timeout })
    }

    async fn fetch(&self) -> Result<LookupResponse, reqwest::Error> {
        self.client.get(&self.url).send().await?.error_for_status()?.json::<LookupResponse>().await
    }
}

#[async_trait]
impl Geolocator for IpApiLocator {
    async fn locate(&self) -> Location {
        match bounded(self.timeout, self.fetch()).await {
            Ok(response) => {
                let location = Location::from_lookup(response);
                debug!("Location resolved: {} ({})", location.location, location.ip);
                location
            }
            Err(e) => {
                warn!("Failed to resolve location, reporting unknown: {}", e);
                Location::unknown()
            }
        }
    }
}

/// Used when location lookup is turned off
pub struct NoLocation;

#[async_trait]
impl Geolocator for NoLocation {
    async fn locate(&self) -> Location {
        Location::unknown()
    }
}
