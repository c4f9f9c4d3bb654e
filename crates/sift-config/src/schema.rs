//! Session configuration schema.
//!
//! Canonical keys are snake_case. The camelCase names written by older
//! clients are accepted on read only, and unknown keys are ignored, so a
//! snapshot written by any client version still loads.

use serde::{Deserialize, Serialize};

use crate::validate::{ValidationError, ValidationResult};

/// Compiled-in collection endpoint. `%s` is replaced by the account id.
pub const DEFAULT_SERVER_URL_FORMAT: &str =
    "https://api3.siftscience.com/v3/accounts/%s/mobile_events";

/// One account/credential pair that batches are delivered to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(default, alias = "accountId")]
    pub account_id: String,

    #[serde(default, alias = "beaconKey")]
    pub beacon_key: String,
}

impl Destination {
    pub fn new(account_id: impl Into<String>, beacon_key: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            beacon_key: beacon_key.into(),
        }
    }
}

/// Active configuration for a telemetry session.
///
/// The primary destination is stored flat (`account_id`, `beacon_key`) next
/// to the shared URL template; extra fan-out destinations live in
/// `additional_destinations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(alias = "accountId")]
    pub account_id: String,

    #[serde(alias = "beaconKey")]
    pub beacon_key: String,

    #[serde(alias = "serverUrlFormat")]
    pub server_url_format: String,

    #[serde(alias = "disallowLocationCollection")]
    pub disallow_location_collection: bool,

    #[serde(
        alias = "additionalDestinations",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub additional_destinations: Vec<Destination>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            beacon_key: String::new(),
            server_url_format: DEFAULT_SERVER_URL_FORMAT.to_string(),
            disallow_location_collection: false,
            additional_destinations: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Create a config for a single destination on the default endpoint.
    pub fn new(account_id: impl Into<String>, beacon_key: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            beacon_key: beacon_key.into(),
            ..Self::default()
        }
    }

    pub fn with_server_url_format(mut self, format: impl Into<String>) -> Self {
        self.server_url_format = format.into();
        self
    }

    /// Add a fan-out destination.
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.additional_destinations.push(destination);
        self
    }

    pub fn with_location_collection_disallowed(mut self, disallowed: bool) -> Self {
        self.disallow_location_collection = disallowed;
        self
    }

    /// The primary destination.
    pub fn primary(&self) -> Destination {
        Destination::new(&self.account_id, &self.beacon_key)
    }

    /// Primary destination followed by every fan-out destination.
    pub fn destinations(&self) -> Vec<Destination> {
        let mut all = Vec::with_capacity(1 + self.additional_destinations.len());
        all.push(self.primary());
        all.extend(self.additional_destinations.iter().cloned());
        all
    }

    pub fn location_collection_allowed(&self) -> bool {
        !self.disallow_location_collection
    }

    /// Parse config JSON, accepting legacy key names.
    pub fn from_json(json: &str) -> ValidationResult<Self> {
        serde_json::from_str(json).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    /// Serialize with canonical key names only.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
