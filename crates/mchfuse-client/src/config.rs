//! Service endpoint directory.
//!
//! The cloud service publishes its endpoint URLs in a nested component map
//! behind a well-known bootstrap URL. The map is fetched once at startup
//! and stays immutable for the process lifetime.

use std::collections::HashMap;

use reqwest::{Method, StatusCode};
use serde::Deserialize;

use crate::error::{ClientError, ClientResult};

/// Well-known bootstrap URL of the configuration service.
pub const CONFIG_URL: &str = "https://config.mycloud.com/config/v1/config";

const SERVICE_URLS_SECTION: &str = "cloud.service.urls";
const AUTH_URL_KEY: &str = "service.auth0.url";
const DEVICE_URL_KEY: &str = "service.device.url";
const PORTAL_SECTION: &str = "com.wd.portal";
const PORTAL_CLIENT_KEY: &str = "portal.auth0.client";

#[derive(Debug, Deserialize)]
struct ConfigResponse {
    data: ServiceConfig,
}

/// The service endpoint directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default)]
    pub configuration_id: String,
    pub component_map: HashMap<String, HashMap<String, serde_json::Value>>,
}

impl ServiceConfig {
    /// Fetch the endpoint directory from the bootstrap URL.
    pub async fn fetch(http: &reqwest::Client) -> ClientResult<ServiceConfig> {
        let resp = http
            .get(CONFIG_URL)
            .send()
            .await
            .map_err(|err| ClientError::Config(format!("bootstrap config unreachable: {err}")))?;
        if resp.status() != StatusCode::OK {
            return Err(ClientError::unexpected(Method::GET, &resp));
        }
        let parsed: ConfigResponse = resp
            .json()
            .await
            .map_err(|err| ClientError::Config(err.to_string()))?;
        Ok(parsed.data)
    }

    /// Look up a string entry in the component map.
    pub fn get_str(&self, section: &str, key: &str) -> ClientResult<&str> {
        self.component_map
            .get(section)
            .and_then(|entries| entries.get(key))
            .and_then(|value| value.as_str())
            .ok_or_else(|| ClientError::Config(format!("missing entry {section} / {key}")))
    }

    /// Base URL of the authentication service.
    pub fn auth_url(&self) -> ClientResult<&str> {
        self.get_str(SERVICE_URLS_SECTION, AUTH_URL_KEY)
    }

    /// Base URL of the device directory service.
    pub fn device_url(&self) -> ClientResult<&str> {
        self.get_str(SERVICE_URLS_SECTION, DEVICE_URL_KEY)
    }

    /// OAuth client id used by the token refresh grant.
    pub fn portal_client_id(&self) -> ClientResult<&str> {
        self.get_str(PORTAL_SECTION, PORTAL_CLIENT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "data": {
            "configurationId": "prod-42",
            "componentMap": {
                "cloud.service.urls": {
                    "service.auth0.url": "https://auth.example.com",
                    "service.device.url": "https://device.example.com"
                },
                "com.wd.portal": {
                    "portal.auth0.client": "portal-client-id",
                    "portal.retry.count": 3
                }
            }
        }
    }"#;

    fn sample_config() -> ServiceConfig {
        let parsed: ConfigResponse = serde_json::from_str(SAMPLE).unwrap();
        parsed.data
    }

    #[test]
    fn test_parse_and_lookups() {
        let config = sample_config();
        assert_eq!(config.configuration_id, "prod-42");
        assert_eq!(config.auth_url().unwrap(), "https://auth.example.com");
        assert_eq!(config.device_url().unwrap(), "https://device.example.com");
        assert_eq!(config.portal_client_id().unwrap(), "portal-client-id");
    }

    #[test]
    fn test_missing_section_is_config_error() {
        let config = sample_config();
        let err = config.get_str("does.not.exist", "key").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let config = sample_config();
        let err = config.get_str("com.wd.portal", "nope").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_non_string_value_is_config_error() {
        let config = sample_config();
        let err = config.get_str("com.wd.portal", "portal.retry.count").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
