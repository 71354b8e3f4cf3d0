//! Device registry and connectivity resolver.
//!
//! A device is reachable either on the local network (its internal DNS
//! name) or through the vendor's relay (its external URI). The resolver
//! probes the internal endpoint with a short TCP connect, caches the
//! outcome for a recheck window, and reprobes immediately after any
//! transport failure so traffic reroutes without operator intervention.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::Method;
use serde::Deserialize;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};
use crate::session::Session;
use crate::time::IsoTime;

/// How long a probe result stays fresh before the next request reprobes.
pub const CONNECTION_RECHECK_TIME: Duration = Duration::from_secs(30);

/// TCP connect timeout for the reachability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Reachability of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    Unknown,
    Internal,
    External,
}

impl std::fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionMode::Unknown => "unknown",
            ConnectionMode::Internal => "internal",
            ConnectionMode::External => "external",
        };
        f.write_str(name)
    }
}

/// Network descriptor reported by the device directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNetwork {
    #[serde(default)]
    pub local_ip_address: String,
    #[serde(default)]
    pub external_ip_address: String,
    #[serde(default)]
    pub local_http_port: i32,
    #[serde(default)]
    pub local_https_port: i32,
    #[serde(default)]
    pub port_forward_port: i32,
    #[serde(default)]
    pub tunnel_id: String,
    #[serde(rename = "internalDNSName", default)]
    pub internal_dns_name: String,
    #[serde(rename = "internalURL", default)]
    pub internal_url: String,
    #[serde(rename = "portForwardURL", default)]
    pub port_forward_url: String,
    #[serde(default)]
    pub port_forward_domain: String,
    #[serde(rename = "proxyURL", default)]
    pub proxy_url: String,
    #[serde(rename = "externalURI", default)]
    pub external_uri: String,
    #[serde(default)]
    pub port_forward_info_update_status: String,
}

/// One device entry from the directory listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mac: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub created_on: Option<IsoTime>,
    #[serde(default)]
    pub attached_status: String,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub network: DeviceNetwork,
    #[serde(rename = "lastHDStoragePercent", default)]
    pub last_hd_storage_percent: i32,
    #[serde(default)]
    pub cloud_connected: bool,
    #[serde(default)]
    pub owner_access: bool,
    #[serde(default)]
    pub serial_number: String,
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
}

#[derive(Debug, Clone, Copy)]
struct ConnectionState {
    mode: ConnectionMode,
    checked_at: Option<Instant>,
}

impl ConnectionState {
    fn needs_probe(&self) -> bool {
        self.mode == ConnectionMode::Unknown
            || self
                .checked_at
                .map_or(true, |at| at.elapsed() > CONNECTION_RECHECK_TIME)
    }
}

/// A remote storage device bound to an authenticated session.
pub struct Device {
    session: Arc<Session>,
    record: DeviceRecord,
    connection: Mutex<ConnectionState>,
}

impl Device {
    pub fn new(session: Arc<Session>, record: DeviceRecord) -> Device {
        Device {
            session,
            record,
            connection: Mutex::new(ConnectionState {
                mode: ConnectionMode::Unknown,
                checked_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn device_id(&self) -> &str {
        &self.record.device_id
    }

    pub fn network(&self) -> &DeviceNetwork {
        &self.record.network
    }

    pub fn connection_mode(&self) -> ConnectionMode {
        self.connection.lock().mode
    }

    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Probe the internal endpoint and record the observed mode.
    ///
    /// Returns whether the mode changed.
    pub async fn check_connection_mode(&self) -> bool {
        let mode = probe(&self.record.network.internal_dns_name).await;

        let mut state = self.connection.lock();
        let changed = state.mode != mode;
        if changed {
            info!(device = %self.record.name, %mode, "connection mode changed");
        }
        state.mode = mode;
        state.checked_at = Some(Instant::now());
        changed
    }

    /// The base URL for API calls, probing first when the cached mode is
    /// unknown or stale.
    pub async fn device_uri(&self) -> String {
        if self.connection.lock().needs_probe() {
            self.check_connection_mode().await;
        }

        if self.connection.lock().mode == ConnectionMode::External {
            self.record.network.external_uri.clone()
        } else {
            format!("https://{}", self.record.network.internal_dns_name)
        }
    }

    fn api_url(&self, base: &str, path: &str) -> String {
        format!("{}/sdk/{}", base, path.trim_start_matches('/'))
    }

    /// Dispatch an authorized request to the device's SDK endpoint.
    ///
    /// `mutator` customizes the request (query parameters, headers, body).
    /// A transport failure triggers an immediate reprobe; when the probe
    /// observes a different mode the failure is reported as
    /// `ConnectionModeChanged` so the caller may retry on the new endpoint.
    pub(crate) async fn api<F>(
        &self,
        method: Method,
        path: &str,
        mutator: F,
    ) -> ClientResult<reqwest::Response>
    where
        F: FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    {
        let url = self.api_url(&self.device_uri().await, path);
        debug!(%method, %url, "device api call");

        let req = mutator(self.session.authorized_request(method, &url).await?);
        match req.send().await {
            Ok(resp) => Ok(resp),
            Err(err) => {
                if self.check_connection_mode().await {
                    Err(ClientError::ConnectionModeChanged(err))
                } else {
                    Err(ClientError::Transport(err))
                }
            }
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("device_id", &self.record.device_id)
            .field("name", &self.record.name)
            .field("connection_mode", &self.connection.lock().mode)
            .finish()
    }
}

/// The user's devices, as returned by the directory service.
#[derive(Debug)]
pub struct DeviceList {
    pub devices: Vec<Arc<Device>>,
}

impl DeviceList {
    /// List the devices attached to the session's account, wiring the
    /// session into each device.
    pub async fn fetch(session: &Arc<Session>) -> ClientResult<DeviceList> {
        let url = format!(
            "{}/device/v1/user/{}",
            session.config().device_url()?,
            session.user_id()
        );

        let resp = session
            .authorized_request(Method::GET, &url)
            .await?
            .send()
            .await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(ClientError::unexpected(Method::GET, &resp));
        }

        #[derive(Deserialize)]
        struct DeviceInfoResponse {
            #[serde(default)]
            data: Vec<DeviceRecord>,
        }

        let parsed: DeviceInfoResponse = resp.json().await?;
        let devices = parsed
            .data
            .into_iter()
            .map(|record| Arc::new(Device::new(session.clone(), record)))
            .collect();
        Ok(DeviceList { devices })
    }

    /// Find a device by display name or device id.
    pub fn find(&self, name: &str) -> Option<Arc<Device>> {
        self.devices
            .iter()
            .find(|d| d.name() == name || d.device_id() == name)
            .cloned()
    }

    /// Display names of every known device.
    pub fn names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name().to_string()).collect()
    }
}

async fn probe(internal_dns_name: &str) -> ConnectionMode {
    let address = probe_address(internal_dns_name);
    match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(&address)).await {
        Ok(Ok(_stream)) => ConnectionMode::Internal,
        _ => ConnectionMode::External,
    }
}

/// The device directory reports the internal endpoint as a bare DNS name;
/// the SDK port is the https one.
fn probe_address(internal_dns_name: &str) -> String {
    if internal_dns_name.contains(':') {
        internal_dns_name.to_string()
    } else {
        format!("{internal_dns_name}:443")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{test_tokens, Session};

    fn test_device(name: &str, id: &str, internal_dns_name: &str) -> Arc<Device> {
        let session = Arc::new(Session::for_tests(test_tokens(
            &serde_json::json!({"exp": i64::MAX}),
        )));
        let record = DeviceRecord {
            device_id: id.into(),
            name: name.into(),
            mac: String::new(),
            device_type: String::new(),
            created_on: None,
            attached_status: String::new(),
            lang: String::new(),
            network: DeviceNetwork {
                internal_dns_name: internal_dns_name.into(),
                external_uri: "https://external.example.com".into(),
                ..Default::default()
            },
            last_hd_storage_percent: 0,
            cloud_connected: true,
            owner_access: true,
            serial_number: String::new(),
            api_version: String::new(),
        };
        Arc::new(Device::new(session, record))
    }

    #[test]
    fn test_probe_address_appends_https_port() {
        assert_eq!(probe_address("mydevice.local"), "mydevice.local:443");
        assert_eq!(probe_address("mydevice.local:8443"), "mydevice.local:8443");
    }

    #[test]
    fn test_find_by_name_or_id() {
        let list = DeviceList {
            devices: vec![
                test_device("Home", "dev-1", "home.local"),
                test_device("Office", "dev-2", "office.local"),
            ],
        };
        assert_eq!(list.find("Home").unwrap().device_id(), "dev-1");
        assert_eq!(list.find("dev-2").unwrap().name(), "Office");
        assert!(list.find("Garage").is_none());
        assert_eq!(list.names(), vec!["Home", "Office"]);
    }

    #[test]
    fn test_device_record_parses_directory_entry() {
        let json = r#"{
            "deviceId": "abc123",
            "name": "Home",
            "mac": "00:11:22:33:44:55",
            "type": "mirror",
            "createdOn": "2020-01-01T00:00:00Z",
            "network": {
                "internalDNSName": "device-abc123.local",
                "externalURI": "https://device-abc123.remote.example.com",
                "localHttpPort": 80,
                "localHttpsPort": 443
            },
            "cloudConnected": true
        }"#;
        let record: DeviceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.device_id, "abc123");
        assert_eq!(record.device_type, "mirror");
        assert_eq!(record.network.internal_dns_name, "device-abc123.local");
        assert_eq!(record.network.local_https_port, 443);
        assert!(record.cloud_connected);
        assert!(record.created_on.is_some());
    }

    #[tokio::test]
    async fn test_probe_reachable_listener_is_internal() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_eq!(probe(&addr.to_string()).await, ConnectionMode::Internal);
    }

    #[tokio::test]
    async fn test_probe_closed_port_is_external() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert_eq!(probe(&addr.to_string()).await, ConnectionMode::External);
    }

    #[tokio::test]
    async fn test_check_connection_mode_reports_changes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let device = test_device("Home", "dev-1", &addr.to_string());

        assert_eq!(device.connection_mode(), ConnectionMode::Unknown);
        assert!(device.check_connection_mode().await);
        assert_eq!(device.connection_mode(), ConnectionMode::Internal);
        // Same outcome: no change reported.
        assert!(!device.check_connection_mode().await);

        drop(listener);
        assert!(device.check_connection_mode().await);
        assert_eq!(device.connection_mode(), ConnectionMode::External);
    }

    #[tokio::test]
    async fn test_device_uri_prefers_internal_when_reachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let device = test_device("Home", "dev-1", &addr.to_string());
        assert_eq!(device.device_uri().await, format!("https://{addr}"));
    }

    #[tokio::test]
    async fn test_device_uri_falls_back_to_external() {
        let device = test_device("Home", "dev-1", "127.0.0.1:1");
        assert_eq!(device.device_uri().await, "https://external.example.com");
    }

    #[test]
    fn test_stale_probe_needs_recheck() {
        let fresh = ConnectionState {
            mode: ConnectionMode::Internal,
            checked_at: Some(Instant::now()),
        };
        assert!(!fresh.needs_probe());

        let stale = ConnectionState {
            mode: ConnectionMode::Internal,
            checked_at: Instant::now().checked_sub(CONNECTION_RECHECK_TIME + Duration::from_secs(1)),
        };
        assert!(stale.needs_probe());

        let unknown = ConnectionState {
            mode: ConnectionMode::Unknown,
            checked_at: Some(Instant::now()),
        };
        assert!(unknown.needs_probe());
    }

    #[test]
    fn test_api_url_trims_leading_slashes() {
        let device = test_device("Home", "dev-1", "home.local");
        assert_eq!(
            device.api_url("https://home.local", "/v2/files/root"),
            "https://home.local/sdk/v2/files/root"
        );
        assert_eq!(
            device.api_url("https://home.local", "v2/files/root"),
            "https://home.local/sdk/v2/files/root"
        );
    }

    #[test]
    fn test_connection_mode_display() {
        assert_eq!(ConnectionMode::Unknown.to_string(), "unknown");
        assert_eq!(ConnectionMode::Internal.to_string(), "internal");
        assert_eq!(ConnectionMode::External.to_string(), "external");
    }
}
