//! Doorbell configuration data model.
//!
//! These types describe:
//! - The user-editable device configuration (Wi-Fi + MQTT)
//! - Secret-redacted snapshots handed back to API callers
//! - Save requests with optional password fields
//! - Apply job status and Wi-Fi scan results

use std::fmt;

/// Client id used when the config file does not name one.
pub const DEFAULT_CLIENT_ID: &str = "chime";

/// Ring topic used when the config file does not name one.
pub const DEFAULT_RING_TOPIC: &str = "doorbell/ring";

/// The editable device configuration.
///
/// Secrets (Wi-Fi psk, MQTT password) are not part of this struct. They only
/// live on disk and inside the store while a save is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub wifi_ssid: String,
    pub mqtt_host: String,
    /// Kept wide so out-of-range request values reach validation intact.
    pub mqtt_port: i64,
    pub mqtt_client_id: String,
    pub mqtt_username: String,
    pub mqtt_tls_enabled: bool,
    pub mqtt_tls_validate_certificate: bool,
    pub mqtt_tls_ca_file: String,
    pub mqtt_tls_cert_file: String,
    pub mqtt_tls_key_file: String,
    /// Subscribe topics. Must be non-empty; duplicates are allowed.
    pub mqtt_topics: Vec<String>,
    pub ring_topic: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            mqtt_host: String::new(),
            mqtt_port: 0,
            mqtt_client_id: DEFAULT_CLIENT_ID.to_string(),
            mqtt_username: String::new(),
            mqtt_tls_enabled: false,
            mqtt_tls_validate_certificate: true,
            mqtt_tls_ca_file: String::new(),
            mqtt_tls_cert_file: String::new(),
            mqtt_tls_key_file: String::new(),
            mqtt_topics: Vec::new(),
            ring_topic: DEFAULT_RING_TOPIC.to_string(),
        }
    }
}

/// A read-only, secret-redacted view of the persisted configuration.
///
/// Produced fresh from disk on every load; never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreConfigSnapshot {
    pub config: CoreConfig,
    /// A non-empty Wi-Fi psk is stored.
    pub wifi_password_set: bool,
    /// A non-empty MQTT password is stored.
    pub mqtt_password_set: bool,
}

/// A candidate configuration submitted for saving.
///
/// `None` passwords mean "leave unchanged"; `Some("")` is an explicit blank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveRequest {
    pub config: CoreConfig,
    pub wifi_password: Option<String>,
    pub mqtt_password: Option<String>,
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

// ============================================================================
// Apply Jobs
// ============================================================================

/// Lifecycle of an apply job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyState {
    #[default]
    Idle,
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ApplyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyState::Idle => "idle",
            ApplyState::Pending => "pending",
            ApplyState::Running => "running",
            ApplyState::Succeeded => "succeeded",
            ApplyState::Failed => "failed",
        }
    }

    /// A job in this state still owns the single-flight slot.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ApplyState::Pending | ApplyState::Running)
    }
}

impl fmt::Display for ApplyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the most recent apply job.
///
/// Timestamps are `YYYY-MM-DDTHH:MM:SSZ` or empty when not reached yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyStatus {
    /// Zero until the first job starts.
    pub job_id: u64,
    pub state: ApplyState,
    pub started_at_utc: String,
    pub finished_at_utc: String,
    pub error: String,
}

// ============================================================================
// Wi-Fi Scanning
// ============================================================================

/// Security label reported for a scanned network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    #[default]
    Open,
    Wep,
    Wpa,
    Wpa2,
    Wpa3,
}

impl Security {
    pub fn as_str(&self) -> &'static str {
        match self {
            Security::Open => "OPEN",
            Security::Wep => "WEP",
            Security::Wpa => "WPA",
            Security::Wpa2 => "WPA2",
            Security::Wpa3 => "WPA3",
        }
    }

    /// Derive a label from a scanner's capability flags, strongest first.
    pub fn from_flags(flags: &str) -> Self {
        if flags.contains("WPA3") {
            Security::Wpa3
        } else if flags.contains("WPA2") || flags.contains("RSN") {
            Security::Wpa2
        } else if flags.contains("WPA") {
            Security::Wpa
        } else if flags.contains("WEP") {
            Security::Wep
        } else {
            Security::Open
        }
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiNetwork {
    pub ssid: String,
    pub signal_dbm: i32,
    pub security: Security,
}

impl WifiNetwork {
    pub fn new(ssid: impl Into<String>, signal_dbm: i32, security: Security) -> Self {
        Self {
            ssid: ssid.into(),
            signal_dbm,
            security,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_from_flags() {
        assert_eq!(Security::from_flags("[WPA2-SAE-CCMP][WPA3]"), Security::Wpa3);
        assert_eq!(Security::from_flags("[RSN-PSK-CCMP][ESS]"), Security::Wpa2);
        assert_eq!(Security::from_flags("[WPA-PSK-TKIP][ESS]"), Security::Wpa);
        assert_eq!(Security::from_flags("[WEP][ESS]"), Security::Wep);
        assert_eq!(Security::from_flags("[ESS]"), Security::Open);
    }

    #[test]
    fn test_apply_state_in_flight() {
        assert!(ApplyState::Pending.is_in_flight());
        assert!(ApplyState::Running.is_in_flight());
        assert!(!ApplyState::Idle.is_in_flight());
        assert!(!ApplyState::Failed.is_in_flight());
        assert_eq!(ApplyState::Succeeded.to_string(), "succeeded");
    }

    #[test]
    fn test_default_config_uses_builtin_topics() {
        let config = CoreConfig::default();
        assert_eq!(config.mqtt_client_id, "chime");
        assert_eq!(config.ring_topic, "doorbell/ring");
        assert!(config.mqtt_tls_validate_certificate);
        assert_eq!(config.mqtt_port, 0);
    }
}
