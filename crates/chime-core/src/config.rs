//! File-backed configuration store.
//!
//! The filesystem is the source of truth: every load re-reads the device
//! config (`key=value` lines shared with the doorbell daemon) and the
//! `wpa_supplicant` credentials file. Saves validate first and write nothing
//! unless the whole request is valid.
//!
//! ## Password handling
//!
//! The Wi-Fi psk is never blanked: an absent or empty `wifi_password` reuses
//! the stored one, and fails when there is none.
//!
//! The MQTT password follows the username:
//!
//! | username | `mqtt_password` | stored password |
//! |---|---|---|
//! | empty | any | cleared |
//! | unchanged | `Some(p)` | `p` (empty clears) |
//! | changed | `Some(p)` | `p` (empty clears) |
//! | unchanged | `None` | kept |
//! | changed | `None` | cleared |

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fsutil::atomic_write;
use crate::kv;
use crate::model::{
    CoreConfig, CoreConfigSnapshot, SaveRequest, ValidationError, DEFAULT_CLIENT_ID,
    DEFAULT_RING_TOPIC,
};
use crate::wpa::{PskUpdate, WpaFile};

const CHIME_CONFIG_MODE: u32 = 0o600;
const WPA_CONFIG_MODE: u32 = 0o600;

const MAX_SSID_LEN: usize = 32;
const MAX_CLIENT_ID_LEN: usize = 128;
const MAX_USERNAME_LEN: usize = 128;
const MAX_PASSWORD_LEN: usize = 256;
const MAX_TLS_PATH_LEN: usize = 256;

/// Errors produced by configuration loads and saves.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The request broke one or more business rules. Nothing was written.
    #[error("validation_failed")]
    Validation(Vec<ValidationError>),

    #[error("failed to open file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("wifi_password is blank and no existing password is available")]
    BlankWifiPassword,

    #[error("wifi_password is missing and no existing password is available")]
    MissingWifiPassword,
}

impl ConfigError {
    /// Field errors when this is a validation failure.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            ConfigError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

/// Outcome of every store operation: the resulting snapshot or why it failed.
pub type SaveResult = Result<CoreConfigSnapshot, ConfigError>;

/// Everything read from disk, secrets included.
struct StoredConfig {
    snapshot: CoreConfigSnapshot,
    mqtt_password: String,
}

/// Loads, validates and persists the device configuration.
#[derive(Debug)]
pub struct ConfigStore {
    chime_config_path: PathBuf,
    wpa_supplicant_path: PathBuf,
    /// Serialises read-modify-write cycles between concurrent saves.
    save_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(chime_config_path: impl Into<PathBuf>, wpa_supplicant_path: impl Into<PathBuf>) -> Self {
        Self {
            chime_config_path: chime_config_path.into(),
            wpa_supplicant_path: wpa_supplicant_path.into(),
            save_lock: Mutex::new(()),
        }
    }

    pub fn chime_config_path(&self) -> &Path {
        &self.chime_config_path
    }

    pub fn wpa_supplicant_path(&self) -> &Path {
        &self.wpa_supplicant_path
    }

    /// Read the current configuration from disk.
    pub fn load_core_config(&self) -> SaveResult {
        self.load_stored().map(|stored| stored.snapshot)
    }

    /// Validate and persist `request`, returning the re-loaded snapshot.
    pub fn save_core_config(&self, request: &SaveRequest) -> SaveResult {
        let errors = validate_request(request);
        if !errors.is_empty() {
            debug!(count = errors.len(), "Rejected configuration save");
            return Err(ConfigError::Validation(errors));
        }

        let _guard = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let existing = self.load_stored()?;
        self.save_wpa_supplicant(request)?;
        self.save_chime_config(request, &existing)?;

        info!(
            ssid = %request.config.wifi_ssid,
            mqtt_host = %request.config.mqtt_host,
            "Saved core configuration"
        );
        self.load_core_config()
    }

    fn load_stored(&self) -> Result<StoredConfig, ConfigError> {
        let lines = kv::read_lines(&self.chime_config_path).map_err(|source| ConfigError::Read {
            path: self.chime_config_path.clone(),
            source,
        })?;

        let client_id = kv::value_of(&lines, "mqtt_client_id");
        let ring_topic = kv::value_of(&lines, "ring_topic");
        let mut config = CoreConfig {
            wifi_ssid: String::new(),
            mqtt_host: kv::value_of(&lines, "mqtt_host"),
            mqtt_port: kv::parse_port(&kv::value_of(&lines, "mqtt_port")).unwrap_or(0),
            mqtt_client_id: if client_id.is_empty() {
                DEFAULT_CLIENT_ID.to_string()
            } else {
                client_id
            },
            mqtt_username: kv::value_of(&lines, "mqtt_username"),
            mqtt_tls_enabled: kv::parse_bool(&kv::value_of(&lines, "mqtt_tls_enabled")).unwrap_or(false),
            mqtt_tls_validate_certificate: kv::parse_bool(&kv::value_of(
                &lines,
                "mqtt_tls_validate_certificate",
            ))
            .unwrap_or(true),
            mqtt_tls_ca_file: kv::value_of(&lines, "mqtt_tls_ca_file"),
            mqtt_tls_cert_file: kv::value_of(&lines, "mqtt_tls_cert_file"),
            mqtt_tls_key_file: kv::value_of(&lines, "mqtt_tls_key_file"),
            mqtt_topics: kv::split_csv(&kv::value_of(&lines, "mqtt_topics")),
            ring_topic: if ring_topic.is_empty() {
                DEFAULT_RING_TOPIC.to_string()
            } else {
                ring_topic
            },
        };
        let mqtt_password = kv::value_of(&lines, "mqtt_password");

        let wpa = self.read_wpa()?;
        config.wifi_ssid = wpa.ssid().to_string();

        Ok(StoredConfig {
            snapshot: CoreConfigSnapshot {
                config,
                wifi_password_set: !wpa.psk().is_empty(),
                mqtt_password_set: !mqtt_password.is_empty(),
            },
            mqtt_password,
        })
    }

    fn read_wpa(&self) -> Result<WpaFile, ConfigError> {
        let lines = kv::read_lines_if_exists(&self.wpa_supplicant_path).map_err(|source| {
            ConfigError::Read {
                path: self.wpa_supplicant_path.clone(),
                source,
            }
        })?;
        Ok(WpaFile::parse(lines))
    }

    fn save_wpa_supplicant(&self, request: &SaveRequest) -> Result<(), ConfigError> {
        let mut wpa = self.read_wpa()?;

        let psk = match request.wifi_password.as_deref() {
            Some("") if wpa.psk().is_empty() => return Err(ConfigError::BlankWifiPassword),
            None if wpa.psk().is_empty() => return Err(ConfigError::MissingWifiPassword),
            Some("") | None => PskUpdate::Keep,
            Some(password) => PskUpdate::Replace(password),
        };

        wpa.set_credentials(&request.config.wifi_ssid, psk);
        let content = kv::join_lines(wpa.lines());
        atomic_write(&self.wpa_supplicant_path, content.as_bytes(), WPA_CONFIG_MODE).map_err(|source| {
            warn!(path = %self.wpa_supplicant_path.display(), error = %source, "Wi-Fi credentials write failed");
            ConfigError::Write {
                path: self.wpa_supplicant_path.clone(),
                source,
            }
        })
    }

    fn save_chime_config(&self, request: &SaveRequest, existing: &StoredConfig) -> Result<(), ConfigError> {
        let lines = kv::read_lines(&self.chime_config_path).map_err(|source| ConfigError::Read {
            path: self.chime_config_path.clone(),
            source,
        })?;

        let config = &request.config;
        let username_changed = config.mqtt_username != existing.snapshot.config.mqtt_username;
        let mqtt_password = resolve_mqtt_password(
            &config.mqtt_username,
            username_changed,
            request.mqtt_password.as_deref(),
            &existing.mqtt_password,
        );

        let replacements = [
            ("mqtt_host", config.mqtt_host.clone()),
            ("mqtt_port", config.mqtt_port.to_string()),
            ("mqtt_client_id", config.mqtt_client_id.clone()),
            ("mqtt_username", config.mqtt_username.clone()),
            ("mqtt_password", mqtt_password),
            ("mqtt_tls_enabled", kv::bool_value(config.mqtt_tls_enabled).to_string()),
            (
                "mqtt_tls_validate_certificate",
                kv::bool_value(config.mqtt_tls_validate_certificate).to_string(),
            ),
            ("mqtt_tls_ca_file", config.mqtt_tls_ca_file.clone()),
            ("mqtt_tls_cert_file", config.mqtt_tls_cert_file.clone()),
            ("mqtt_tls_key_file", config.mqtt_tls_key_file.clone()),
            ("mqtt_topics", config.mqtt_topics.join(",")),
            ("ring_topic", config.ring_topic.clone()),
        ];

        let content = kv::join_lines(&kv::rewrite(lines, &replacements));
        atomic_write(&self.chime_config_path, content.as_bytes(), CHIME_CONFIG_MODE).map_err(|source| {
            warn!(path = %self.chime_config_path.display(), error = %source, "Config write failed");
            ConfigError::Write {
                path: self.chime_config_path.clone(),
                source,
            }
        })
    }
}

fn resolve_mqtt_password(
    username: &str,
    username_changed: bool,
    supplied: Option<&str>,
    existing: &str,
) -> String {
    if username.is_empty() {
        return String::new();
    }
    match supplied {
        Some(password) => password.to_string(),
        None if username_changed => String::new(),
        None => existing.to_string(),
    }
}

/// Topics are stored comma separated on one line.
fn is_topic_valid(topic: &str) -> bool {
    !topic.is_empty() && !topic.chars().any(|c| c.is_whitespace() || c.is_control() || c == ',')
}

fn has_control_chars(value: &str) -> bool {
    value.chars().any(char::is_control)
}

/// A value written as `key=value` must survive the trim applied on load and
/// must stay on its own line.
fn check_line_value(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if has_control_chars(value) {
        errors.push(ValidationError::new(
            field,
            format!("{} must not contain control characters", field),
        ));
    } else if kv::trim(value) != value {
        errors.push(ValidationError::new(
            field,
            format!("{} must not have leading or trailing whitespace", field),
        ));
    }
}

/// Check every rule and report all violations together.
pub fn validate_request(request: &SaveRequest) -> Vec<ValidationError> {
    let config = &request.config;
    let mut errors = Vec::new();

    if config.wifi_ssid.is_empty() {
        errors.push(ValidationError::new("wifi_ssid", "wifi_ssid is required"));
    } else if config.wifi_ssid.len() > MAX_SSID_LEN {
        errors.push(ValidationError::new("wifi_ssid", "wifi_ssid must be <= 32 chars"));
    } else if has_control_chars(&config.wifi_ssid) {
        errors.push(ValidationError::new(
            "wifi_ssid",
            "wifi_ssid must not contain control characters",
        ));
    }

    if let Some(password) = request.wifi_password.as_deref().filter(|p| !p.is_empty()) {
        if !(8..=63).contains(&password.len()) {
            errors.push(ValidationError::new(
                "wifi_password",
                "wifi_password must be 8-63 chars when provided",
            ));
        } else if has_control_chars(password) {
            errors.push(ValidationError::new(
                "wifi_password",
                "wifi_password must not contain control characters",
            ));
        }
    }

    if config.mqtt_host.is_empty() {
        errors.push(ValidationError::new("mqtt_host", "mqtt_host is required"));
    } else if config.mqtt_host.contains(' ') {
        errors.push(ValidationError::new("mqtt_host", "mqtt_host must not contain spaces"));
    } else {
        check_line_value(&mut errors, "mqtt_host", &config.mqtt_host);
    }

    if !(1..=65535).contains(&config.mqtt_port) {
        errors.push(ValidationError::new("mqtt_port", "mqtt_port must be 1-65535"));
    }

    if config.mqtt_client_id.is_empty() {
        errors.push(ValidationError::new("mqtt_client_id", "mqtt_client_id is required"));
    } else if config.mqtt_client_id.len() > MAX_CLIENT_ID_LEN {
        errors.push(ValidationError::new(
            "mqtt_client_id",
            "mqtt_client_id must be <= 128 chars",
        ));
    } else {
        check_line_value(&mut errors, "mqtt_client_id", &config.mqtt_client_id);
    }

    if config.mqtt_username.len() > MAX_USERNAME_LEN {
        errors.push(ValidationError::new("mqtt_username", "mqtt_username must be <= 128 chars"));
    } else {
        check_line_value(&mut errors, "mqtt_username", &config.mqtt_username);
    }

    if let Some(password) = request.mqtt_password.as_deref() {
        if config.mqtt_username.is_empty() && !password.is_empty() {
            errors.push(ValidationError::new(
                "mqtt_password",
                "mqtt_password requires mqtt_username to be set",
            ));
        }
        if password.len() > MAX_PASSWORD_LEN {
            errors.push(ValidationError::new("mqtt_password", "mqtt_password must be <= 256 chars"));
        } else {
            check_line_value(&mut errors, "mqtt_password", password);
        }
    }

    for (field, value) in [
        ("mqtt_tls_ca_file", &config.mqtt_tls_ca_file),
        ("mqtt_tls_cert_file", &config.mqtt_tls_cert_file),
        ("mqtt_tls_key_file", &config.mqtt_tls_key_file),
    ] {
        if value.len() > MAX_TLS_PATH_LEN {
            errors.push(ValidationError::new(field, format!("{} must be <= 256 chars", field)));
        } else {
            check_line_value(&mut errors, field, value);
        }
    }
    if config.mqtt_tls_cert_file.is_empty() != config.mqtt_tls_key_file.is_empty() {
        errors.push(ValidationError::new(
            "mqtt_tls_cert_file",
            "mqtt_tls_cert_file and mqtt_tls_key_file must both be set",
        ));
    }

    if config.mqtt_topics.is_empty() {
        errors.push(ValidationError::new(
            "mqtt_topics",
            "mqtt_topics must contain at least one topic",
        ));
    } else {
        for (index, topic) in config.mqtt_topics.iter().enumerate() {
            if !is_topic_valid(topic) {
                errors.push(ValidationError::new(
                    "mqtt_topics",
                    format!("mqtt_topics[{}] is invalid", index),
                ));
            }
        }
    }

    if !is_topic_valid(&config.ring_topic) {
        errors.push(ValidationError::new("ring_topic", "ring_topic is invalid"));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const BASE_CONFIG: &str = "# chime daemon settings\naudio_device=hw:0\nmqtt_host=broker.lan\nmqtt_port=1883\nmqtt_username=door\nmqtt_password=hunter22\nmqtt_topics=doorbell/ring,doorbell/status\n";
    const BASE_WPA: &str = "ctrl_interface=/var/run/wpa_supplicant\nupdate_config=1\n\nnetwork={\n    ssid=\"Home\"\n    psk=\"oldpassword\"\n}\n";

    struct Fixture {
        _dir: TempDir,
        store: ConfigStore,
    }

    fn fixture(chime: &str, wpa: Option<&str>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let chime_path = dir.path().join("chime.conf");
        let wpa_path = dir.path().join("wpa_supplicant.conf");
        fs::write(&chime_path, chime).unwrap();
        if let Some(wpa) = wpa {
            fs::write(&wpa_path, wpa).unwrap();
        }
        Fixture {
            store: ConfigStore::new(chime_path, wpa_path),
            _dir: dir,
        }
    }

    fn valid_request() -> SaveRequest {
        SaveRequest {
            config: CoreConfig {
                wifi_ssid: "Home".to_string(),
                mqtt_host: "broker.lan".to_string(),
                mqtt_port: 1883,
                mqtt_client_id: "chime".to_string(),
                mqtt_username: "door".to_string(),
                mqtt_topics: vec!["doorbell/ring".to_string()],
                ..Default::default()
            },
            wifi_password: None,
            mqtt_password: None,
        }
    }

    fn fields(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    fn stored_mqtt_password(fixture: &Fixture) -> String {
        let lines = kv::read_lines(fixture.store.chime_config_path()).unwrap();
        kv::value_of(&lines, "mqtt_password")
    }

    #[test]
    fn test_load_defaults_and_secrets() {
        let fixture = fixture(BASE_CONFIG, Some(BASE_WPA));
        let snapshot = fixture.store.load_core_config().unwrap();

        assert_eq!(snapshot.config.wifi_ssid, "Home");
        assert_eq!(snapshot.config.mqtt_host, "broker.lan");
        assert_eq!(snapshot.config.mqtt_port, 1883);
        assert_eq!(snapshot.config.mqtt_client_id, "chime");
        assert_eq!(snapshot.config.ring_topic, "doorbell/ring");
        assert_eq!(snapshot.config.mqtt_topics, vec!["doorbell/ring", "doorbell/status"]);
        assert!(snapshot.config.mqtt_tls_validate_certificate);
        assert!(snapshot.wifi_password_set);
        assert!(snapshot.mqtt_password_set);
    }

    #[test]
    fn test_load_missing_host_and_port() {
        let fixture = fixture("mqtt_port=banana\n", None);
        let snapshot = fixture.store.load_core_config().unwrap();

        assert_eq!(snapshot.config.mqtt_host, "");
        assert_eq!(snapshot.config.mqtt_port, 0);
        assert_eq!(snapshot.config.wifi_ssid, "");
        assert!(!snapshot.wifi_password_set);
    }

    #[test]
    fn test_load_missing_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("absent.conf"), dir.path().join("wpa.conf"));

        let err = store.load_core_config().unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().starts_with("failed to open file '"));
    }

    #[test]
    fn test_validation_reports_all_errors() {
        let mut request = valid_request();
        request.config.wifi_ssid = "x".repeat(33);
        request.config.mqtt_port = 0;
        request.config.mqtt_topics.clear();
        request.config.mqtt_tls_cert_file = "/etc/cert.pem".to_string();

        let errors = validate_request(&request);

        assert_eq!(
            fields(&errors),
            vec!["wifi_ssid", "mqtt_port", "mqtt_tls_cert_file", "mqtt_topics"]
        );
        assert_eq!(errors[0].message, "wifi_ssid must be <= 32 chars");
    }

    #[test]
    fn test_validation_port_bounds() {
        let mut request = valid_request();
        request.config.mqtt_port = 65536;
        assert_eq!(fields(&validate_request(&request)), vec!["mqtt_port"]);

        request.config.mqtt_port = 65535;
        assert!(validate_request(&request).is_empty());
    }

    #[test]
    fn test_validation_topics_and_passwords() {
        let mut request = valid_request();
        request.config.mqtt_topics = vec!["ok".to_string(), "bad topic".to_string()];
        request.config.ring_topic = String::new();
        request.config.mqtt_username = String::new();
        request.mqtt_password = Some("secret".to_string());
        request.wifi_password = Some("short".to_string());

        let errors = validate_request(&request);

        assert_eq!(
            errors,
            vec![
                ValidationError::new("wifi_password", "wifi_password must be 8-63 chars when provided"),
                ValidationError::new("mqtt_password", "mqtt_password requires mqtt_username to be set"),
                ValidationError::new("mqtt_topics", "mqtt_topics[1] is invalid"),
                ValidationError::new("ring_topic", "ring_topic is invalid"),
            ]
        );
    }

    #[test]
    fn test_validation_rejects_line_breaking_values() {
        let mut request = valid_request();
        request.config.wifi_ssid = "Home\n}\nnetwork={".to_string();
        request.config.mqtt_host = "broker\naudio_device=hw:9".to_string();
        request.config.mqtt_client_id = "chime\r".to_string();
        request.config.mqtt_username = "door\0".to_string();
        request.config.mqtt_tls_ca_file = "/etc/ca.pem\nring_topic=x".to_string();
        request.mqtt_password = Some("pass\nword".to_string());
        request.wifi_password = Some("password\n1".to_string());

        let errors = validate_request(&request);

        assert_eq!(
            errors,
            vec![
                ValidationError::new("wifi_ssid", "wifi_ssid must not contain control characters"),
                ValidationError::new("wifi_password", "wifi_password must not contain control characters"),
                ValidationError::new("mqtt_host", "mqtt_host must not contain control characters"),
                ValidationError::new("mqtt_client_id", "mqtt_client_id must not contain control characters"),
                ValidationError::new("mqtt_username", "mqtt_username must not contain control characters"),
                ValidationError::new("mqtt_password", "mqtt_password must not contain control characters"),
                ValidationError::new("mqtt_tls_ca_file", "mqtt_tls_ca_file must not contain control characters"),
            ]
        );
    }

    #[test]
    fn test_validation_rejects_values_trimmed_on_load() {
        let mut request = valid_request();
        request.config.mqtt_client_id = " chime".to_string();
        request.config.mqtt_username = "door ".to_string();

        let errors = validate_request(&request);

        assert_eq!(
            errors,
            vec![
                ValidationError::new(
                    "mqtt_client_id",
                    "mqtt_client_id must not have leading or trailing whitespace"
                ),
                ValidationError::new(
                    "mqtt_username",
                    "mqtt_username must not have leading or trailing whitespace"
                ),
            ]
        );
    }

    #[test]
    fn test_validation_rejects_topics_that_split_on_load() {
        let mut request = valid_request();
        request.config.mqtt_topics = vec!["a,b".to_string(), "c\nd".to_string(), "ok/topic".to_string()];
        request.config.ring_topic = "front\nmqtt_host=evil".to_string();

        let errors = validate_request(&request);

        assert_eq!(
            errors,
            vec![
                ValidationError::new("mqtt_topics", "mqtt_topics[0] is invalid"),
                ValidationError::new("mqtt_topics", "mqtt_topics[1] is invalid"),
                ValidationError::new("ring_topic", "ring_topic is invalid"),
            ]
        );
    }

    #[test]
    fn test_injected_keys_never_reach_disk() {
        let fixture = fixture(BASE_CONFIG, Some(BASE_WPA));
        let mut request = valid_request();
        request.config.mqtt_host = "broker\naudio_device=hw:9".to_string();
        request.config.mqtt_topics = vec!["a,b".to_string()];

        let err = fixture.store.save_core_config(&request).unwrap_err();

        assert_eq!(fields(err.validation_errors()), vec!["mqtt_host", "mqtt_topics"]);
        let lines = kv::read_lines(fixture.store.chime_config_path()).unwrap();
        assert_eq!(kv::value_of(&lines, "audio_device"), "hw:0");
        assert_eq!(fs::read_to_string(fixture.store.chime_config_path()).unwrap(), BASE_CONFIG);
    }

    #[test]
    fn test_invalid_save_writes_nothing() {
        let fixture = fixture(BASE_CONFIG, Some(BASE_WPA));
        let mut request = valid_request();
        request.config.mqtt_host = String::new();

        let err = fixture.store.save_core_config(&request).unwrap_err();

        assert_eq!(err.to_string(), "validation_failed");
        assert_eq!(fields(err.validation_errors()), vec!["mqtt_host"]);
        assert_eq!(fs::read_to_string(fixture.store.chime_config_path()).unwrap(), BASE_CONFIG);
        assert_eq!(fs::read_to_string(fixture.store.wpa_supplicant_path()).unwrap(), BASE_WPA);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let fixture = fixture(BASE_CONFIG, Some(BASE_WPA));
        let mut request = valid_request();
        request.config.wifi_ssid = "Cabin".to_string();
        request.config.mqtt_tls_enabled = true;
        request.config.mqtt_tls_cert_file = "/etc/chime/client.pem".to_string();
        request.config.mqtt_tls_key_file = "/etc/chime/client.key".to_string();
        request.config.mqtt_topics = vec!["a/b".to_string(), "c/d".to_string()];
        request.config.ring_topic = "front/ring".to_string();
        request.wifi_password = Some("newpassword".to_string());

        let saved = fixture.store.save_core_config(&request).unwrap();
        let loaded = fixture.store.load_core_config().unwrap();

        assert_eq!(saved, loaded);
        assert_eq!(loaded.config, request.config);
        assert!(loaded.wifi_password_set);
        assert!(loaded.mqtt_password_set);

        let chime = fs::read_to_string(fixture.store.chime_config_path()).unwrap();
        assert!(chime.starts_with("# chime daemon settings\naudio_device=hw:0\n"));
        let wpa = fs::read_to_string(fixture.store.wpa_supplicant_path()).unwrap();
        assert!(wpa.contains("    ssid=\"Cabin\"\n    psk=\"newpassword\"\n"));
    }

    #[test]
    fn test_wifi_password_reused_when_absent_or_blank() {
        let fixture = fixture(BASE_CONFIG, Some(BASE_WPA));

        fixture.store.save_core_config(&valid_request()).unwrap();
        let mut request = valid_request();
        request.wifi_password = Some(String::new());
        fixture.store.save_core_config(&request).unwrap();

        let wpa = fs::read_to_string(fixture.store.wpa_supplicant_path()).unwrap();
        assert!(wpa.contains("    psk=\"oldpassword\""));
    }

    #[test]
    fn test_wifi_password_required_without_existing() {
        let fixture = fixture(BASE_CONFIG, None);

        let err = fixture.store.save_core_config(&valid_request()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingWifiPassword));

        let mut request = valid_request();
        request.wifi_password = Some(String::new());
        let err = fixture.store.save_core_config(&request).unwrap_err();
        assert!(matches!(err, ConfigError::BlankWifiPassword));
        assert!(!fixture.store.wpa_supplicant_path().exists());
    }

    #[test]
    fn test_mqtt_password_same_username_supplied() {
        let fixture = fixture(BASE_CONFIG, Some(BASE_WPA));
        let mut request = valid_request();
        request.mqtt_password = Some("rotated".to_string());
        fixture.store.save_core_config(&request).unwrap();
        assert_eq!(stored_mqtt_password(&fixture), "rotated");

        request.mqtt_password = Some(String::new());
        let snapshot = fixture.store.save_core_config(&request).unwrap();
        assert_eq!(stored_mqtt_password(&fixture), "");
        assert!(!snapshot.mqtt_password_set);
    }

    #[test]
    fn test_mqtt_password_same_username_absent() {
        let fixture = fixture(BASE_CONFIG, Some(BASE_WPA));

        let snapshot = fixture.store.save_core_config(&valid_request()).unwrap();

        assert_eq!(stored_mqtt_password(&fixture), "hunter22");
        assert!(snapshot.mqtt_password_set);
    }

    #[test]
    fn test_mqtt_password_changed_username_supplied() {
        let fixture = fixture(BASE_CONFIG, Some(BASE_WPA));
        let mut request = valid_request();
        request.config.mqtt_username = "frontdoor".to_string();
        request.mqtt_password = Some("fresh".to_string());

        fixture.store.save_core_config(&request).unwrap();

        assert_eq!(stored_mqtt_password(&fixture), "fresh");
    }

    #[test]
    fn test_mqtt_password_changed_username_absent() {
        let fixture = fixture(BASE_CONFIG, Some(BASE_WPA));
        let mut request = valid_request();
        request.config.mqtt_username = "frontdoor".to_string();

        let snapshot = fixture.store.save_core_config(&request).unwrap();

        assert_eq!(stored_mqtt_password(&fixture), "");
        assert!(!snapshot.mqtt_password_set);
    }

    #[test]
    fn test_mqtt_password_cleared_without_username() {
        let fixture = fixture(BASE_CONFIG, Some(BASE_WPA));
        let mut request = valid_request();
        request.config.mqtt_username = String::new();

        fixture.store.save_core_config(&request).unwrap();

        assert_eq!(stored_mqtt_password(&fixture), "");
    }
}
