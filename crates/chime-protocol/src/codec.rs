//! HTTP API payload codec.
//!
//! Response bodies are built as [`JsonValue`] objects with a fixed key order
//! so clients see stable output. Request decoding reports type problems as
//! field-indexed [`ValidationError`]s, the same shape the config store uses
//! for business-rule failures.

use chime_core::{ApplyStatus, CoreConfig, CoreConfigSnapshot, SaveRequest, ValidationError, WifiNetwork};
use thiserror::Error;

use crate::json::JsonValue;

/// Errors from decoding a request body.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("payload must be an object")]
    NotAnObject,

    #[error("validation_failed")]
    Fields(Vec<ValidationError>),
}

// ============================================================================
// Responses
// ============================================================================

pub fn encode_apply_status(status: &ApplyStatus) -> JsonValue {
    JsonValue::object([
        ("job_id", JsonValue::from(status.job_id)),
        ("state", JsonValue::from(status.state.as_str())),
        ("started_at_utc", JsonValue::from(&status.started_at_utc)),
        ("finished_at_utc", JsonValue::from(&status.finished_at_utc)),
        ("error", JsonValue::from(&status.error)),
    ])
}

/// The config snapshot followed by the apply job status.
pub fn encode_snapshot(snapshot: &CoreConfigSnapshot, apply: &ApplyStatus) -> JsonValue {
    let config = &snapshot.config;
    JsonValue::object([
        ("wifi_ssid", JsonValue::from(&config.wifi_ssid)),
        ("wifi_password_set", JsonValue::from(snapshot.wifi_password_set)),
        ("mqtt_host", JsonValue::from(&config.mqtt_host)),
        ("mqtt_port", JsonValue::from(config.mqtt_port)),
        ("mqtt_client_id", JsonValue::from(&config.mqtt_client_id)),
        ("mqtt_username", JsonValue::from(&config.mqtt_username)),
        ("mqtt_password_set", JsonValue::from(snapshot.mqtt_password_set)),
        ("mqtt_tls_enabled", JsonValue::from(config.mqtt_tls_enabled)),
        (
            "mqtt_tls_validate_certificate",
            JsonValue::from(config.mqtt_tls_validate_certificate),
        ),
        ("mqtt_tls_ca_file", JsonValue::from(&config.mqtt_tls_ca_file)),
        ("mqtt_tls_cert_file", JsonValue::from(&config.mqtt_tls_cert_file)),
        ("mqtt_tls_key_file", JsonValue::from(&config.mqtt_tls_key_file)),
        ("mqtt_topics", JsonValue::array(&config.mqtt_topics)),
        ("ring_topic", JsonValue::from(&config.ring_topic)),
        ("apply", encode_apply_status(apply)),
    ])
}

pub fn encode_validation_errors(errors: &[ValidationError]) -> JsonValue {
    JsonValue::array(errors.iter().map(|error| {
        JsonValue::object([
            ("field", JsonValue::from(&error.field)),
            ("message", JsonValue::from(&error.message)),
        ])
    }))
}

/// `{"error":"validation_failed","validation_errors":[...]}`
pub fn validation_failed(errors: &[ValidationError]) -> JsonValue {
    JsonValue::object([
        ("error", JsonValue::from("validation_failed")),
        ("validation_errors", encode_validation_errors(errors)),
    ])
}

/// `{"error":code}`
pub fn error_body(code: &str) -> JsonValue {
    JsonValue::object([("error", JsonValue::from(code))])
}

/// `{"error":code,"message":message}`
pub fn error_with_message(code: &str, message: &str) -> JsonValue {
    JsonValue::object([("error", JsonValue::from(code)), ("message", JsonValue::from(message))])
}

pub fn encode_networks(networks: &[WifiNetwork]) -> JsonValue {
    let items = networks.iter().map(|network| {
        JsonValue::object([
            ("ssid", JsonValue::from(&network.ssid)),
            ("signal_dbm", JsonValue::from(network.signal_dbm)),
            ("security", JsonValue::from(network.security.as_str())),
        ])
    });
    JsonValue::object([("networks", JsonValue::array(items))])
}

pub fn encode_topics(topics: &[String]) -> JsonValue {
    JsonValue::object([("topics", JsonValue::array(topics))])
}

// ============================================================================
// Requests
// ============================================================================

/// Reads typed fields from a JSON object, collecting every type error.
pub struct FieldReader<'a> {
    object: &'a JsonValue,
    errors: Vec<ValidationError>,
}

impl<'a> FieldReader<'a> {
    pub fn new(object: &'a JsonValue) -> Result<Self, DecodeError> {
        if !object.is_object() {
            return Err(DecodeError::NotAnObject);
        }
        Ok(Self {
            object,
            errors: Vec::new(),
        })
    }

    fn required(&mut self, key: &str) -> Option<&'a JsonValue> {
        let value = self.object.get(key);
        if value.is_none() {
            self.fail(key, format!("{} is required", key));
        }
        value
    }

    fn fail(&mut self, key: &str, message: String) {
        self.errors.push(ValidationError::new(key, message));
    }

    pub fn required_string(&mut self, key: &str) -> Option<String> {
        let value = self.required(key)?;
        match value.as_str() {
            Some(text) => Some(text.to_string()),
            None => {
                self.fail(key, format!("{} must be a string", key));
                None
            }
        }
    }

    pub fn optional_string(&mut self, key: &str) -> Option<String> {
        let value = self.object.get(key)?;
        match value.as_str() {
            Some(text) => Some(text.to_string()),
            None => {
                self.fail(key, format!("{} must be a string", key));
                None
            }
        }
    }

    pub fn required_integer(&mut self, key: &str) -> Option<i64> {
        let value = self.required(key)?;
        let Some(number) = value.as_f64() else {
            self.fail(key, format!("{} must be a number", key));
            return None;
        };
        if number.fract() != 0.0 || number.abs() > i64::MAX as f64 {
            self.fail(key, format!("{} must be an integer", key));
            return None;
        }
        Some(number as i64)
    }

    pub fn required_bool(&mut self, key: &str) -> Option<bool> {
        let value = self.required(key)?;
        let flag = value.as_bool();
        if flag.is_none() {
            self.fail(key, format!("{} must be a boolean", key));
        }
        flag
    }

    pub fn required_string_array(&mut self, key: &str) -> Option<Vec<String>> {
        let value = self.required(key)?;
        let Some(items) = value.as_array() else {
            self.fail(key, format!("{} must be an array", key));
            return None;
        };

        let mut output = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match item.as_str() {
                Some(text) => output.push(text.to_string()),
                None => self.fail(key, format!("{}[{}] must be a string", key, index)),
            }
        }
        Some(output)
    }

    /// Errors collected so far, consuming the reader.
    pub fn finish(self) -> Result<(), DecodeError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::Fields(self.errors))
        }
    }
}

/// Decode a `POST /api/v1/config/core` body.
///
/// All `CoreConfig` fields are required; the two passwords are optional.
pub fn decode_save_request(body: &JsonValue) -> Result<SaveRequest, DecodeError> {
    let mut reader = FieldReader::new(body)?;

    let wifi_ssid = reader.required_string("wifi_ssid");
    let mqtt_host = reader.required_string("mqtt_host");
    let mqtt_port = reader.required_integer("mqtt_port");
    let mqtt_client_id = reader.required_string("mqtt_client_id");
    let mqtt_username = reader.required_string("mqtt_username");
    let mqtt_tls_enabled = reader.required_bool("mqtt_tls_enabled");
    let mqtt_tls_validate_certificate = reader.required_bool("mqtt_tls_validate_certificate");
    let mqtt_tls_ca_file = reader.required_string("mqtt_tls_ca_file");
    let mqtt_tls_cert_file = reader.required_string("mqtt_tls_cert_file");
    let mqtt_tls_key_file = reader.required_string("mqtt_tls_key_file");
    let mqtt_topics = reader.required_string_array("mqtt_topics");
    let ring_topic = reader.required_string("ring_topic");
    let wifi_password = reader.optional_string("wifi_password");
    let mqtt_password = reader.optional_string("mqtt_password");

    reader.finish()?;

    Ok(SaveRequest {
        config: CoreConfig {
            wifi_ssid: wifi_ssid.unwrap_or_default(),
            mqtt_host: mqtt_host.unwrap_or_default(),
            mqtt_port: mqtt_port.unwrap_or_default(),
            mqtt_client_id: mqtt_client_id.unwrap_or_default(),
            mqtt_username: mqtt_username.unwrap_or_default(),
            mqtt_tls_enabled: mqtt_tls_enabled.unwrap_or_default(),
            mqtt_tls_validate_certificate: mqtt_tls_validate_certificate.unwrap_or_default(),
            mqtt_tls_ca_file: mqtt_tls_ca_file.unwrap_or_default(),
            mqtt_tls_cert_file: mqtt_tls_cert_file.unwrap_or_default(),
            mqtt_tls_key_file: mqtt_tls_key_file.unwrap_or_default(),
            mqtt_topics: mqtt_topics.unwrap_or_default(),
            ring_topic: ring_topic.unwrap_or_default(),
        },
        wifi_password,
        mqtt_password,
    })
}
