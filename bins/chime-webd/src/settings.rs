//! Process settings.
//!
//! Built-in defaults overlaid with `CHIME_WEBD_*` environment variables,
//! e.g. `CHIME_WEBD_PORT=9443` or `CHIME_WEBD_UI_DIST_DIR=/srv/ui`.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use chime_core::kv;
use chime_server::ServerConfig;
use chime_system::{ApplyConfig, MdnsConfig};
use chime_web::WebConfig;
use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_PREFIX: &str = "CHIME_WEBD_";
pub const DEFAULT_WIFI_INTERFACE: &str = "wlan0";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("invalid bind address '{0}'")]
    BindAddress(String),
}

impl From<figment::Error> for SettingsError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub chime_config: PathBuf,
    pub wpa_supplicant: PathBuf,
    pub tls_cert: PathBuf,
    pub tls_key: PathBuf,
    /// Empty disables the external UI.
    pub ui_dist_dir: String,
    pub observed_topics_path: PathBuf,
    pub ring_sounds_dir: PathBuf,
    pub active_ring_sound: PathBuf,
    pub bind_address: String,
    pub port: u16,
    pub host_label: String,
    /// Falls back to `wifi_interface=` in the chime config, then `wlan0`.
    pub wifi_interface: Option<String>,
    pub network_restart_cmd: String,
    pub chime_restart_cmd: String,
    pub mdns_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let web = WebConfig::default();
        let apply = ApplyConfig::default();
        let server = ServerConfig::default();
        Self {
            chime_config: PathBuf::from("/etc/chime.conf"),
            wpa_supplicant: PathBuf::from("/etc/wpa_supplicant/wpa_supplicant.conf"),
            tls_cert: server.cert_path,
            tls_key: server.key_path,
            ui_dist_dir: web
                .ui_dist_dir
                .map(|dir| dir.display().to_string())
                .unwrap_or_default(),
            observed_topics_path: web.observed_topics_path,
            ring_sounds_dir: web.ring_sounds_dir,
            active_ring_sound: web.active_ring_sound,
            bind_address: "0.0.0.0".to_string(),
            port: 8443,
            host_label: MdnsConfig::default().host_label,
            wifi_interface: None,
            network_restart_cmd: apply.network_restart_cmd,
            chime_restart_cmd: apply.chime_restart_cmd,
            mdns_enabled: true,
        }
    }
}

impl Settings {
    /// Defaults overlaid with the process environment.
    pub fn load() -> Result<Self, SettingsError> {
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, SettingsError> {
        Ok(figment.extract()?)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        let ip: IpAddr = self
            .bind_address
            .trim()
            .parse()
            .map_err(|_| SettingsError::BindAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// The explicit setting, else the chime config's `wifi_interface`, else
    /// `wlan0`.
    pub fn resolve_wifi_interface(&self) -> String {
        self.wifi_interface
            .as_deref()
            .map(kv::trim)
            .filter(|iface| !iface.is_empty())
            .map(str::to_string)
            .or_else(|| kv::read_value(&self.chime_config, "wifi_interface"))
            .unwrap_or_else(|| DEFAULT_WIFI_INTERFACE.to_string())
    }

    pub fn server_config(&self) -> Result<ServerConfig, SettingsError> {
        Ok(ServerConfig {
            bind_addr: self.bind_addr()?,
            cert_path: self.tls_cert.clone(),
            key_path: self.tls_key.clone(),
            ..ServerConfig::default()
        })
    }

    pub fn web_config(&self) -> WebConfig {
        let ui_dist_dir = kv::trim(&self.ui_dist_dir);
        WebConfig {
            ui_dist_dir: (!ui_dist_dir.is_empty()).then(|| PathBuf::from(ui_dist_dir)),
            observed_topics_path: self.observed_topics_path.clone(),
            ring_sounds_dir: self.ring_sounds_dir.clone(),
            active_ring_sound: self.active_ring_sound.clone(),
        }
    }

    pub fn apply_config(&self) -> ApplyConfig {
        ApplyConfig {
            network_restart_cmd: self.network_restart_cmd.clone(),
            chime_restart_cmd: self.chime_restart_cmd.clone(),
        }
    }

    pub fn mdns_config(&self, interface: &str) -> MdnsConfig {
        MdnsConfig {
            host_label: self.host_label.clone(),
            interface: interface.to_string(),
        }
    }

    pub fn chime_config_path(&self) -> &Path {
        &self.chime_config
    }
}
