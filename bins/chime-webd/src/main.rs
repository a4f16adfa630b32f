mod settings;

use anyhow::Context;
use chime_core::ConfigStore;
use chime_server::WebServer;
use chime_system::{ApplyManager, MdnsResponder, WifiScanner};
use chime_web::{Router, WebState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::settings::Settings;

const DEFAULT_LOG_FILTER: &str =
    "chime_webd=info,chime_server=info,chime_web=info,chime_system=info,chime_core=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load().context("failed to load settings")?;
    let interface = settings.resolve_wifi_interface();

    tracing::info!(
        chime_config = %settings.chime_config_path().display(),
        interface = %interface,
        "chime-webd starting"
    );

    let store = ConfigStore::new(settings.chime_config.clone(), settings.wpa_supplicant.clone());
    let scanner = WifiScanner::new(interface.clone());
    let apply = ApplyManager::new(settings.apply_config());
    let state = WebState::new(store, scanner, apply, settings.web_config());

    let server_config = settings.server_config().context("invalid listen address")?;
    let server = WebServer::bind(server_config, Router::new(state))
        .await
        .context("failed to start HTTPS server")?;

    let mut mdns = if settings.mdns_enabled {
        let config = settings.mdns_config(&interface);
        let host_name = config.host_name();
        match MdnsResponder::start(config) {
            Ok(responder) => {
                tracing::info!(host = %host_name, "mDNS responder started");
                Some(responder)
            }
            Err(e) => {
                tracing::warn!(error = %e, "mDNS responder unavailable, continuing without it");
                None
            }
        }
    } else {
        None
    };

    let server_handle = tokio::spawn(server.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = server_handle => {
            tracing::warn!("HTTPS server stopped");
        }
    }

    if let Some(responder) = mdns.as_mut() {
        responder.stop();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
