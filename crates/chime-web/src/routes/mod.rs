//! HTTP route handlers.
//!
//! Routes are matched on the exact path first, then on prefixes:
//!
//! - `/api/v1/config/core` - GET, POST
//! - `/api/v1/wifi/scan` - GET
//! - `/api/v1/mqtt/topics` - GET
//! - `/api/v1/ring/sounds` - GET
//! - `/api/v1/ring/sounds/select` - POST
//! - `/api/v1/ring/sounds/<name>` - PUT
//! - `/api/v1/{system,device,diagnostics}[/...]` - 501, reserved
//! - anything else - the external UI, the fallback page, or 404

pub mod config;
pub mod reserved;
pub mod ring;
pub mod topics;
pub mod wifi;

use chime_server::{HttpRequest, HttpResponse};
use tracing::error;

use crate::{static_files, ui, AppState};

pub const CORE_CONFIG_PATH: &str = "/api/v1/config/core";
pub const WIFI_SCAN_PATH: &str = "/api/v1/wifi/scan";
pub const MQTT_TOPICS_PATH: &str = "/api/v1/mqtt/topics";
pub const RING_SOUNDS_PATH: &str = "/api/v1/ring/sounds";
pub const RING_SELECT_PATH: &str = "/api/v1/ring/sounds/select";
pub const RING_SOUND_PREFIX: &str = "/api/v1/ring/sounds/";

/// Route one request.
pub async fn dispatch(state: &AppState, request: HttpRequest) -> HttpResponse {
    let method = request.method.clone();
    let path = request.path.clone();

    match path.as_str() {
        CORE_CONFIG_PATH => match method.as_str() {
            "GET" => config::get_core_config(state).await,
            "POST" => config::post_core_config(state, request).await,
            _ => method_not_allowed(),
        },
        WIFI_SCAN_PATH if method == "GET" => wifi::scan(state).await,
        MQTT_TOPICS_PATH if method == "GET" => topics::observed_topics(state).await,
        RING_SOUNDS_PATH if method == "GET" => ring::list(state).await,
        RING_SELECT_PATH if method == "POST" => ring::select(state, request).await,
        WIFI_SCAN_PATH | MQTT_TOPICS_PATH | RING_SOUNDS_PATH | RING_SELECT_PATH => method_not_allowed(),
        _ => {
            if let Some(name) = path.strip_prefix(RING_SOUND_PREFIX) {
                return if method == "PUT" {
                    ring::upload(state, name.to_string(), request).await
                } else {
                    method_not_allowed()
                };
            }
            if reserved::is_reserved(&path) {
                return reserved::not_implemented(&path);
            }
            serve_ui(state, &method, &path).await
        }
    }
}

async fn serve_ui(state: &AppState, method: &str, path: &str) -> HttpResponse {
    if method == "GET" && !path.starts_with("/api/") {
        if let Some(root) = state.config.ui_dist_dir.clone() {
            let request_path = path.to_string();
            let served = run_blocking(move || static_files::try_serve(&root, &request_path)).await;
            match served {
                Ok(Some(response)) => return response,
                Ok(None) => {}
                Err(response) => return response,
            }
        }
    }

    if path == "/" {
        return if method == "GET" {
            ui::fallback_page()
        } else {
            method_not_allowed()
        };
    }

    not_found()
}

pub fn method_not_allowed() -> HttpResponse {
    HttpResponse::error(405, "method_not_allowed")
}

pub fn not_found() -> HttpResponse {
    HttpResponse::error(404, "not_found")
}

/// Run blocking work on the blocking pool. A panicked task becomes a 500.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, HttpResponse>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!(error = %e, "blocking handler task failed");
        HttpResponse::error_message(500, "internal_error", "handler task failed")
    })
}
