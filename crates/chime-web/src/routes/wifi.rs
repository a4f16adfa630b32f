//! `GET /api/v1/wifi/scan`

use chime_protocol::codec::encode_networks;
use chime_server::HttpResponse;

use crate::AppState;

/// Scan and list nearby networks, strongest first. 503 when every scan
/// strategy failed.
pub async fn scan(state: &AppState) -> HttpResponse {
    match state.scanner.scan().await {
        Ok(networks) => HttpResponse::json(200, &encode_networks(&networks)),
        Err(e) => HttpResponse::error_message(503, "scan_failed", &e.to_string()),
    }
}
