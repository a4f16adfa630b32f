//! Core configuration routes.
//!
//! # Endpoints
//!
//! ### `GET /api/v1/config/core`
//! The current snapshot plus the apply status. Secrets are reported only as
//! `wifi_password_set` / `mqtt_password_set`.
//!
//! ### `POST /api/v1/config/core`
//! Validates and saves the full configuration, then starts an apply job.
//! Every `CoreConfig` field is required; `wifi_password` and `mqtt_password`
//! are optional and keep the stored secret when absent.

use chime_core::ConfigError;
use chime_protocol::codec::{encode_snapshot, validation_failed};
use chime_protocol::{decode_save_request, parse, DecodeError};
use chime_server::{HttpRequest, HttpResponse};
use tracing::{error, info, warn};

use super::run_blocking;
use crate::AppState;

pub async fn get_core_config(state: &AppState) -> HttpResponse {
    let worker = state.clone();
    let loaded = match run_blocking(move || worker.store.load_core_config()).await {
        Ok(loaded) => loaded,
        Err(response) => return response,
    };

    match loaded {
        Ok(snapshot) => HttpResponse::json(200, &encode_snapshot(&snapshot, &state.apply.current_status())),
        Err(e) => {
            warn!(error = %e, "failed to load core config");
            HttpResponse::error_message(500, "load_failed", &e.to_string())
        }
    }
}

pub async fn post_core_config(state: &AppState, request: HttpRequest) -> HttpResponse {
    let Ok(text) = std::str::from_utf8(&request.body) else {
        return HttpResponse::error_message(400, "invalid_json", "body is not valid UTF-8");
    };
    let body = match parse(text) {
        Ok(body) => body,
        Err(e) => return HttpResponse::error_message(400, "invalid_json", &e.to_string()),
    };

    let save_request = match decode_save_request(&body) {
        Ok(save_request) => save_request,
        Err(DecodeError::NotAnObject) => {
            return HttpResponse::error_message(400, "invalid_payload", "payload must be an object");
        }
        Err(DecodeError::Fields(errors)) => return HttpResponse::json(400, &validation_failed(&errors)),
    };

    let worker = state.clone();
    let saved = match run_blocking(move || worker.store.save_core_config(&save_request)).await {
        Ok(saved) => saved,
        Err(response) => return response,
    };

    match saved {
        Ok(snapshot) => {
            let apply = state.apply.start_apply();
            info!(ssid = %snapshot.config.wifi_ssid, job_id = apply.job_id, "core config saved");
            HttpResponse::json(200, &encode_snapshot(&snapshot, &apply))
        }
        Err(ConfigError::Validation(errors)) => {
            info!(count = errors.len(), "core config rejected");
            HttpResponse::json(400, &validation_failed(&errors))
        }
        Err(e) => {
            error!(error = %e, "failed to save core config");
            HttpResponse::error_message(500, "save_failed", &e.to_string())
        }
    }
}
