//! Ring sound routes.
//!
//! # Endpoints
//!
//! ### `GET /api/v1/ring/sounds`
//! Lists the stored `ring-*.wav` files and the current selection. The first
//! call seeds `ring-default.wav` from the active ring sound.
//!
//! ### `PUT /api/v1/ring/sounds/<name>`
//! Stores a WAV upload under `<name>`.
//!
//! ### `POST /api/v1/ring/sounds/select`
//! Copies `{"name": ...}` over the active ring sound and records the choice
//! in `selected.txt`.
//!
//! # Files
//!
//! Everything lives in the configured ring sounds directory. Writes are
//! atomic (temp file + rename) so the doorbell daemon never plays a partial
//! file.

use std::fs;
use std::io;
use std::path::Path;

use chime_core::fsutil::{atomic_write, ensure_directory};
use chime_core::kv::trim;
use chime_protocol::{parse, JsonValue};
use chime_server::{HttpRequest, HttpResponse};
use tracing::{info, warn};

use super::run_blocking;
use crate::{AppState, WebConfig};

pub const DEFAULT_SOUND_NAME: &str = "ring-default.wav";
pub const SELECTED_FILE: &str = "selected.txt";

const MAX_NAME_LEN: usize = 128;
const SOUND_MODE: u32 = 0o644;

pub async fn list(state: &AppState) -> HttpResponse {
    let config = state.config.clone();
    run_blocking(move || list_sounds(&config))
        .await
        .unwrap_or_else(|response| response)
}

pub async fn upload(state: &AppState, name: String, request: HttpRequest) -> HttpResponse {
    let config = state.config.clone();
    run_blocking(move || upload_sound(&config, &name, &request))
        .await
        .unwrap_or_else(|response| response)
}

pub async fn select(state: &AppState, request: HttpRequest) -> HttpResponse {
    let config = state.config.clone();
    run_blocking(move || select_sound(&config, &request.body))
        .await
        .unwrap_or_else(|response| response)
}

// ============================================================================
// Validation
// ============================================================================

/// `ring-*.wav` (any case), at most 128 bytes of `[A-Za-z0-9._-]`, no `..`.
pub fn is_safe_sound_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return false;
    }
    let lowered = name.to_ascii_lowercase();
    if !lowered.starts_with("ring-") || !lowered.ends_with(".wav") {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// The MIME type of a `Content-Type` value, without parameters, lower-cased.
pub fn mime_type_only(content_type: &str) -> String {
    let raw = content_type.split(';').next().unwrap_or_default();
    trim(raw).to_ascii_lowercase()
}

/// `RIFF` at offset 0 and `WAVE` at offset 8.
pub fn looks_like_wav(body: &[u8]) -> bool {
    body.len() >= 12 && &body[..4] == b"RIFF" && &body[8..12] == b"WAVE"
}

fn invalid_name() -> HttpResponse {
    HttpResponse::error_message(400, "invalid_sound_name", "Use ring-*.wav")
}

fn not_a_wav() -> HttpResponse {
    HttpResponse::error_message(415, "invalid_payload", "payload is not a WAV file")
}

fn sounds_unavailable(dir: &Path, error: &io::Error) -> HttpResponse {
    warn!(dir = %dir.display(), error = %error, "ring sounds directory unavailable");
    HttpResponse::error_message(
        500,
        "ring_sounds_unavailable",
        &format!("{}: {}", dir.display(), error),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Copy the active ring sound in as `ring-default.wav` if that name is free.
fn seed_default_sound(config: &WebConfig) {
    let target = config.ring_sounds_dir.join(DEFAULT_SOUND_NAME);
    if !config.active_ring_sound.is_file() || target.exists() {
        return;
    }

    let seeded = fs::read(&config.active_ring_sound).and_then(|data| atomic_write(&target, &data, SOUND_MODE));
    match seeded {
        Ok(()) => info!(target = %target.display(), "seeded default ring sound"),
        Err(e) => warn!(
            source = %config.active_ring_sound.display(),
            error = %e,
            "failed to seed default ring sound"
        ),
    }
}

fn stored_sounds(dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to list ring sounds");
            return Vec::new();
        }
    };

    let mut sounds: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map_or(false, |t| t.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_safe_sound_name(name))
        .collect();
    sounds.sort();
    sounds
}

fn read_selection(path: &Path) -> String {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| content.lines().next().map(|line| trim(line).to_string()))
        .unwrap_or_default()
}

pub fn list_sounds(config: &WebConfig) -> HttpResponse {
    let dir = &config.ring_sounds_dir;
    if let Err(e) = ensure_directory(dir) {
        return sounds_unavailable(dir, &e);
    }

    seed_default_sound(config);

    let sounds = stored_sounds(dir);
    let selected_path = dir.join(SELECTED_FILE);
    let mut selected = read_selection(&selected_path);

    let valid = is_safe_sound_name(&selected) && sounds.contains(&selected);
    if !valid && !selected.is_empty() {
        info!(selected = %selected, "clearing stale ring sound selection");
        selected.clear();
        if let Err(e) = atomic_write(&selected_path, b"", SOUND_MODE) {
            warn!(path = %selected_path.display(), error = %e, "failed to clear invalid selected sound file");
        }
    }

    HttpResponse::json(
        200,
        &JsonValue::object([
            ("selected_sound", JsonValue::from(selected)),
            ("sounds", JsonValue::array(&sounds)),
        ]),
    )
}

pub fn upload_sound(config: &WebConfig, name: &str, request: &HttpRequest) -> HttpResponse {
    if !is_safe_sound_name(name) {
        return invalid_name();
    }
    if let Some(content_type) = request.content_type() {
        let mime = mime_type_only(content_type);
        if mime != "audio/wav" && mime != "audio/x-wav" {
            return not_a_wav();
        }
    }
    if !looks_like_wav(&request.body) {
        return not_a_wav();
    }

    let dir = &config.ring_sounds_dir;
    if let Err(e) = ensure_directory(dir) {
        return sounds_unavailable(dir, &e);
    }

    let path = dir.join(name);
    if let Err(e) = atomic_write(&path, &request.body, SOUND_MODE) {
        warn!(path = %path.display(), error = %e, "failed to store ring sound");
        return HttpResponse::error_message(500, "save_failed", "failed to write destination");
    }

    info!(name, bytes = request.body.len(), "stored ring sound");
    HttpResponse::json(200, &JsonValue::object([("uploaded", JsonValue::from(name))]))
}

pub fn select_sound(config: &WebConfig, body: &[u8]) -> HttpResponse {
    let parsed = std::str::from_utf8(body).ok().and_then(|text| parse(text).ok());
    let Some(payload) = parsed.filter(JsonValue::is_object) else {
        return HttpResponse::error_message(400, "invalid_json", "payload must be an object");
    };

    let Some(name) = payload.get("name").and_then(JsonValue::as_str) else {
        return invalid_name();
    };
    if !is_safe_sound_name(name) {
        return invalid_name();
    }

    let dir = &config.ring_sounds_dir;
    if let Err(e) = ensure_directory(dir) {
        return sounds_unavailable(dir, &e);
    }

    let source = dir.join(name);
    if !source.is_file() {
        return HttpResponse::error_message(404, "not_found", "sound file does not exist");
    }

    let target = &config.active_ring_sound;
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent) {
            return HttpResponse::error_message(
                500,
                "create_directory_failed",
                &format!("failed to create parent directory: {}", e),
            );
        }
    }

    let activated = fs::read(&source).and_then(|data| atomic_write(target, &data, SOUND_MODE));
    if let Err(e) = activated {
        warn!(source = %source.display(), target = %target.display(), error = %e, "failed to activate ring sound");
        return HttpResponse::error_message(500, "activate_failed", "failed to activate selected sound");
    }

    let selected_path = dir.join(SELECTED_FILE);
    let selection_persisted = match atomic_write(&selected_path, format!("{}\n", name).as_bytes(), SOUND_MODE) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %selected_path.display(), error = %e, "failed to write selected file");
            false
        }
    };

    info!(name, selection_persisted, "selected ring sound");
    HttpResponse::json(
        200,
        &JsonValue::object([
            ("selected", JsonValue::from(name)),
            ("selection_persisted", JsonValue::from(selection_persisted)),
        ]),
    )
}
