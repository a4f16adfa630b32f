//! Serving the external single-page UI from a directory on disk.
//!
//! - `/` serves `index.html`
//! - other paths map onto files under the root; `..` components are a 404
//! - extensionless paths outside `/assets/` fall back to `index.html`, so
//!   client-side routes survive a reload
//!
//! HTML is `no-cache`, hashed `/assets/` files are cached for a year and
//! everything else for an hour.

use std::fs;
use std::path::{Component, Path};

use chime_server::HttpResponse;
use tracing::warn;

use crate::routes::not_found;

const INDEX_FILE: &str = "index.html";
const ASSETS_PREFIX: &str = "/assets/";

pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "woff2" => "font/woff2",
        "woff" => "font/woff",
        _ => "application/octet-stream",
    }
}

pub fn cache_control_for(request_path: &str, path: &Path) -> &'static str {
    let is_html = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("html"));

    if is_html {
        "no-cache"
    } else if request_path.starts_with(ASSETS_PREFIX) {
        "public, max-age=31536000, immutable"
    } else {
        "public, max-age=3600"
    }
}

/// `None` when the root is not a directory, or for `/` without an
/// `index.html`. The caller then falls back to the built-in page or a 404.
pub fn try_serve(root: &Path, request_path: &str) -> Option<HttpResponse> {
    if !request_path.starts_with('/') || request_path.starts_with("/api/") || !root.is_dir() {
        return None;
    }

    if request_path == "/" {
        return serve_file(&root.join(INDEX_FILE), "/");
    }

    let relative = Path::new(request_path.trim_start_matches('/'));
    let traverses = relative.components().any(|c| matches!(c, Component::ParentDir));
    if relative.as_os_str().is_empty() || traverses {
        return Some(not_found());
    }

    if let Some(response) = serve_file(&root.join(relative), request_path) {
        return Some(response);
    }

    if !request_path.starts_with(ASSETS_PREFIX) && relative.extension().is_none() {
        if let Some(response) = serve_file(&root.join(INDEX_FILE), "/") {
            return Some(response);
        }
    }

    Some(not_found())
}

fn serve_file(path: &Path, request_path: &str) -> Option<HttpResponse> {
    if !path.is_file() {
        return None;
    }

    match fs::read(path) {
        Ok(body) => Some(
            HttpResponse::new(200)
                .with_body(content_type_for(path), body)
                .with_cache_control(cache_control_for(request_path, path)),
        ),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read UI file");
            Some(HttpResponse::error(500, "ui_read_failed"))
        }
    }
}
