//! Placeholders for API areas that are reserved but not built yet.

use chime_protocol::JsonValue;
use chime_server::HttpResponse;

const RESERVED_ROOTS: &[&str] = &["/api/v1/system", "/api/v1/device", "/api/v1/diagnostics"];

/// A reserved root or anything beneath it.
pub fn is_reserved(path: &str) -> bool {
    RESERVED_ROOTS.iter().any(|root| {
        path.strip_prefix(root)
            .map_or(false, |rest| rest.is_empty() || rest.starts_with('/'))
    })
}

pub fn not_implemented(path: &str) -> HttpResponse {
    HttpResponse::json(
        501,
        &JsonValue::object([
            ("error", JsonValue::from("not_implemented")),
            ("message", JsonValue::from("reserved endpoint")),
            ("path", JsonValue::from(path)),
        ]),
    )
}
