//! Built-in page served at `/` when no external UI is installed.

use chime_server::HttpResponse;

const FALLBACK_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Chime Web Console Unavailable</title>
<style>
body { margin: 0; min-height: 100vh; display: grid; place-items: center; font-family: system-ui, sans-serif; background: #f3f4f6; color: #1f2937; }
main { max-width: 32rem; padding: 2rem; background: #fff; border-radius: 0.5rem; box-shadow: 0 1px 4px rgba(0, 0, 0, 0.15); }
h1 { margin-top: 0; font-size: 1.4rem; }
code { background: #e5e7eb; padding: 0 0.25rem; border-radius: 0.25rem; }
</style>
</head>
<body>
<main>
<h1>Web UI Unavailable</h1>
<p>The configuration interface could not be found on this device.</p>
<p>Build the UI assets, point <code>CHIME_WEBD_UI_DIST_DIR</code> at the build output and restart <code>chime-webd</code>.</p>
<p>The JSON API under <code>/api/v1/</code> is still available.</p>
</main>
</body>
</html>
"#;

pub fn fallback_page() -> HttpResponse {
    HttpResponse::html(200, FALLBACK_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_page() {
        let response = fallback_page();
        assert_eq!(response.status, 200);
        assert!(response.content_type.starts_with("text/html"));
        let body = String::from_utf8(response.body).unwrap();
        assert!(body.contains("<h1>Web UI Unavailable</h1>"));
        assert!(body.contains("CHIME_WEBD_UI_DIST_DIR"));
    }
}
