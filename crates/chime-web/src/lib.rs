//! # chime-web
//!
//! REST API and static UI for the doorbell control plane.
//!
//! This crate provides:
//! - The route table and its handlers (`/api/v1/...`)
//! - Ring sound upload, listing and selection
//! - Serving an external single-page UI, with a built-in fallback page
//!
//! ## Architecture
//!
//! [`Router`] implements [`chime_server::RequestHandler`]. Handlers are async
//! but the config store and filesystem work they do is blocking, so that
//! work is moved onto tokio's blocking pool.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chime_web::{Router, WebConfig, WebState};
//!
//! let state = WebState::new(store, scanner, apply, WebConfig::default());
//! let server = WebServer::bind(server_config, Router::new(state)).await?;
//! server.run().await;
//! ```

pub mod routes;
pub mod static_files;
pub mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use chime_core::ConfigStore;
use chime_server::{HttpRequest, HttpResponse, RequestHandler};
use chime_system::{ApplyManager, WifiScanner};

/// Filesystem locations the handlers work with.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Built single-page UI. `None` serves only the fallback page.
    pub ui_dist_dir: Option<PathBuf>,
    /// Topics the doorbell daemon has seen, one per line.
    pub observed_topics_path: PathBuf,
    /// Uploaded `ring-*.wav` files and `selected.txt`.
    pub ring_sounds_dir: PathBuf,
    /// The file the doorbell daemon plays.
    pub active_ring_sound: PathBuf,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            ui_dist_dir: Some(PathBuf::from("/usr/local/share/chime-web-ui/dist")),
            observed_topics_path: PathBuf::from("/var/lib/chime/observed_topics.txt"),
            ring_sounds_dir: PathBuf::from("/var/lib/chime/ring_sounds"),
            active_ring_sound: PathBuf::from("/usr/local/share/chime/ring.wav"),
        }
    }
}

/// Shared state for all route handlers.
pub struct WebState {
    pub store: ConfigStore,
    pub scanner: WifiScanner,
    pub apply: ApplyManager,
    pub config: WebConfig,
}

impl WebState {
    pub fn new(store: ConfigStore, scanner: WifiScanner, apply: ApplyManager, config: WebConfig) -> Self {
        Self {
            store,
            scanner,
            apply,
            config,
        }
    }
}

/// Type alias for shared state in handlers.
pub type AppState = Arc<WebState>;

/// Dispatches requests to the route handlers.
#[derive(Clone)]
pub struct Router {
    state: AppState,
}

impl Router {
    pub fn new(state: WebState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

impl RequestHandler for Router {
    async fn handle(&self, request: HttpRequest) -> HttpResponse {
        routes::dispatch(&self.state, request).await
    }
}
