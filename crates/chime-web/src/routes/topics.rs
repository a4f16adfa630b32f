//! `GET /api/v1/mqtt/topics`
//!
//! Lists the topics the doorbell daemon has recorded seeing. This service
//! only reads the file.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use chime_core::kv::trim;
use chime_protocol::codec::encode_topics;
use chime_server::HttpResponse;
use tracing::warn;

use super::run_blocking;
use crate::AppState;

pub async fn observed_topics(state: &AppState) -> HttpResponse {
    let path = state.config.observed_topics_path.clone();
    match run_blocking(move || read_observed_topics(&path)).await {
        Ok(topics) => HttpResponse::json(200, &encode_topics(&topics)),
        Err(response) => response,
    }
}

/// Trimmed, non-empty, first occurrence wins. A missing file is an empty
/// list; an unreadable one is logged and also an empty list.
pub fn read_observed_topics(path: &Path) -> Vec<String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to open observed topics file");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    content
        .lines()
        .map(trim)
        .filter(|topic| !topic.is_empty() && seen.insert(*topic))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dedups_and_trims() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observed_topics.txt");
        fs::write(&path, "doorbell/ring\n  \n\tfront/motion \r\ndoorbell/ring\nback/door\n").unwrap();

        assert_eq!(
            read_observed_topics(&path),
            vec!["doorbell/ring", "front/motion", "back/door"]
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_observed_topics(&dir.path().join("absent.txt")).is_empty());
    }
}
