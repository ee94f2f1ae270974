//! Handler module: the downstream consumer of fetch results
//!
//! Every completed HTTP exchange is handed to a [`Handler`] exactly once,
//! out-of-band from the datastore writes. Indexers and archivers implement
//! this trait; [`PageWriterHandler`] is the reference implementation that
//! mirrors fetched pages onto the local filesystem.

use crate::storage::FetchResults;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Consumer of fetch results
///
/// Called once per fetched link whose HTTP exchange completed, whatever the
/// status code. Not called for transport failures, robots or pattern
/// exclusions, rejected content types, oversize bodies, or pages whose
/// honored meta directives suppress indexing.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle_response(&self, results: &FetchResults);
}

/// Writes fetched page bodies beneath an output directory
///
/// Each page lands at `<output_dir>/<host>/<sanitized path>`, so a small
/// crawl leaves a browsable mirror on disk.
pub struct PageWriterHandler {
    output_dir: PathBuf,
}

impl PageWriterHandler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// The configured output directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Maps a fetched URL to its on-disk location
    fn target_path(&self, results: &FetchResults) -> PathBuf {
        let mut path = self.output_dir.join(results.url.host());
        for segment in results
            .url
            .as_url()
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
        {
            path.push(sanitize_segment(segment));
        }
        if results.url.as_url().path().ends_with('/') || results.url.as_url().path() == "/" {
            path.push("index.html");
        }
        path
    }
}

/// Keeps path segments filesystem-safe without losing readability
fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

#[async_trait]
impl Handler for PageWriterHandler {
    async fn handle_response(&self, results: &FetchResults) {
        let Some(body) = &results.body else {
            return;
        };

        let path = self.target_path(results);
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!("Failed to create {}: {}", parent.display(), e);
                return;
            }
        }

        match tokio::fs::write(&path, body).await {
            Ok(()) => tracing::debug!("Wrote {} to {}", results.url, path.display()),
            Err(e) => tracing::warn!("Failed to write {}: {}", path.display(), e),
        }
    }
}

/// A handler that drops every result, for fetch-only deployments
pub struct NoopHandler;

#[async_trait]
impl Handler for NoopHandler {
    async fn handle_response(&self, _results: &FetchResults) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::Normalizer;

    fn results_for(url: &str, body: Option<&str>) -> FetchResults {
        let mut results = FetchResults::new(Normalizer::default().parse(url).unwrap());
        results.body = body.map(|b| b.to_string());
        results
    }

    #[test]
    fn test_target_path_includes_host() {
        let handler = PageWriterHandler::new("/tmp/out");
        let path = handler.target_path(&results_for("http://a.com/dir/page.html", None));
        assert_eq!(path, PathBuf::from("/tmp/out/a.com/dir/page.html"));
    }

    #[test]
    fn test_target_path_directory_gets_index() {
        let handler = PageWriterHandler::new("/tmp/out");
        let path = handler.target_path(&results_for("http://a.com/dir/", None));
        assert_eq!(path, PathBuf::from("/tmp/out/a.com/dir/index.html"));

        let path = handler.target_path(&results_for("http://a.com/", None));
        assert_eq!(path, PathBuf::from("/tmp/out/a.com/index.html"));
    }

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("page.html"), "page.html");
        assert_eq!(sanitize_segment("a:b*c"), "a_b_c");
        assert_eq!(sanitize_segment("..sneaky"), "sneaky");
    }

    #[tokio::test]
    async fn test_writes_body_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let handler = PageWriterHandler::new(dir.path());

        handler
            .handle_response(&results_for("http://a.com/page.html", Some("<html>hi</html>")))
            .await;

        let written = std::fs::read_to_string(dir.path().join("a.com/page.html")).unwrap();
        assert_eq!(written, "<html>hi</html>");
    }

    #[tokio::test]
    async fn test_skips_bodyless_results() {
        let dir = tempfile::tempdir().unwrap();
        let handler = PageWriterHandler::new(dir.path());

        handler
            .handle_response(&results_for("http://a.com/page.html", None))
            .await;

        assert!(!dir.path().join("a.com").exists());
    }
}
