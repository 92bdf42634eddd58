//! Document extraction backends.
//!
//! | Provider | Backend |
//! |----------|---------|
//! | `http` | [`HttpExtractor`]: the document-understanding service |
//! | `file` | [`FileExtractor`]: a pre-computed entity tree next to a local document |
//!
//! Neither backend retries. A failed extraction surfaces once, as an error,
//! and the pipeline reports it as a processing failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use labflow_core::extraction::{DocumentExtractor, ExtractedDocument};
use tracing::debug;

use crate::config::ExtractorConfig;

/// Extractor backed by an HTTP document-understanding endpoint.
///
/// Sends `POST {endpoint}` with `{"document_uri": ..., "mime_type": ...}`
/// and expects an [`ExtractedDocument`] JSON body. When `api_key_env` is
/// configured, the named environment variable is read on each call and sent
/// as a bearer token.
pub struct HttpExtractor {
    client: reqwest::Client,
    endpoint: String,
    api_key_env: Option<String>,
}

impl HttpExtractor {
    /// # Errors
    ///
    /// Returns an error if `endpoint` is not set or the client cannot be
    /// built.
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("extractor.endpoint required for http provider"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key_env: config.api_key_env.clone(),
        })
    }
}

#[async_trait]
impl DocumentExtractor for HttpExtractor {
    fn name(&self) -> &str {
        "http"
    }

    async fn extract(&self, document_uri: &str, mime_type: &str) -> Result<ExtractedDocument> {
        let body = serde_json::json!({
            "document_uri": document_uri,
            "mime_type": mime_type,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(var) = &self.api_key_env {
            let key =
                std::env::var(var).with_context(|| format!("{var} environment variable not set"))?;
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("extractor request to {} failed", self.endpoint))?;

        let status = response.status();
        debug!(endpoint = %self.endpoint, %status, "extractor responded");
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("extractor error {}: {}", status, body_text);
        }

        response
            .json::<ExtractedDocument>()
            .await
            .context("extractor returned an unparsable body")
    }
}

/// Extractor that reads `<document>.entities.json` from disk.
///
/// Useful for offline runs and tests: the entity tree a real extractor
/// would return is saved next to the document it describes.
pub struct FileExtractor;

impl FileExtractor {
    /// Sidecar path for a document URI; a `file://` prefix is accepted.
    pub fn entities_path(document_uri: &str) -> PathBuf {
        let local = document_uri
            .strip_prefix("file://")
            .unwrap_or(document_uri);
        let mut path = Path::new(local).as_os_str().to_owned();
        path.push(".entities.json");
        PathBuf::from(path)
    }
}

#[async_trait]
impl DocumentExtractor for FileExtractor {
    fn name(&self) -> &str {
        "file"
    }

    async fn extract(&self, document_uri: &str, _mime_type: &str) -> Result<ExtractedDocument> {
        let path = Self::entities_path(document_uri);
        debug!(path = %path.display(), "reading entity file");
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read entity file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse entity file: {}", path.display()))
    }
}

/// Build the configured extractor.
pub fn create_extractor(config: &ExtractorConfig) -> Result<Arc<dyn DocumentExtractor>> {
    match config.provider.as_str() {
        "http" => Ok(Arc::new(HttpExtractor::new(config)?)),
        "file" => Ok(Arc::new(FileExtractor)),
        other => bail!("Unknown extractor provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn http_config(endpoint: &str) -> ExtractorConfig {
        ExtractorConfig {
            provider: "http".into(),
            endpoint: Some(endpoint.into()),
            api_key_env: None,
            timeout_secs: 5,
        }
    }

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let mut request = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= split + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://{addr}/extract"), handle)
    }

    #[tokio::test]
    async fn test_http_extractor_posts_uri_and_mime() {
        let (endpoint, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"text":"LAUDO","entities":[{"type":"patient_name","mention_text":"Ana Silva"}]}"#,
        )
        .await;
        let extractor = HttpExtractor::new(&http_config(&endpoint)).unwrap();

        let doc = extractor
            .extract("gs://bucket/laudo.pdf", "application/pdf")
            .await
            .unwrap();

        assert_eq!(doc.text.as_deref(), Some("LAUDO"));
        assert_eq!(doc.entities[0].mention_text.as_deref(), Some("Ana Silva"));
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /extract"));
        assert!(request.contains(r#""document_uri":"gs://bucket/laudo.pdf""#));
        assert!(request.contains(r#""mime_type":"application/pdf""#));
    }

    #[tokio::test]
    async fn test_http_extractor_non_success_is_error() {
        let (endpoint, server) = serve_once("HTTP/1.1 503 Service Unavailable", "{}").await;
        let extractor = HttpExtractor::new(&http_config(&endpoint)).unwrap();

        let err = extractor
            .extract("gs://bucket/laudo.pdf", "application/pdf")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_extractor_malformed_body_is_error() {
        let (endpoint, server) = serve_once("HTTP/1.1 200 OK", "not json").await;
        let extractor = HttpExtractor::new(&http_config(&endpoint)).unwrap();

        assert!(extractor
            .extract("gs://bucket/laudo.pdf", "application/pdf")
            .await
            .is_err());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_api_key_env_fails_extraction() {
        let mut config = http_config("http://127.0.0.1:9/extract");
        config.api_key_env = Some("LABFLOW_TEST_TOKEN_THAT_IS_NOT_SET".into());
        let extractor = HttpExtractor::new(&config).unwrap();

        let err = extractor
            .extract("gs://bucket/laudo.pdf", "application/pdf")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("LABFLOW_TEST_TOKEN_THAT_IS_NOT_SET"));
    }

    #[test]
    fn test_entities_path() {
        assert_eq!(
            FileExtractor::entities_path("file:///tmp/laudo.pdf"),
            PathBuf::from("/tmp/laudo.pdf.entities.json")
        );
        assert_eq!(
            FileExtractor::entities_path("scans/laudo.png"),
            PathBuf::from("scans/laudo.png.entities.json")
        );
    }

    #[tokio::test]
    async fn test_file_extractor_reads_sidecar() {
        let tmp = tempfile::TempDir::new().unwrap();
        let doc_path = tmp.path().join("laudo.pdf");
        std::fs::write(&doc_path, b"%PDF-1.4").unwrap();
        std::fs::write(
            tmp.path().join("laudo.pdf.entities.json"),
            r#"{"entities":[{"type":"lab_name","mention_text":"Lab Central"}]}"#,
        )
        .unwrap();

        let uri = format!("file://{}", doc_path.display());
        let doc = FileExtractor.extract(&uri, "application/pdf").await.unwrap();
        assert_eq!(doc.entities[0].entity_type, "lab_name");

        let missing = tmp.path().join("other.pdf");
        assert!(FileExtractor
            .extract(missing.to_str().unwrap(), "application/pdf")
            .await
            .is_err());
    }
}
