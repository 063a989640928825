//! Mirror that uploads archived files over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::config::MirrorConfig;
use super::error::MirrorError;
use super::traits::RemoteMirror;

/// Uploads with `PUT {base_url}/{category}/{file_name}`.
pub struct HttpMirror {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpMirror {
    pub fn new(config: &MirrorConfig) -> Result<Self, MirrorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MirrorError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    /// Full URL for a remote path, each segment percent-encoded.
    pub fn url_for(&self, remote_path: &str) -> String {
        let encoded: Vec<String> = remote_path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/{}", self.base_url, encoded.join("/"))
    }
}

#[async_trait]
impl RemoteMirror for HttpMirror {
    fn name(&self) -> &str {
        "http"
    }

    async fn upload(&self, local: &Path, remote_path: &str) -> Result<(), MirrorError> {
        let body = tokio::fs::read(local)
            .await
            .map_err(|source| MirrorError::Read {
                path: local.to_path_buf(),
                source,
            })?;
        let url = self.url_for(remote_path);
        debug!(%url, bytes = body.len(), "Uploading to mirror");

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/csv; charset=utf-8")
            .body(body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                MirrorError::Timeout
            } else {
                MirrorError::Request(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::Status {
                status,
                body: body.chars().take(200).collect(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror(base_url: &str) -> HttpMirror {
        HttpMirror::new(&MirrorConfig {
            base_url: base_url.to_string(),
            api_token: None,
            timeout_secs: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_url_for() {
        let mirror = mirror("https://storage.example.org/curation/");
        assert_eq!(
            mirror.url_for("accepted/batch_0.csv"),
            "https://storage.example.org/curation/accepted/batch_0.csv"
        );
        assert_eq!(
            mirror.url_for("rejected/batch 1.csv"),
            "https://storage.example.org/curation/rejected/batch%201.csv"
        );
    }

    #[tokio::test]
    async fn test_unreadable_file() {
        let mirror = mirror("http://127.0.0.1:9");
        let result = mirror
            .upload(Path::new("/nonexistent/batch_0.csv"), "accepted/batch_0.csv")
            .await;
        assert!(matches!(result, Err(MirrorError::Read { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "yoruba_text,english_text\n").unwrap();

        let mirror = mirror("http://127.0.0.1:9");
        let result = mirror.upload(temp.path(), "accepted/batch_0.csv").await;
        assert!(matches!(
            result,
            Err(MirrorError::Request(_)) | Err(MirrorError::Timeout)
        ));
    }
}
