use async_trait::async_trait;
use bytes::Bytes;
use loader_config::LoaderConfig;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::cache::ResponseMetadata;
use crate::request::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Network side of a load.
///
/// Status codes are the transport's business: a response that arrives is a
/// success as far as the loader is concerned.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<(Bytes, ResponseMetadata), TransportError>;
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &LoaderConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, url: &Url) -> Result<(Bytes, ResponseMetadata), TransportError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::UnsupportedScheme(url.scheme().to_string()));
        }

        let response = self.client.get(url.clone()).send().await?;

        let mut metadata = ResponseMetadata::new(response.url(), response.status().as_u16());
        metadata.headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        metadata.content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let payload = response.bytes().await?;
        debug!(
            "Fetched {} ({} bytes, status {})",
            url,
            payload.len(),
            metadata.status
        );

        Ok((payload, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_builds_from_config() {
        let config = LoaderConfig {
            request_timeout_secs: 5,
            ..LoaderConfig::default()
        };
        assert!(ReqwestTransport::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let config = LoaderConfig {
            request_timeout_secs: 2,
            ..LoaderConfig::default()
        };
        let transport = ReqwestTransport::new(&config).unwrap();

        // Port 9 on loopback is discard; nothing listens there in test environments
        let url = Url::parse("http://127.0.0.1:9/image.png").unwrap();
        let result = transport.fetch(&url).await;
        assert!(matches!(result, Err(TransportError::Request(_))));
    }

    #[tokio::test]
    async fn test_non_http_scheme_is_rejected() {
        let transport = ReqwestTransport::new(&LoaderConfig::default()).unwrap();

        let url = Url::parse("file:///tmp/image.png").unwrap();
        let result = transport.fetch(&url).await;
        assert!(matches!(
            result,
            Err(TransportError::UnsupportedScheme(scheme)) if scheme == "file"
        ));
    }
}
