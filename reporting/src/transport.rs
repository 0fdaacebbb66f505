use crate::config::HttpConfig;
use async_trait::async_trait;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server answered {0}")]
    Status(reqwest::StatusCode),
}

/// Fire-and-forget GET transport for resolved beacon URIs.
///
/// The trait is the interception seam for development overrides: tests swap
/// in a recording implementation or point the HTTP client at a local mock
/// server.
#[async_trait]
pub trait BeaconTransport: Send + Sync {
    async fn fetch_and_discard(&self, uri: &Url) -> Result<(), TransportError>;
}

/// Production transport over a shared `reqwest` client. Connect and
/// whole-request timeouts are fixed at construction; individual sends carry
/// no overrides.
pub struct HttpBeaconTransport {
    client: reqwest::Client,
}

impl HttpBeaconTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Ok(HttpBeaconTransport { client })
    }
}

#[async_trait]
impl BeaconTransport for HttpBeaconTransport {
    async fn fetch_and_discard(&self, uri: &Url) -> Result<(), TransportError> {
        let response = self.client.get(uri.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status));
        }
        // The response body carries no contract and is dropped unread.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpBeaconTransport {
        HttpBeaconTransport::new(&HttpConfig {
            connect_timeout_ms: 1_000,
            request_timeout_ms: 1_000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn successful_get_discards_the_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reportLoss"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ignored"))
            .expect(1)
            .mount(&server)
            .await;

        let uri = Url::parse(&format!("{}/reportLoss", server.uri())).unwrap();
        transport().fetch_and_discard(&uri).await.unwrap();
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let uri = Url::parse(&format!("{}/reportLoss", server.uri())).unwrap();
        let err = transport().fetch_and_discard(&uri).await.unwrap_err();

        assert!(matches!(err, TransportError::Status(status) if status.as_u16() == 500));
    }

    #[tokio::test]
    async fn connection_failure_is_a_failure() {
        // Port 9 (discard) is not listening in the test environment.
        let uri = Url::parse("http://127.0.0.1:9/reportLoss").unwrap();

        let result = transport().fetch_and_discard(&uri).await;

        assert!(matches!(result, Err(TransportError::Request(_))));
    }
}
