//! reqwest-backed implementation of the sync transport port.

use async_trait::async_trait;
use outpost_core::SyncTransport;
use outpost_domain::constants::IDEMPOTENCY_KEY_HEADER;
use outpost_domain::{RequestMethod, SyncRequest, TransportConfig, TransportError};
use reqwest::Method;
use tracing::{debug, instrument};

use super::client::HttpClient;

/// Delivers sync requests to the remote REST service.
///
/// Any 2xx is success. Every other status becomes
/// [`TransportError::ServerError`]; the orchestrator treats all failures as
/// retryable.
#[derive(Debug, Clone)]
pub struct HttpSyncTransport {
    client: HttpClient,
}

impl HttpSyncTransport {
    /// Transport over a configured client.
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Build a transport from the `transport` config section.
    ///
    /// # Errors
    /// `OutpostError::Config` if the base URL or token is unusable.
    pub fn from_config(config: &TransportConfig) -> outpost_domain::Result<Self> {
        let client = HttpClient::builder(config.base_url.clone())
            .timeout(config.timeout())
            .bearer_token(config.auth_token.clone())
            .user_agent(concat!("outpost/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::new(client))
    }
}

fn to_method(method: RequestMethod) -> Method {
    match method {
        RequestMethod::Post => Method::POST,
        RequestMethod::Put => Method::PUT,
        RequestMethod::Delete => Method::DELETE,
    }
}

fn classify(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if let Some(status) = err.status() {
        TransportError::ServerError(status.as_u16())
    } else {
        TransportError::NetworkError(err.to_string())
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn send(&self, request: &SyncRequest) -> Result<(), TransportError> {
        let mut builder = self
            .client
            .request(to_method(request.method), &request.path)
            .header(IDEMPOTENCY_KEY_HEADER, &request.idempotency_key);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| classify(&err))?;
        let status = response.status();
        debug!(status = status.as_u16(), "Sync request answered");

        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::ServerError(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn transport(server: &MockServer) -> HttpSyncTransport {
        HttpSyncTransport::new(
            HttpClient::builder(server.uri()).timeout(Duration::from_millis(500)).build().unwrap(),
        )
    }

    fn request(method: RequestMethod, path: &str, body: Option<serde_json::Value>) -> SyncRequest {
        SyncRequest {
            path: path.to_string(),
            method,
            body,
            idempotency_key: "item-1".to_string(),
        }
    }

    #[tokio::test]
    async fn posts_json_body_with_idempotency_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .and(header(IDEMPOTENCY_KEY_HEADER, "item-1"))
            .and(body_json(json!({"id": "item-1", "reps": 12})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let sent = transport(&server)
            .send(&request(RequestMethod::Post, "/sessions", Some(json!({"id": "item-1", "reps": 12}))))
            .await;
        assert!(sent.is_ok());
    }

    #[tokio::test]
    async fn delete_sends_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/exercises/item-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        transport(&server)
            .send(&request(RequestMethod::Delete, "/exercises/item-1", None))
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].body.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_maps_to_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let transport = transport(&server);
        let err = transport
            .send(&request(RequestMethod::Put, "/sessions/item-1", Some(json!({}))))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::ServerError(503));

        let err = transport
            .send(&request(RequestMethod::Post, "/sessions", Some(json!({}))))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::ServerError(409));
    }

    #[tokio::test]
    async fn slow_response_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = HttpClient::builder(server.uri())
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let err = HttpSyncTransport::new(client)
            .send(&request(RequestMethod::Post, "/sessions", Some(json!({}))))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout);
    }

    #[tokio::test]
    async fn refused_connection_maps_to_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // release the port so that requests fail with ECONNREFUSED

        let client = HttpClient::builder(format!("http://{addr}")).build().unwrap();
        let err = HttpSyncTransport::new(client)
            .send(&request(RequestMethod::Post, "/sessions", Some(json!({}))))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NetworkError(_)));
    }
}
