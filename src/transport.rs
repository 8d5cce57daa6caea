//! The network boundary.
//!
//! The engine never talks to the network itself; it hands prepared requests to
//! a [`Transport`]. Implementations must report HTTP error statuses as regular
//! responses and reserve [`TransportError`] for failures where no response
//! exists at all (connection refused, timeouts, protocol errors).

use async_trait::async_trait;
use bytes::Bytes;
use http::header::HeaderMap;
use http::StatusCode;
use url::Url;

use crate::error::TransportError;
use crate::request::Request;

/// The raw result of a network exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<HttpResponse, TransportError>;
}

#[cfg(feature = "reqwest-transport")]
pub use self::reqwest_transport::ReqwestTransport;

#[cfg(feature = "reqwest-transport")]
mod reqwest_transport {
    use super::*;

    /// [`Transport`] backed by a shared `reqwest::Client`.
    ///
    /// Connection pooling is left to the client; the engine limits how many
    /// requests are in flight through its batch size.
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }

        pub fn client(&self) -> &reqwest::Client {
            &self.client
        }
    }

    #[async_trait]
    impl Transport for ReqwestTransport {
        async fn send(&self, request: &Request) -> Result<HttpResponse, TransportError> {
            let mut builder = self
                .client
                .request(request.method.clone(), request.url().clone())
                .headers(request.headers.clone());

            if let Some(timeout) = request.options.timeout {
                builder = builder.timeout(timeout);
            }
            if let Some(body) = &request.options.body {
                builder = builder.body(body.clone());
            }

            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let url = response.url().clone();
            let body = response.bytes().await?;

            Ok(HttpResponse {
                status,
                headers,
                body,
                url,
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        #[tokio::test]
        async fn test_error_status_is_a_response() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/missing"))
                .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
                .mount(&server)
                .await;

            let transport = ReqwestTransport::default();
            let request = Request::get(&format!("{}/missing", server.uri())).unwrap();
            let response = transport.send(&request).await.unwrap();

            assert_eq!(response.status, StatusCode::NOT_FOUND);
            assert_eq!(response.body, Bytes::from_static(b"gone"));
        }

        #[tokio::test]
        async fn test_connection_failure_is_an_error() {
            let transport = ReqwestTransport::default();
            // Port 9 (discard) on localhost is expected to refuse connections.
            let request = Request::get("http://127.0.0.1:9/").unwrap();
            assert!(transport.send(&request).await.is_err());
        }
    }
}
