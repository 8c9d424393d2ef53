//! HTTP transport used by every outbound request

use crate::error::TransportError;
use crate::proxy::models::ProxyAddress;
use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy};
use std::time::Duration;

/// Default user agent for HTTP requests
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// A fully buffered HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues a single GET, either directly or through a forward proxy.
///
/// Each call is one atomic attempt: it yields a complete response or a
/// transport error, never partial state.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        via: Option<&ProxyAddress>,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport. The direct client is shared; proxied clients
/// are built per attempt since a reqwest client is bound to one proxy.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    user_agent: String,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .no_proxy()
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    /// Create a reqwest client routed through the proxy
    fn create_proxied_client(&self, proxy: &ProxyAddress) -> Result<Client, TransportError> {
        let client = Client::builder()
            .proxy(ReqwestProxy::all(proxy.url())?)
            .user_agent(&self.user_agent)
            .build()?;
        Ok(client)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        via: Option<&ProxyAddress>,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let client = match via {
            Some(proxy) => self.create_proxied_client(proxy)?,
            None => self.client.clone(),
        };

        let response = client.get(url).timeout(timeout).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_http_response_success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(301, "").is_success());
        assert!(!HttpResponse::new(429, "").is_success());
    }

    #[tokio::test]
    async fn test_direct_get() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/1.1.1.1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"country":"AU"}"#))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let response = transport
            .get(
                &format!("{}/json/1.1.1.1", server.uri()),
                None,
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"country":"AU"}"#);
    }

    #[tokio::test]
    async fn test_direct_get_non_success_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let response = transport
            .get(&server.uri(), None, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response, HttpResponse::new(429, "slow down"));
    }

    #[tokio::test]
    async fn test_get_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let err = transport
            .get(&server.uri(), None, Duration::from_millis(100))
            .await
            .unwrap_err();

        assert_eq!(err, TransportError::Timeout);
    }

    #[tokio::test]
    async fn test_get_via_proxy() {
        // The mock server receives the absolute-form request a forward
        // proxy would see.
        let proxy_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("forwarded"))
            .expect(1)
            .mount(&proxy_server)
            .await;

        let addr = proxy_server.address();
        let proxy = ProxyAddress::new(addr.ip().to_string(), addr.port());

        let transport = ReqwestTransport::new().unwrap();
        let response = transport
            .get(
                "http://upstream.invalid/ip",
                Some(&proxy),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(response, HttpResponse::new(200, "forwarded"));
    }
}
