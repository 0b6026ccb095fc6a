//! HTTP transport built on reqwest.

use crate::error::TransportError;
use crate::request::{CouchRequest, CouchResponse, Method, RequestBody};
use crate::transport::{Connector, Transport};
use reqwest::{Client, Url};
use std::time::Duration;
use tokio_util::io::ReaderStream;

/// Where the server lives and how to authenticate.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// A single keep-alive HTTP connection.
///
/// The underlying client keeps at most one idle connection, so requests from
/// one transport reuse the same socket. [`Transport::reconnect`] replaces the
/// client, which drops that socket.
pub struct HttpTransport {
    config: ConnectionConfig,
    base_url: Url,
    client: Client,
}

impl HttpTransport {
    pub fn new(config: ConnectionConfig) -> Result<Self, TransportError> {
        let base = config.base_url();
        let base_url = Url::parse(&base).map_err(|e| TransportError::InvalidUrl {
            url: base.clone(),
            reason: e.to_string(),
        })?;
        let client = build_client(&config)?;
        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    /// Full URL of a request, with percent-encoded path segments.
    pub fn url(&self, request: &CouchRequest) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "cannot be a base URL".to_string(),
            })?
            .pop_if_empty()
            .extend(&request.path);
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }

    async fn body(request: &CouchRequest) -> Result<reqwest::Body, TransportError> {
        Ok(match &request.body {
            RequestBody::Empty => reqwest::Body::from(Vec::new()),
            RequestBody::Json(value) => reqwest::Body::from(value.to_string()),
            RequestBody::Bytes(bytes) => reqwest::Body::from(bytes.clone()),
            RequestBody::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|source| TransportError::File {
                        path: path.clone(),
                        source,
                    })?;
                reqwest::Body::wrap_stream(ReaderStream::new(file))
            }
        })
    }
}

fn build_client(config: &ConnectionConfig) -> Result<Client, TransportError> {
    Client::builder()
        .timeout(config.request_timeout)
        .pool_max_idle_per_host(1)
        .build()
        .map_err(TransportError::Client)
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Put => reqwest::Method::PUT,
        Method::Post => reqwest::Method::POST,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&mut self, request: &CouchRequest) -> Result<CouchResponse, TransportError> {
        let url = self.url(request)?;
        let body = Self::body(request).await?;

        let mut builder = self
            .client
            .request(reqwest_method(request.method), url.clone())
            .body(body);
        if let Some(content_type) = &request.content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(username) = &self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_ref());
        }

        let http_error = |source| TransportError::Http {
            url: url.to_string(),
            source,
        };
        let response = builder.send().await.map_err(http_error)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(http_error)?;
        tracing::trace!("{} -> {status}", request.describe());
        Ok(CouchResponse::from_bytes(status, &bytes))
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        tracing::debug!("Reconnecting to {}", self.base_url);
        self.client = build_client(&self.config)?;
        Ok(())
    }
}

/// Opens [`HttpTransport`]s for one server.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    config: ConnectionConfig,
}

impl HttpConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl Connector for HttpConnector {
    type Transport = HttpTransport;

    fn connect(&self) -> Result<HttpTransport, TransportError> {
        HttpTransport::new(self.config.clone())
    }
}
