//! reqwest-backed transport
//!
//! # Security
//!
//! The tenant credential is installed as a sensitive default header when the
//! client is built. It is never logged or included in error messages.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{
    Client,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use tracing::debug;

use super::{ApiRequest, ApiResponse, Transport};
use crate::{Error, Result};

/// HTTP transport for one tenant
pub struct HttpTransport {
    client: Client,
    /// Backend label used in log fields
    backend: &'static str,
}

impl HttpTransport {
    /// Create a transport that sends `headers` with every request.
    ///
    /// Header values are marked sensitive so reqwest redacts them from its
    /// own debug output.
    pub fn new(
        backend: &'static str,
        headers: &[(&str, String)],
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let header_name: HeaderName = name
                .parse()
                .map_err(|_| Error::Config(format!("Invalid header name: {name}")))?;
            let mut header_value: HeaderValue = value.parse().map_err(|_| {
                // Don't include the credential in the error message
                Error::Config(format!("Invalid value for header {name}"))
            })?;
            header_value.set_sensitive(true);
            default_headers.insert(header_name, header_value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(default_headers)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self { client, backend })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let started = Instant::now();
        let mut builder = self.client.request(request.method.clone(), &request.url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(
            backend = self.backend,
            method = %request.method,
            url = %request.url,
            status,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Backend call finished"
        );

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
