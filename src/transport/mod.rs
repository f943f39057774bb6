//! Transport seam between the adapters and the backends' REST APIs
//!
//! Adapters build [`ApiRequest`]s and hand them to a [`Transport`]. The raw
//! [`ApiResponse`] comes back unclassified; [`decode`] is the only place that
//! turns it into a value, a [`Error::Http`] (non-2xx) or a
//! [`Error::MalformedBody`] (2xx with a body that does not decode).

mod http;

pub use self::http::HttpTransport;

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Error, Result};

/// An outbound REST call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL (may already carry a query string, e.g. a pagination cursor)
    pub url: String,
    /// Extra query parameters, appended in order
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
}

impl ApiRequest {
    /// GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// PATCH request with a JSON body
    pub fn patch(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PATCH,
            url: url.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Append one query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append query parameters
    #[must_use]
    pub fn query_pairs(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    /// Value of the first query parameter named `key`
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A raw backend response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lowercased
    pub headers: HashMap<String, String>,
    /// Undecoded body
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Response with a raw body
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Response with a JSON body
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }

    /// Add a header (name is lowercased)
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Header lookup, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to one tenant's backend.
///
/// Implementations attach the tenant credential to every request; it is
/// established once at construction and never passes through callers.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send a request and return the raw response.
    ///
    /// # Errors
    ///
    /// Only connectivity failures are errors here; a non-2xx status is a
    /// successful send and is classified by [`decode`].
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// Classify a response and decode its body.
///
/// * non-2xx → [`Error::Http`], whatever the body holds
/// * 2xx with a body that fails to decode → [`Error::MalformedBody`]
pub fn decode<T: DeserializeOwned>(response: &ApiResponse) -> Result<T> {
    if !response.is_success() {
        let text = String::from_utf8_lossy(&response.body);
        return Err(Error::http(response.status, &text));
    }

    serde_json::from_slice(&response.body).map_err(|e| Error::MalformedBody {
        status: response.status,
        message: e.to_string(),
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_success() {
        let response = ApiResponse::json(200, &json!({"id": "abc"}));
        let value: Value = decode(&response).unwrap();
        assert_eq!(value["id"], "abc");
    }

    #[test]
    fn test_decode_non_2xx_is_http_error_even_with_garbage_body() {
        let response = ApiResponse::new(400, "<html>bad request</html>");
        let err = decode::<Value>(&response).unwrap_err();
        assert!(matches!(err, Error::Http { status: 400, .. }));
    }

    #[test]
    fn test_decode_2xx_garbage_is_malformed_body() {
        let response = ApiResponse::new(200, "");
        let err = decode::<Value>(&response).unwrap_err();
        assert!(matches!(err, Error::MalformedBody { status: 200, .. }));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = ApiResponse::new(200, "[]").with_header("X-Total-Count", "42");
        assert_eq!(response.header("x-total-count"), Some("42"));
        assert_eq!(response.header("X-TOTAL-COUNT"), Some("42"));
    }

    #[test]
    fn test_request_builder() {
        let request = ApiRequest::get("https://api.example.com/x")
            .query("per_page", 30)
            .query("sort", "last_seen");
        assert_eq!(request.query_value("per_page"), Some("30"));
        assert_eq!(request.query_value("missing"), None);
        assert!(request.body.is_none());
    }
}
