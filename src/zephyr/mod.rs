//! Test management backend adapter
//!
//! This backend pages by offset (`startAt`/`maxResults`) and wraps every list
//! in an envelope. [`ZephyrAdapter`] maps that onto the shared list
//! contract. The cursor handed back to callers is the next page's query
//! string, so filters and page size carry over from page to page.

pub mod tools;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use url::form_urlencoded;

use crate::config::{HttpConfig, ZephyrConfig};
use crate::pagination::{
    AllowedKeys, FilterCondition, FilterScope, Filters, ListExecutor, PageQuery, PageRequest, PageResult,
    RawPage,
};
use crate::transport::{ApiRequest, HttpTransport, Transport, decode};
use crate::{Error, Result};

/// Backend label used in logs and transport errors
pub const BACKEND: &str = "zephyr";

/// Public API root
pub const DEFAULT_BASE_URL: &str = "https://api.zephyrscale.smartbear.com/v2";

/// Largest `maxResults` the backend accepts
pub const MAX_PAGE_SIZE: u32 = 1000;

const TEST_CASE_FILTERS: AllowedKeys = AllowedKeys(&["projectKey", "folderId"]);
const TEST_CYCLE_FILTERS: AllowedKeys =
    AllowedKeys(&["projectKey", "folderId", "jiraProjectVersionId"]);

static TEST_CASE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][A-Z0-9_]*-T[0-9]+$").expect("valid test case key regex")
});

/// Whether `key` looks like `PROJ-T123`
#[must_use]
pub fn is_test_case_key(key: &str) -> bool {
    TEST_CASE_KEY.is_match(key)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    values: Vec<Value>,
    #[serde(default)]
    start_at: u64,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    is_last: Option<bool>,
}

impl Envelope {
    /// `startAt` of the following page, if there is one
    fn next_start(&self) -> Option<u64> {
        let next = self.start_at.saturating_add(self.values.len() as u64);
        let exhausted = self.values.is_empty()
            || self.is_last.unwrap_or(false)
            || self.total.is_some_and(|total| next >= total);
        (!exhausted).then_some(next)
    }
}

/// Query parameters of a page request, minus `startAt`
type Params = Vec<(String, String)>;

/// Cursor: the next page's full query string
fn encode_cursor(params: &Params, start_at: u64) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .append_pair("startAt", &start_at.to_string())
        .finish()
}

/// Split a cursor back into `startAt` and the remaining parameters.
/// A bare integer is a `startAt` with no parameters. Every other key must be
/// `maxResults` or a filter `scope` allows.
fn decode_cursor(cursor: &str, scope: &dyn FilterScope) -> Result<(u64, Params)> {
    let invalid = || Error::Validation(format!("Invalid cursor: {cursor}"));

    if let Ok(start_at) = cursor.trim().parse::<u64>() {
        return Ok((start_at, Vec::new()));
    }

    let mut start_at = None;
    let mut params = Vec::new();
    for (key, value) in form_urlencoded::parse(cursor.as_bytes()) {
        match key.as_ref() {
            "startAt" => start_at = Some(value.parse::<u64>().map_err(|_| invalid())?),
            "maxResults" => {
                let size = value.parse::<u32>().map_err(|_| invalid())?;
                if size == 0 || size > MAX_PAGE_SIZE {
                    return Err(invalid());
                }
                params.push((key.to_string(), value.to_string()));
            }
            filter if scope.allows(filter) => params.push((key.to_string(), value.to_string())),
            other => return Err(Error::InvalidFilterKey(other.to_string())),
        }
    }
    Ok((start_at.ok_or_else(invalid)?, params))
}

/// Test management operations for one tenant
pub struct ZephyrAdapter {
    transport: Arc<dyn Transport>,
    base_url: String,
    default_project_key: Option<String>,
}

impl ZephyrAdapter {
    /// Build from configuration
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for a missing token or bad header value.
    pub fn from_config(config: &ZephyrConfig, http: &HttpConfig) -> Result<Self> {
        let token = config.api_token()?;
        let transport = HttpTransport::new(
            BACKEND,
            &[("authorization", format!("Bearer {token}"))],
            http.timeout,
            &http.user_agent,
        )?;

        info!(base_url = %config.base_url, "Test management adapter configured");

        Ok(Self::with_transport(
            Arc::new(transport),
            config.base_url.clone(),
            config.default_project_key.clone(),
        ))
    }

    /// Build over an arbitrary transport
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        default_project_key: Option<String>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_project_key: default_project_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn defaults(&self) -> Filters {
        match &self.default_project_key {
            Some(key) => Filters::new().with("projectKey", FilterCondition::eq(key.as_str())),
            None => Filters::new(),
        }
    }

    /// One page of test cases
    pub async fn list_test_cases(&self, request: PageRequest) -> Result<PageResult> {
        ListExecutor::new(&TEST_CASE_FILTERS)
            .with_defaults(self.defaults())
            .with_max_page_size(MAX_PAGE_SIZE)
            .list(request, |query| self.list_page("/testcases", &TEST_CASE_FILTERS, query))
            .await
    }

    /// A single test case
    ///
    /// # Errors
    ///
    /// [`Error::InvalidEntityKey`] unless `key` looks like `PROJ-T123`;
    /// no request is sent in that case.
    pub async fn get_test_case(&self, key: &str) -> Result<Value> {
        if !is_test_case_key(key) {
            return Err(Error::InvalidEntityKey(format!(
                "{key} (expected e.g. PROJ-T123)"
            )));
        }
        let url = format!("{}/testcases/{key}", self.base_url);
        let response = self.transport.send(ApiRequest::get(url)).await?;
        decode(&response)
    }

    /// One page of test cycles
    pub async fn list_test_cycles(&self, request: PageRequest) -> Result<PageResult> {
        ListExecutor::new(&TEST_CYCLE_FILTERS)
            .with_defaults(self.defaults())
            .with_max_page_size(MAX_PAGE_SIZE)
            .list(request, |query| self.list_page("/testcycles", &TEST_CYCLE_FILTERS, query))
            .await
    }

    async fn list_page(
        &self,
        path: &str,
        scope: &dyn FilterScope,
        query: PageQuery,
    ) -> Result<RawPage> {
        let (start_at, mut params) = match query {
            PageQuery::Cursor { cursor, per_page } => {
                let (start_at, mut params) = decode_cursor(&cursor, scope)?;
                if let Some(per_page) = per_page {
                    params.retain(|(k, _)| k != "maxResults");
                    params.push(("maxResults".to_string(), per_page.to_string()));
                }
                (start_at, params)
            }
            // no server-side sort on these endpoints
            PageQuery::Positional {
                offset,
                per_page,
                filters,
                ..
            } => {
                let mut params: Params = filters.equalities()?;
                if let Some(per_page) = per_page {
                    params.push(("maxResults".to_string(), per_page.to_string()));
                }
                (offset.unwrap_or(0), params)
            }
        };
        params.retain(|(k, _)| k != "startAt");

        let request = ApiRequest::get(format!("{}{path}", self.base_url))
            .query_pairs(params.iter().cloned())
            .query("startAt", start_at);
        let response = self.transport.send(request).await?;
        let envelope: Envelope = decode(&response)?;

        Ok(RawPage {
            next_cursor: envelope
                .next_start()
                .map(|next| encode_cursor(&params, next)),
            total: envelope.total,
            items: envelope.values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ApiResponse;
    use crate::transport::mock::MockTransport;
    use pretty_assertions::assert_eq;
    use reqwest::Method;
    use serde_json::json;

    fn adapter(mock: &Arc<MockTransport>, project: Option<&str>) -> ZephyrAdapter {
        ZephyrAdapter::with_transport(
            Arc::clone(mock) as Arc<dyn Transport>,
            DEFAULT_BASE_URL,
            project.map(str::to_string),
        )
    }

    #[test]
    fn test_key_format() {
        assert!(is_test_case_key("PROJ-T1"));
        assert!(is_test_case_key("A_2-T9876"));
        assert!(!is_test_case_key("proj-T1"));
        assert!(!is_test_case_key("PROJ-1"));
        assert!(!is_test_case_key("PROJ-T"));
        assert!(!is_test_case_key("2PROJ-T1"));
    }

    #[tokio::test]
    async fn test_bad_key_sends_nothing() {
        let mock = Arc::new(MockTransport::new());
        let err = adapter(&mock, None).get_test_case("nope").await.unwrap_err();
        assert!(matches!(err, Error::InvalidEntityKey(_)));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_offset_envelope_normalized() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::GET,
            "/v2/testcases",
            ApiResponse::json(
                200,
                &json!({
                    "values": [{"key": "PROJ-T1"}, {"key": "PROJ-T2"}],
                    "startAt": 10,
                    "maxResults": 2,
                    "total": 25,
                    "isLast": false,
                }),
            ),
        );

        let page = adapter(&mock, Some("PROJ"))
            .list_test_cases(PageRequest {
                offset: Some(10),
                per_page: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.data_count, 2);
        assert_eq!(page.total_count, Some(25));
        assert_eq!(
            page.next_cursor.as_deref(),
            Some("projectKey=PROJ&maxResults=2&startAt=12")
        );

        let request = &mock.requests()[0];
        assert_eq!(request.query_value("startAt"), Some("10"));
        assert_eq!(request.query_value("maxResults"), Some("2"));
        assert_eq!(request.query_value("projectKey"), Some("PROJ"));
    }

    #[tokio::test]
    async fn test_last_page_has_no_cursor() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::GET,
            "/v2/testcycles",
            ApiResponse::json(
                200,
                &json!({"values": [{"key": "PROJ-R1"}], "startAt": 24, "total": 25, "isLast": true}),
            ),
        );

        let page = adapter(&mock, None)
            .list_test_cycles(PageRequest {
                next_cursor: Some("24".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.next_cursor, None);
        assert_eq!(mock.requests()[0].query_value("startAt"), Some("24"));
    }

    #[tokio::test]
    async fn test_non_numeric_cursor() {
        let mock = Arc::new(MockTransport::new());
        let err = adapter(&mock, None)
            .list_test_cases(PageRequest {
                next_cursor: Some("https://elsewhere".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_filter_rejected() {
        let mock = Arc::new(MockTransport::new());
        let request = PageRequest {
            filters: Filters::new().with("status", FilterCondition::eq("Draft")),
            ..Default::default()
        };
        let err = adapter(&mock, None).list_test_cases(request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidFilterKey(ref k) if k == "status"));
    }

    #[test]
    fn test_envelope_without_total_uses_is_last() {
        let envelope: Envelope =
            serde_json::from_value(json!({"values": [{}, {}], "startAt": 0, "isLast": false}))
                .unwrap();
        assert_eq!(envelope.next_start(), Some(2));

        let empty: Envelope = serde_json::from_value(json!({"values": [], "startAt": 4})).unwrap();
        assert_eq!(empty.next_start(), None);
    }

    #[test]
    fn test_cursor_round_trip_keeps_filters() {
        let params = vec![
            ("projectKey".to_string(), "A&B".to_string()),
            ("maxResults".to_string(), "50".to_string()),
        ];
        let cursor = encode_cursor(&params, 100);
        assert_eq!(decode_cursor(&cursor, &TEST_CASE_FILTERS).unwrap(), (100, params));
        assert_eq!(decode_cursor(" 7 ", &TEST_CASE_FILTERS).unwrap(), (7, Vec::new()));
        assert!(decode_cursor("projectKey=A", &TEST_CASE_FILTERS).is_err());
        assert!(decode_cursor("startAt=-1", &TEST_CASE_FILTERS).is_err());
        assert!(decode_cursor("maxResults=0&startAt=1", &TEST_CASE_FILTERS).is_err());
    }

    #[tokio::test]
    async fn test_cursor_keys_checked_against_scope() {
        let mock = Arc::new(MockTransport::new());
        let err = adapter(&mock, None)
            .list_test_cases(PageRequest {
                next_cursor: Some("status=Draft&startAt=0".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFilterKey(ref k) if k == "status"));

        let err = adapter(&mock, None)
            .list_test_cases(PageRequest {
                next_cursor: Some("jiraProjectVersionId=7&startAt=0".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFilterKey(_)));
        assert!(mock.requests().is_empty());

        mock.on(
            Method::GET,
            "/v2/testcycles",
            ApiResponse::json(200, &json!({"values": [], "startAt": 0, "isLast": true})),
        );
        adapter(&mock, None)
            .list_test_cycles(PageRequest {
                next_cursor: Some("jiraProjectVersionId=7&startAt=0".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(mock.requests()[0].query_value("jiraProjectVersionId"), Some("7"));
    }

    #[tokio::test]
    async fn test_non_equality_filter_rejected() {
        let mock = Arc::new(MockTransport::new());
        let filters: Filters =
            serde_json::from_value(json!({"projectKey": [{"type": "ne", "value": "SHOP"}]}))
                .unwrap();
        let err = adapter(&mock, Some("SHOP"))
            .list_test_cases(PageRequest {
                filters,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_next_start_saturates() {
        let envelope: Envelope =
            serde_json::from_value(json!({"values": [{}], "startAt": u64::MAX})).unwrap();
        assert_eq!(envelope.next_start(), Some(u64::MAX));
    }

    #[tokio::test]
    async fn test_cursor_page_replays_filters() {
        let mock = Arc::new(MockTransport::new());
        mock.on(
            Method::GET,
            "/v2/testcases",
            ApiResponse::json(200, &json!({"values": [{}], "startAt": 5, "total": 9})),
        );

        let page = adapter(&mock, None)
            .list_test_cases(PageRequest {
                next_cursor: Some("projectKey=PROJ&maxResults=1&startAt=5".to_string()),
                per_page: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();

        let request = &mock.requests()[0];
        assert_eq!(request.query_value("projectKey"), Some("PROJ"));
        assert_eq!(request.query_value("maxResults"), Some("3"));
        assert_eq!(request.query_value("startAt"), Some("5"));
        assert_eq!(
            page.next_cursor.as_deref(),
            Some("projectKey=PROJ&maxResults=3&startAt=6")
        );
    }
}
