//! Error monitoring REST client
//!
//! Thin typed wrapper over [`Transport`]: URL construction, query encoding,
//! Link-header pagination and response decoding. No caching happens here.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::types::{EventField, Organization, Project};
use crate::pagination::{Filters, PageQuery, RawPage};
use crate::transport::{ApiRequest, ApiResponse, Transport, decode};
use crate::{Error, Result};

/// Page size used when walking complete collections
const COLLECTION_PAGE_SIZE: u32 = 100;
/// Upper bound on pages followed when walking a collection
const MAX_COLLECTION_PAGES: usize = 50;

static NEXT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).expect("valid link regex")
});

/// How filters are put on the query string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterEncoding {
    /// `filters[field][][type]=eq&filters[field][][value]=v`
    Structured,
    /// `field=v`; each field must be a single `eq` condition
    Plain,
}

/// Typed REST client for one tenant
pub struct BugsnagApi {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl BugsnagApi {
    /// Client for `base_url` (e.g. `https://api.bugsnag.com`)
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolved base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Organizations visible to the credential
    pub async fn list_organizations(&self) -> Result<Vec<Organization>> {
        let response = self
            .transport
            .send(ApiRequest::get(self.url("/user/organizations")).query("per_page", COLLECTION_PAGE_SIZE))
            .await?;
        decode(&response)
    }

    /// All projects of an organization, following `next` links
    pub async fn list_projects(&self, org_id: &str) -> Result<Vec<Project>> {
        let path = format!("/organizations/{}/projects", segment(org_id)?);
        let mut request = ApiRequest::get(self.url(&path)).query("per_page", COLLECTION_PAGE_SIZE);
        let mut projects = Vec::new();

        for _ in 0..MAX_COLLECTION_PAGES {
            let response = self.transport.send(request).await?;
            let page: Vec<Project> = decode(&response)?;
            projects.extend(page);

            match next_link(&response) {
                Some(next) => request = ApiRequest::get(self.checked_cursor(&next, &path, None)?),
                None => return Ok(projects),
            }
        }

        debug!(org = org_id, pages = MAX_COLLECTION_PAGES, "Project list truncated");
        Ok(projects)
    }

    /// Event fields of a project
    pub async fn list_event_fields(&self, project_id: &str) -> Result<Vec<EventField>> {
        let path = format!("/projects/{}/event_fields", segment(project_id)?);
        let response = self.transport.send(ApiRequest::get(self.url(&path))).await?;
        decode(&response)
    }

    /// GET a single resource
    pub async fn get(&self, path: &str) -> Result<Value> {
        let response = self.transport.send(ApiRequest::get(self.url(path))).await?;
        decode(&response)
    }

    /// PATCH a resource and decode the returned entity
    pub async fn patch(&self, path: &str, body: Value) -> Result<Value> {
        let response = self
            .transport
            .send(ApiRequest::patch(self.url(path), body))
            .await?;
        decode(&response)
    }

    /// One page of a list endpoint
    pub async fn list_page(
        &self,
        path: &str,
        query: PageQuery,
        encoding: FilterEncoding,
    ) -> Result<RawPage> {
        let request = match query {
            PageQuery::Cursor { cursor, per_page } => {
                ApiRequest::get(self.checked_cursor(&cursor, path, per_page)?)
            }
            PageQuery::Positional {
                offset,
                per_page,
                sort,
                direction,
                filters,
            } => {
                let mut request = ApiRequest::get(self.url(path));
                if let Some(per_page) = per_page {
                    request = request.query("per_page", per_page);
                }
                if let Some(offset) = offset {
                    request = request.query("offset", offset);
                }
                if let Some(sort) = sort {
                    request = request.query("sort", sort);
                }
                if let Some(direction) = direction {
                    request = request.query("direction", direction);
                }
                request.query_pairs(encode_filters(&filters, encoding)?)
            }
        };

        let response = self.transport.send(request).await?;
        let items: Vec<Value> = decode(&response)?;
        let total = response
            .header("x-total-count")
            .and_then(|v| v.trim().parse::<u64>().ok());

        Ok(RawPage {
            items,
            next_cursor: next_link(&response),
            total,
        })
    }

    /// Accept a cursor only if it points at `path` on this tenant's API;
    /// optionally replace its page size.
    fn checked_cursor(&self, cursor: &str, path: &str, per_page: Option<u32>) -> Result<String> {
        let mut url = Url::parse(cursor).map_err(|e| Error::InvalidUrl(format!("cursor: {e}")))?;
        let base = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid base URL {}: {e}", self.base_url)))?;

        let same_origin = url.scheme() == base.scheme()
            && url.host_str() == base.host_str()
            && url.port_or_known_default() == base.port_or_known_default();
        if !same_origin {
            return Err(Error::Validation(
                "cursor does not belong to this backend".to_string(),
            ));
        }

        let expected_path = format!("{}{path}", base.path().trim_end_matches('/'));
        if url.path() != expected_path {
            return Err(Error::Validation(format!(
                "cursor is for {}, not {expected_path}",
                url.path()
            )));
        }

        if let Some(per_page) = per_page {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != "per_page")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept)
                .append_pair("per_page", &per_page.to_string());
        }

        Ok(url.into())
    }
}

/// Encode filters for the query string
///
/// # Errors
///
/// [`Error::Validation`] when [`FilterEncoding::Plain`] cannot express a
/// field's conditions.
pub fn encode_filters(filters: &Filters, encoding: FilterEncoding) -> Result<Vec<(String, String)>> {
    if encoding == FilterEncoding::Plain {
        return filters.equalities();
    }

    let mut pairs = Vec::new();
    for (field, conditions) in filters.iter() {
        for condition in conditions {
            pairs.push((format!("filters[{field}][][type]"), condition.op.as_str().to_string()));
            pairs.push((format!("filters[{field}][][value]"), condition.value_string()));
        }
    }
    Ok(pairs)
}

/// `rel="next"` target of the Link header
fn next_link(response: &ApiResponse) -> Option<String> {
    let header = response.header("link")?;
    NEXT_LINK
        .captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Validate an id before it is placed in a URL path
pub(crate) fn segment(id: &str) -> Result<&str> {
    if id.is_empty() || id.contains(['/', '?', '#', '%']) || id.chars().any(char::is_whitespace) {
        return Err(Error::Validation(format!("Invalid id: {id:?}")));
    }
    Ok(id)
}
