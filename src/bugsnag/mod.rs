//! Error monitoring backend adapter
//!
//! [`BugsnagAdapter`] is the operation surface the tools call into. It owns
//! the REST client and the [`ProjectContext`], applies the shared list
//! contract with this backend's default filters, runs updates through the
//! write-verification path and decorates releases with stability metrics.

mod api;
mod context;
pub mod tools;
mod types;

pub use self::api::{BugsnagApi, FilterEncoding, encode_filters};
pub use self::context::ProjectContext;
pub use self::types::{
    EXCLUDED_FILTER_FIELDS, ErrorOperation, EventField, FieldSet, Organization, Project,
    Severity, StabilityThreshold,
};

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::info;

use self::api::segment;
use crate::cache::ContextCache;
use crate::config::{BugsnagConfig, HttpConfig};
use crate::endpoint;
use crate::pagination::{AllowedKeys, FilterCondition, Filters, ListExecutor, PageRequest, PageResult};
use crate::stability;
use crate::transport::{HttpTransport, Transport};
use crate::verify::{UpdateIntent, write_verified};
use crate::Result;

/// Backend label used in logs and transport errors
pub const BACKEND: &str = "bugsnag";

/// API version requested on every call
const API_VERSION: &str = "2";

/// Filters the release list accepts (plain query parameters)
const RELEASE_FILTERS: AllowedKeys = AllowedKeys(&["release_stage", "visible_only"]);

/// Filters applied to error lists unless the caller overrides them
#[must_use]
pub fn default_error_filters() -> Filters {
    Filters::new()
        .with("error.status", FilterCondition::eq("open"))
        .with("event.since", FilterCondition::eq("30d"))
}

/// Filters applied to release lists unless the caller overrides them
#[must_use]
pub fn default_release_filters() -> Filters {
    Filters::new().with("release_stage", FilterCondition::eq("production"))
}

/// Error monitoring operations for one tenant
pub struct BugsnagAdapter {
    api: Arc<BugsnagApi>,
    context: ProjectContext,
}

impl BugsnagAdapter {
    /// Build from configuration: resolve the endpoint, install the
    /// credential on an HTTP transport.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Config`] for a missing token or bad header value,
    /// [`crate::Error::InvalidUrl`] for an unparseable endpoint override.
    pub fn from_config(
        config: &BugsnagConfig,
        http: &HttpConfig,
        cache: Arc<ContextCache>,
    ) -> Result<Self> {
        let token = config.auth_token()?;
        let base_url = endpoint::resolve(
            "api",
            config.project_api_key.as_deref(),
            config.endpoint.as_deref(),
        )?;

        let transport = HttpTransport::new(
            BACKEND,
            &[
                ("authorization", format!("token {token}")),
                ("x-version", API_VERSION.to_string()),
            ],
            http.timeout,
            &http.user_agent,
        )?;

        info!(base_url = %base_url, fixed_project = config.project_api_key.is_some(), "Error monitoring adapter configured");

        Ok(Self::with_transport(
            Arc::new(transport),
            base_url,
            config.project_api_key.clone(),
            cache,
        ))
    }

    /// Build over an arbitrary transport
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        fixed_project_key: Option<String>,
        cache: Arc<ContextCache>,
    ) -> Self {
        let api = Arc::new(BugsnagApi::new(transport, base_url));
        let context = ProjectContext::new(Arc::clone(&api), cache, fixed_project_key);
        Self { api, context }
    }

    /// Project context
    #[must_use]
    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    /// Resolved API base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.api.base_url()
    }

    /// Warm the project context; never fails
    pub async fn initialize(&self) {
        self.context.initialize().await;
    }

    /// All projects of the organization
    pub async fn list_projects(&self) -> Result<Arc<Vec<Project>>> {
        self.context.get_projects().await
    }

    /// The current project (error when there is none)
    pub async fn get_current_project(&self) -> Result<Project> {
        self.context.get_input_project(None).await
    }

    /// Filterable event fields of a project
    pub async fn list_event_filters(&self, project_id: Option<&str>) -> Result<Arc<FieldSet>> {
        let project = self.context.get_input_project(project_id).await?;
        self.context.get_filter_fields(&project.id).await
    }

    /// One page of a project's errors
    ///
    /// Filter keys are checked against the project's event fields;
    /// `error.status=open` and `event.since=30d` apply unless overridden.
    pub async fn list_errors(
        &self,
        project_id: Option<&str>,
        request: PageRequest,
    ) -> Result<PageResult> {
        let project = self.context.get_input_project(project_id).await?;
        let fields = self.context.get_filter_fields(&project.id).await?;
        let path = format!("/projects/{}/errors", segment(&project.id)?);

        ListExecutor::new(fields.as_ref())
            .with_defaults(default_error_filters())
            .list(request, |query| {
                self.api.list_page(&path, query, FilterEncoding::Structured)
            })
            .await
    }

    /// A single error
    pub async fn get_error(&self, project_id: Option<&str>, error_id: &str) -> Result<Value> {
        let project = self.context.get_input_project(project_id).await?;
        self.api.get(&error_path(&project.id, error_id)?).await
    }

    /// Apply a workflow operation to an error.
    ///
    /// When the backend acknowledges the write with an unreadable body, the
    /// error is re-read and compared with the intended status/severity.
    pub async fn update_error(
        &self,
        project_id: Option<&str>,
        error_id: &str,
        operation: ErrorOperation,
        severity: Option<Severity>,
    ) -> Result<Value> {
        let project = self.context.get_input_project(project_id).await?;
        let path = error_path(&project.id, error_id)?;
        // the backend only applies a severity on override_severity
        let severity = severity.filter(|_| operation == ErrorOperation::OverrideSeverity);

        let mut body = json!({ "operation": operation.as_str() });
        let mut intent = UpdateIntent::new(error_id);
        if let Some(status) = operation.resulting_status() {
            intent = intent.with_field("status", status);
        }
        if let Some(severity) = severity {
            body["severity"] = json!(severity.as_str());
            intent = intent.with_field("severity", severity.as_str());
        }

        write_verified(
            &intent,
            || self.api.patch(&path, body),
            |_| self.api.get(&path),
        )
        .await
    }

    /// A single event
    pub async fn get_event(&self, project_id: Option<&str>, event_id: &str) -> Result<Value> {
        let project = self.context.get_input_project(project_id).await?;
        let path = format!(
            "/projects/{}/events/{}",
            segment(&project.id)?,
            segment(event_id)?
        );
        self.api.get(&path).await
    }

    /// One page of releases, each decorated with stability metrics
    pub async fn list_releases(
        &self,
        project_id: Option<&str>,
        request: PageRequest,
    ) -> Result<PageResult> {
        let project = self.context.get_input_project(project_id).await?;
        let path = format!("/projects/{}/releases", segment(&project.id)?);
        let targets = project.stability_targets();

        let page = ListExecutor::new(&RELEASE_FILTERS)
            .with_defaults(default_release_filters())
            .list(request, |query| {
                self.api.list_page(&path, query, FilterEncoding::Plain)
            })
            .await?;

        Ok(page.map_data(|release| stability::decorate(&release, &targets)))
    }

    /// A single release with stability metrics
    pub async fn get_release(&self, project_id: Option<&str>, release_id: &str) -> Result<Value> {
        let project = self.context.get_input_project(project_id).await?;
        let path = format!(
            "/projects/{}/releases/{}",
            segment(&project.id)?,
            segment(release_id)?
        );
        let release = self.api.get(&path).await?;
        Ok(stability::decorate(&release, &project.stability_targets()))
    }
}

fn error_path(project_id: &str, error_id: &str) -> Result<String> {
    Ok(format!(
        "/projects/{}/errors/{}",
        segment(project_id)?,
        segment(error_id)?
    ))
}
