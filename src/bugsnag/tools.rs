//! Error monitoring tools

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;

use super::{BugsnagAdapter, ErrorOperation, Severity};
use crate::pagination::PageRequest;
use crate::tools::{ElicitPrompt, Elicitation, Elicitor, Tool, ToolRegistry, to_json};
use crate::{Error, Result};

/// Register every error monitoring tool
pub fn register(registry: &mut ToolRegistry, adapter: &Arc<BugsnagAdapter>) -> Result<()> {
    registry.register(ListProjects(Arc::clone(adapter)))?;
    registry.register(GetCurrentProject(Arc::clone(adapter)))?;
    registry.register(ListProjectEventFilters(Arc::clone(adapter)))?;
    registry.register(ListProjectErrors(Arc::clone(adapter)))?;
    registry.register(GetError(Arc::clone(adapter)))?;
    registry.register(UpdateError(Arc::clone(adapter)))?;
    registry.register(GetEvent(Arc::clone(adapter)))?;
    registry.register(ListReleases(Arc::clone(adapter)))?;
    registry.register(GetRelease(Arc::clone(adapter)))?;
    Ok(())
}

/// `{}` or `{ "project_id": "..." }`
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectArgs {
    /// Project id; the current project when omitted
    pub project_id: Option<String>,
}

/// Arguments of the paginated list tools: `project_id` plus the
/// [`PageRequest`] keys. Anything else is rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct ListArgs {
    /// Project id; the current project when omitted
    pub project_id: Option<String>,
    /// Paging, sorting and filters
    pub page: PageRequest,
}

impl TryFrom<Map<String, Value>> for ListArgs {
    type Error = serde_json::Error;

    fn try_from(mut map: Map<String, Value>) -> std::result::Result<Self, Self::Error> {
        let project_id = match map.remove("project_id") {
            None | Some(Value::Null) => None,
            Some(id) => Some(serde_json::from_value(id)?),
        };
        let page = serde_json::from_value(Value::Object(map))?;
        Ok(Self { project_id, page })
    }
}

/// Arguments of the single-error tools
#[derive(Debug, Deserialize)]
pub struct ErrorArgs {
    /// Project id; the current project when omitted
    #[serde(default)]
    pub project_id: Option<String>,
    /// Error id
    pub error_id: String,
}

/// Arguments of `bugsnag_update_error`
#[derive(Debug, Deserialize)]
pub struct UpdateErrorArgs {
    /// Project id; the current project when omitted
    #[serde(default)]
    pub project_id: Option<String>,
    /// Error id
    pub error_id: String,
    /// Workflow operation
    pub operation: ErrorOperation,
    /// New severity (`override_severity` only)
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// Arguments of `bugsnag_get_event`
#[derive(Debug, Deserialize)]
pub struct EventArgs {
    /// Project id; the current project when omitted
    #[serde(default)]
    pub project_id: Option<String>,
    /// Event id
    pub event_id: String,
}

/// Arguments of `bugsnag_get_release`
#[derive(Debug, Deserialize)]
pub struct ReleaseArgs {
    /// Project id; the current project when omitted
    #[serde(default)]
    pub project_id: Option<String>,
    /// Release id
    pub release_id: String,
}

struct ListProjects(Arc<BugsnagAdapter>);

#[async_trait]
impl Tool for ListProjects {
    type Args = Value;

    fn name(&self) -> &'static str {
        "bugsnag_list_projects"
    }

    fn description(&self) -> &'static str {
        "List the projects of the organization"
    }

    async fn call(&self, _args: Value, _elicitor: &dyn Elicitor) -> Result<Value> {
        let projects = self.0.list_projects().await?;
        to_json(projects.as_slice())
    }
}

struct GetCurrentProject(Arc<BugsnagAdapter>);

#[async_trait]
impl Tool for GetCurrentProject {
    type Args = Value;

    fn name(&self) -> &'static str {
        "bugsnag_get_current_project"
    }

    fn description(&self) -> &'static str {
        "Show the project selected by the configured project API key"
    }

    async fn call(&self, _args: Value, _elicitor: &dyn Elicitor) -> Result<Value> {
        to_json(&self.0.get_current_project().await?)
    }
}

struct ListProjectEventFilters(Arc<BugsnagAdapter>);

#[async_trait]
impl Tool for ListProjectEventFilters {
    type Args = ProjectArgs;

    fn name(&self) -> &'static str {
        "bugsnag_list_project_event_filters"
    }

    fn description(&self) -> &'static str {
        "List the event fields usable as error filters"
    }

    async fn call(&self, args: ProjectArgs, _elicitor: &dyn Elicitor) -> Result<Value> {
        let fields = self.0.list_event_filters(args.project_id.as_deref()).await?;
        to_json(&*fields)
    }
}

struct ListProjectErrors(Arc<BugsnagAdapter>);

#[async_trait]
impl Tool for ListProjectErrors {
    type Args = ListArgs;

    fn name(&self) -> &'static str {
        "bugsnag_list_project_errors"
    }

    fn description(&self) -> &'static str {
        "List errors of a project (open errors from the last 30 days unless filtered)"
    }

    async fn call(&self, args: ListArgs, _elicitor: &dyn Elicitor) -> Result<Value> {
        let page = self
            .0
            .list_errors(args.project_id.as_deref(), args.page)
            .await?;
        to_json(&page)
    }
}

struct GetError(Arc<BugsnagAdapter>);

#[async_trait]
impl Tool for GetError {
    type Args = ErrorArgs;

    fn name(&self) -> &'static str {
        "bugsnag_get_error"
    }

    fn description(&self) -> &'static str {
        "Get one error"
    }

    async fn call(&self, args: ErrorArgs, _elicitor: &dyn Elicitor) -> Result<Value> {
        self.0
            .get_error(args.project_id.as_deref(), &args.error_id)
            .await
    }
}

struct UpdateError(Arc<BugsnagAdapter>);

impl UpdateError {
    async fn ask_severity(elicitor: &dyn Elicitor) -> Result<Option<Severity>> {
        let prompt = ElicitPrompt {
            message: "Which severity should the error get?".to_string(),
            field: "severity".to_string(),
            options: Severity::ALL.iter().map(|s| s.as_str().to_string()).collect(),
        };

        match elicitor.elicit(prompt).await? {
            Elicitation::Accepted(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::InvalidArguments(format!("severity: {e}"))),
            Elicitation::Declined => {
                info!("Severity not provided; sending override without one");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Tool for UpdateError {
    type Args = UpdateErrorArgs;

    fn name(&self) -> &'static str {
        "bugsnag_update_error"
    }

    fn description(&self) -> &'static str {
        "Change an error's workflow state (open, fix, ignore, snooze, override_severity)"
    }

    async fn call(&self, args: UpdateErrorArgs, elicitor: &dyn Elicitor) -> Result<Value> {
        let severity = match (args.operation, args.severity) {
            (ErrorOperation::OverrideSeverity, None) => Self::ask_severity(elicitor).await?,
            (ErrorOperation::OverrideSeverity, severity) => severity,
            (_, _) => None,
        };

        let entity = self
            .0
            .update_error(
                args.project_id.as_deref(),
                &args.error_id,
                args.operation,
                severity,
            )
            .await?;
        Ok(json!({ "success": true, "error": entity }))
    }
}

struct GetEvent(Arc<BugsnagAdapter>);

#[async_trait]
impl Tool for GetEvent {
    type Args = EventArgs;

    fn name(&self) -> &'static str {
        "bugsnag_get_event"
    }

    fn description(&self) -> &'static str {
        "Get one event"
    }

    async fn call(&self, args: EventArgs, _elicitor: &dyn Elicitor) -> Result<Value> {
        self.0
            .get_event(args.project_id.as_deref(), &args.event_id)
            .await
    }
}

struct ListReleases(Arc<BugsnagAdapter>);

#[async_trait]
impl Tool for ListReleases {
    type Args = ListArgs;

    fn name(&self) -> &'static str {
        "bugsnag_list_releases"
    }

    fn description(&self) -> &'static str {
        "List releases with stability metrics (production stage unless filtered)"
    }

    async fn call(&self, args: ListArgs, _elicitor: &dyn Elicitor) -> Result<Value> {
        let page = self
            .0
            .list_releases(args.project_id.as_deref(), args.page)
            .await?;
        to_json(&page)
    }
}

struct GetRelease(Arc<BugsnagAdapter>);

#[async_trait]
impl Tool for GetRelease {
    type Args = ReleaseArgs;

    fn name(&self) -> &'static str {
        "bugsnag_get_release"
    }

    fn description(&self) -> &'static str {
        "Get one release with stability metrics"
    }

    async fn call(&self, args: ReleaseArgs, _elicitor: &dyn Elicitor) -> Result<Value> {
        self.0
            .get_release(args.project_id.as_deref(), &args.release_id)
            .await
    }
}
