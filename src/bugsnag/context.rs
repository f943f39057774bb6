//! Project context resolution
//!
//! Every error-monitoring operation needs a project. The chain is
//! organization → projects → current project, each step memoized in the
//! shared [`ContextCache`]. In fixed-project mode a configured notifier key
//! selects the current project; if that key matches nothing the adapter
//! drops back to unrestricted mode exactly once and carries on.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::api::BugsnagApi;
use super::types::{FieldSet, Organization, Project};
use crate::cache::ContextCache;
use crate::{Error, Result};

/// Lazily resolved organization/project context
pub struct ProjectContext {
    api: Arc<BugsnagApi>,
    cache: Arc<ContextCache>,
    fixed_project_key: RwLock<Option<String>>,
}

impl ProjectContext {
    /// Context over `api`; `fixed_project_key` enables fixed-project mode
    pub fn new(
        api: Arc<BugsnagApi>,
        cache: Arc<ContextCache>,
        fixed_project_key: Option<String>,
    ) -> Self {
        Self {
            api,
            cache,
            fixed_project_key: RwLock::new(fixed_project_key.filter(|k| !k.trim().is_empty())),
        }
    }

    /// The configured key, if fixed-project mode is still active
    pub fn fixed_project_key(&self) -> Option<String> {
        self.fixed_project_key.read().clone()
    }

    /// Shared cache
    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    /// The credential's organization (first one listed)
    ///
    /// # Errors
    ///
    /// [`Error::NoOrganizations`] when the credential sees none, or the
    /// fetch error.
    pub async fn get_organization(&self) -> Result<Organization> {
        if let Some(org) = self.cache.organization() {
            return Ok(org);
        }

        let org = self
            .api
            .list_organizations()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::NoOrganizations)?;

        debug!(org = %org.id, name = %org.name, "Resolved organization");
        self.cache.set_organization(org.clone());
        Ok(org)
    }

    /// All projects of the organization
    pub async fn get_projects(&self) -> Result<Arc<Vec<Project>>> {
        if let Some(projects) = self.cache.projects() {
            return Ok(projects);
        }

        let org = self.get_organization().await?;
        let projects = self.api.list_projects(&org.id).await?;
        debug!(org = %org.id, count = projects.len(), "Fetched projects");
        Ok(self.cache.set_projects(projects))
    }

    /// The fixed project, or `None` in unrestricted mode.
    ///
    /// Resolving the fixed project also caches its filterable fields. A
    /// key that matches no project turns fixed-project mode off.
    pub async fn get_current_project(&self) -> Result<Option<Project>> {
        let Some(key) = self.fixed_project_key() else {
            return Ok(None);
        };
        if let Some(project) = self.cache.current_project() {
            return Ok(Some(project));
        }

        let projects = self.get_projects().await?;
        let Some(project) = projects
            .iter()
            .find(|p| p.api_key.as_deref() == Some(key.as_str()))
            .cloned()
        else {
            self.demote(&key);
            return Ok(None);
        };

        self.cache.set_current_project(project.clone())?;
        self.get_filter_fields(&project.id).await?;
        Ok(Some(project))
    }

    /// Project named by the caller, else the current project.
    ///
    /// # Errors
    ///
    /// [`Error::ProjectNotFound`] for an unknown id,
    /// [`Error::NoCurrentProject`] when no id is given and there is no
    /// current project.
    pub async fn get_input_project(&self, project_id: Option<&str>) -> Result<Project> {
        match project_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self
                .get_projects()
                .await?
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .ok_or_else(|| Error::ProjectNotFound(id.to_string())),
            None => self
                .get_current_project()
                .await?
                .ok_or(Error::NoCurrentProject),
        }
    }

    /// Filterable fields of a project
    pub async fn get_filter_fields(&self, project_id: &str) -> Result<Arc<FieldSet>> {
        if let Some(fields) = self.cache.event_fields(project_id) {
            return Ok(fields);
        }

        let fields = FieldSet::from_fields(self.api.list_event_fields(project_id).await?);
        debug!(project = project_id, count = fields.len(), "Fetched event fields");
        Ok(self.cache.set_event_fields(project_id, fields))
    }

    /// Warm the context at startup. Failures are logged, never returned:
    /// the adapter must come up even when the backend is unreachable.
    pub async fn initialize(&self) {
        if let Err(e) = self.establish().await {
            warn!(
                error = %e,
                kind = %e.kind(),
                "Could not establish project context; continuing without it"
            );
        }
    }

    async fn establish(&self) -> Result<()> {
        let org = self.get_organization().await?;
        let projects = self.get_projects().await?;
        info!(org = %org.name, projects = projects.len(), "Project context established");

        if let Some(project) = self.get_current_project().await? {
            info!(project = %project.name, id = %project.id, "Fixed-project mode");
        }
        Ok(())
    }

    fn demote(&self, key: &str) {
        let mut guard = self.fixed_project_key.write();
        if guard.as_deref() == Some(key) {
            *guard = None;
            self.cache.clear_current_project();
            warn!("Configured project key matches no project; falling back to unrestricted mode");
        }
    }
}
