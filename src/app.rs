//! Adapter assembly

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::bugsnag::{self, BugsnagAdapter};
use crate::cache::ContextCache;
use crate::config::Config;
use crate::tools::{ToolRegistry, to_json};
use crate::zephyr::{self, ZephyrAdapter};
use crate::{Error, Result};

/// Configured adapters and their tools
pub struct Adapters {
    cache: Arc<ContextCache>,
    bugsnag: Option<Arc<BugsnagAdapter>>,
    zephyr: Option<Arc<ZephyrAdapter>>,
    registry: ToolRegistry,
}

impl Adapters {
    /// Build every configured adapter and register its tools.
    ///
    /// No network access happens here.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an unusable backend section or when no backend
    /// is configured at all.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = Arc::new(ContextCache::new(config.cache.ttl));
        let mut registry = ToolRegistry::new();

        let bugsnag = config
            .bugsnag
            .as_ref()
            .map(|c| BugsnagAdapter::from_config(c, &config.http, Arc::clone(&cache)).map(Arc::new))
            .transpose()?;
        if let Some(adapter) = &bugsnag {
            bugsnag::tools::register(&mut registry, adapter)?;
        }

        let zephyr = config
            .zephyr
            .as_ref()
            .map(|c| ZephyrAdapter::from_config(c, &config.http).map(Arc::new))
            .transpose()?;
        if let Some(adapter) = &zephyr {
            zephyr::tools::register(&mut registry, adapter)?;
        }

        if registry.is_empty() {
            return Err(Error::Config(
                "No backend configured (add a bugsnag or zephyr section)".to_string(),
            ));
        }

        info!(
            backends = ?config.enabled_backends().collect::<Vec<_>>(),
            tools = registry.len(),
            "Adapters ready"
        );

        Ok(Self {
            cache,
            bugsnag,
            zephyr,
            registry,
        })
    }

    /// Warm the error monitoring project context. Never fails.
    pub async fn initialize(&self) {
        if let Some(adapter) = &self.bugsnag {
            adapter.initialize().await;
        }
    }

    /// Tool registry
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Error monitoring adapter, if configured
    #[must_use]
    pub fn bugsnag(&self) -> Option<&Arc<BugsnagAdapter>> {
        self.bugsnag.as_ref()
    }

    /// Test management adapter, if configured
    #[must_use]
    pub fn zephyr(&self) -> Option<&Arc<ZephyrAdapter>> {
        self.zephyr.as_ref()
    }

    /// Organization, projects and current project, as far as they resolve
    pub async fn context_report(&self) -> Result<Value> {
        let Some(adapter) = &self.bugsnag else {
            return Err(Error::Config("Error monitoring backend not configured".to_string()));
        };
        let context = adapter.context();

        let organization = context.get_organization().await?;
        let projects = context.get_projects().await?;
        let current = match context.get_current_project().await {
            Ok(project) => project,
            Err(e) => {
                warn!(error = %e, "Current project unavailable");
                None
            }
        };

        Ok(json!({
            "base_url": adapter.base_url(),
            "organization": to_json(&organization)?,
            "project_count": projects.len(),
            "fixed_project_key_active": context.fixed_project_key().is_some(),
            "current_project": to_json(&current)?,
            "cache": to_json(&self.cache.stats())?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BugsnagConfig, ZephyrConfig};

    #[test]
    fn test_requires_a_backend() {
        let err = Adapters::from_config(&Config::default()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_registers_configured_backends_only() {
        let config = Config {
            zephyr: Some(ZephyrConfig {
                api_token: "t".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let adapters = Adapters::from_config(&config).unwrap();
        assert!(adapters.bugsnag().is_none());
        assert_eq!(adapters.registry().len(), 3);
        assert!(adapters.registry().contains("zephyr_list_test_cases"));
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let config = Config {
            bugsnag: Some(BugsnagConfig::default()),
            ..Default::default()
        };
        assert!(matches!(Adapters::from_config(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_both_backends() {
        let config = Config {
            bugsnag: Some(BugsnagConfig {
                auth_token: "tok".to_string(),
                project_api_key: Some("00000abc".to_string()),
                endpoint: None,
            }),
            zephyr: Some(ZephyrConfig {
                api_token: "t".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let adapters = Adapters::from_config(&config).unwrap();
        assert_eq!(adapters.registry().len(), 12);
        assert_eq!(
            adapters.bugsnag().unwrap().base_url(),
            "https://api.bugsnag.smartbear.com"
        );
    }
}
