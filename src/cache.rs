//! Context cache for per-tenant backend context
//!
//! Holds the dependency chain the error monitoring adapter needs on almost
//! every call: the organization, its project list, the fixed (current) project
//! and the derived filterable-field set of each project.
//!
//! - The organization never expires (one per tenant, fixed for the process)
//! - Everything else expires a fixed TTL after it was last *written*; reads do
//!   not extend it
//! - Locks are only held for the copy in or out, never across an upstream
//!   call, so concurrent cold lookups may both fetch and the last write wins
//!
//! The cache is an ordinary value injected into the adapter, so every test can
//! use its own instance.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::bugsnag::{FieldSet, Organization, Project};
use crate::{Error, Result};

/// Default context TTL
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A cached value with its write timestamp
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    cached_at: Instant,
    /// `None` never expires
    ttl: Option<Duration>,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl: Option<Duration>) -> Self {
        Self {
            value,
            cached_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.ttl
            .is_some_and(|ttl| Instant::now().duration_since(self.cached_at) > ttl)
    }
}

/// Single-value slot
struct Slot<T> {
    entry: RwLock<Option<CacheEntry<T>>>,
}

impl<T: Clone> Slot<T> {
    fn new() -> Self {
        Self {
            entry: RwLock::new(None),
        }
    }

    fn get(&self, stats: &CacheStats) -> Option<T> {
        let value = {
            let guard = self.entry.read();
            match guard.as_ref() {
                Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
                Some(_) => None,
                None => {
                    stats.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        };

        if value.is_some() {
            stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            // Expired - evict it
            let mut guard = self.entry.write();
            if guard.as_ref().is_some_and(CacheEntry::is_expired) {
                *guard = None;
                stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
            stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    fn set(&self, value: T, ttl: Option<Duration>) {
        *self.entry.write() = Some(CacheEntry::new(value, ttl));
    }

    fn is_populated(&self) -> bool {
        self.entry.read().is_some()
    }

    fn clear(&self) {
        *self.entry.write() = None;
    }
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    #[allow(clippy::cast_precision_loss)]
    fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses (absent or expired)
    pub misses: u64,
    /// Expired entries removed
    pub evictions: u64,
    /// Number of per-project field sets held
    pub field_sets: usize,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}

/// Context cache for one tenant
pub struct ContextCache {
    ttl: Duration,
    organization: Slot<Organization>,
    projects: Slot<Arc<Vec<Project>>>,
    current_project: Slot<Project>,
    event_fields: DashMap<String, CacheEntry<Arc<FieldSet>>>,
    stats: CacheStats,
}

impl ContextCache {
    /// Create an empty cache with the given TTL
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            organization: Slot::new(),
            projects: Slot::new(),
            current_project: Slot::new(),
            event_fields: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Configured TTL
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached organization
    pub fn organization(&self) -> Option<Organization> {
        self.organization.get(&self.stats)
    }

    /// Store the organization (never expires)
    pub fn set_organization(&self, organization: Organization) {
        self.organization.set(organization, None);
    }

    /// Cached project list
    pub fn projects(&self) -> Option<Arc<Vec<Project>>> {
        self.projects.get(&self.stats)
    }

    /// Store the project list
    pub fn set_projects(&self, projects: Vec<Project>) -> Arc<Vec<Project>> {
        let projects = Arc::new(projects);
        self.projects.set(Arc::clone(&projects), Some(self.ttl));
        projects
    }

    /// Cached current project
    pub fn current_project(&self) -> Option<Project> {
        self.current_project.get(&self.stats)
    }

    /// Store the current project.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the project list was never stored: the
    /// current project is always picked out of a cached list.
    pub fn set_current_project(&self, project: Project) -> Result<()> {
        if !self.projects.is_populated() {
            return Err(Error::Internal(
                "current project cached before the project list".to_string(),
            ));
        }
        self.current_project.set(project, Some(self.ttl));
        Ok(())
    }

    /// Cached field set for a project
    pub fn event_fields(&self, project_id: &str) -> Option<Arc<FieldSet>> {
        if let Some(entry) = self.event_fields.get(project_id) {
            if entry.is_expired() {
                drop(entry);
                self.event_fields.remove(project_id);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            } else {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.value))
            }
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Store the field set for a project
    pub fn set_event_fields(&self, project_id: &str, fields: FieldSet) -> Arc<FieldSet> {
        let fields = Arc::new(fields);
        self.event_fields.insert(
            project_id.to_string(),
            CacheEntry::new(Arc::clone(&fields), Some(self.ttl)),
        );
        fields
    }

    /// Drop the current project (used when fixed-project mode is demoted)
    pub fn clear_current_project(&self) {
        self.current_project.clear();
    }

    /// Drop everything
    pub fn clear(&self) {
        self.organization.clear();
        self.projects.clear();
        self.current_project.clear();
        self.event_fields.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            field_sets: self.event_fields.len(),
            hit_rate: self.stats.hit_rate(),
        }
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bugsnag::EventField;

    fn project(id: &str, api_key: &str) -> Project {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("Project {id}"),
            "slug": id,
            "api_key": api_key,
        }))
        .unwrap()
    }

    fn org() -> Organization {
        Organization {
            id: "org1".to_string(),
            name: "Acme".to_string(),
            slug: Some("acme".to_string()),
        }
    }

    #[test]
    fn test_cache_hit() {
        let cache = ContextCache::default();
        cache.set_organization(org());

        assert_eq!(cache.organization().map(|o| o.id), Some("org1".to_string()));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_cache_miss() {
        let cache = ContextCache::default();
        assert!(cache.projects().is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_projects_expire_but_organization_does_not() {
        let cache = ContextCache::new(Duration::from_millis(1));
        cache.set_organization(org());
        cache.set_projects(vec![project("p1", "key1")]);

        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.projects().is_none());
        assert!(cache.organization().is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_current_project_requires_project_list() {
        let cache = ContextCache::default();
        let err = cache.set_current_project(project("p1", "key1")).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(cache.current_project().is_none());

        cache.set_projects(vec![project("p1", "key1")]);
        cache.set_current_project(project("p1", "key1")).unwrap();
        assert_eq!(cache.current_project().map(|p| p.id), Some("p1".to_string()));
    }

    #[test]
    fn test_event_fields_keyed_by_project() {
        let cache = ContextCache::default();
        let fields = FieldSet::from_fields(vec![EventField::named("error.status")]);
        cache.set_event_fields("p1", fields);

        assert!(cache.event_fields("p1").is_some());
        assert!(cache.event_fields("p2").is_none());
        assert_eq!(cache.stats().field_sets, 1);
    }

    #[test]
    fn test_event_fields_expiry() {
        let cache = ContextCache::new(Duration::from_millis(1));
        cache.set_event_fields("p1", FieldSet::default());

        std::thread::sleep(Duration::from_millis(5));

        assert!(cache.event_fields("p1").is_none());
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.stats().field_sets, 0);
    }

    #[test]
    fn test_ttl_measured_from_write_not_read() {
        let cache = ContextCache::new(Duration::from_millis(200));
        cache.set_projects(vec![project("p1", "key1")]);

        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.projects().is_some());
        std::thread::sleep(Duration::from_millis(220));
        assert!(cache.projects().is_none());
    }

    #[test]
    fn test_clear() {
        let cache = ContextCache::default();
        cache.set_organization(org());
        cache.set_projects(vec![project("p1", "key1")]);
        cache.clear();

        assert!(cache.organization().is_none());
        assert!(cache.projects().is_none());
    }

    #[test]
    fn test_hit_rate() {
        let cache = ContextCache::default();
        cache.set_organization(org());
        cache.organization();
        cache.organization();
        cache.projects();

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.666).abs() < 0.01);
    }
}
