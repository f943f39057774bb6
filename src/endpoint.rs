//! Endpoint resolution for the error monitoring backend
//!
//! A tenant's API lives on one of two known domains, chosen by the shape of its
//! credential. An explicit endpoint override on a known domain is normalized
//! back to the canonical host for the requested subdomain; an override on any
//! other host is a custom installation and is used verbatim.

use url::Url;

use crate::{Error, Result};

/// Keys with this prefix belong to the hub (multi-tenant) installation
pub const HUB_PREFIX: &str = "00000";
/// Hub installation domain
pub const HUB_DOMAIN: &str = "bugsnag.smartbear.com";
/// Default installation domain
pub const DEFAULT_DOMAIN: &str = "bugsnag.com";

/// Resolve the base URL for `subdomain` (e.g. `"api"`).
///
/// No network access happens here; identical inputs give identical output.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if `override_url` is present but does not
/// parse as a URL.
pub fn resolve(subdomain: &str, tenant_key: Option<&str>, override_url: Option<&str>) -> Result<String> {
    let Some(raw) = override_url.filter(|o| !o.trim().is_empty()) else {
        let domain = if is_hub_key(tenant_key) {
            HUB_DOMAIN
        } else {
            DEFAULT_DOMAIN
        };
        return Ok(format!("https://{subdomain}.{domain}"));
    };

    let parsed = Url::parse(raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;

    match parsed.host_str().and_then(known_domain) {
        Some(domain) => Ok(format!("https://{subdomain}.{domain}")),
        None => Ok(raw.to_string()),
    }
}

fn is_hub_key(tenant_key: Option<&str>) -> bool {
    tenant_key.is_some_and(|k| k.starts_with(HUB_PREFIX))
}

/// Match `host` against the known domains on a label boundary.
///
/// The hub domain is checked first: it is itself a subdomain of the default
/// domain.
fn known_domain(host: &str) -> Option<&'static str> {
    let host = host.trim_end_matches('.');
    [HUB_DOMAIN, DEFAULT_DOMAIN].into_iter().find(|domain| {
        host.eq_ignore_ascii_case(domain)
            || host
                .to_ascii_lowercase()
                .strip_suffix(domain)
                .is_some_and(|rest| rest.ends_with('.'))
    })
}
