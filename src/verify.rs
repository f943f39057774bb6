//! Write-path verification
//!
//! Some update endpoints apply a mutation and then answer 2xx with a body that
//! does not decode. Retrying would repeat the mutation, and reporting failure
//! would be wrong, so on exactly that condition ([`Error::MalformedBody`]) the
//! entity is fetched once more and compared against what the caller asked for.
//! Every other failure is returned untouched.

use std::future::Future;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::FieldMismatch;
use crate::{Error, Result};

/// The change a caller wants applied to one entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateIntent {
    /// Target entity id
    pub id: String,
    /// Field path → expected value, in the order they should be checked
    pub fields: Vec<(String, Value)>,
}

impl UpdateIntent {
    /// Intent for `id` with no fields yet
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Vec::new(),
        }
    }

    /// Builder: the entity should end up with `field == value`
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }
}

/// Outcome of comparing an intent with a fetched entity
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationResult {
    /// Every intended field matched; carries the fetched entity
    Confirmed(Value),
    /// At least one field differs; all mismatches in intent order
    Mismatched(Vec<FieldMismatch>),
}

/// Look up a dot-separated path (array segments by index)
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Compare `entity` against every field of `intent`
#[must_use]
pub fn reconcile(intent: &UpdateIntent, entity: Value) -> VerificationResult {
    let mismatches: Vec<FieldMismatch> = intent
        .fields
        .iter()
        .filter_map(|(field, expected)| {
            let actual = lookup(&entity, field);
            (actual != Some(expected)).then(|| FieldMismatch {
                field: field.clone(),
                expected: expected.clone(),
                actual: actual.cloned(),
            })
        })
        .collect();

    if mismatches.is_empty() {
        VerificationResult::Confirmed(entity)
    } else {
        VerificationResult::Mismatched(mismatches)
    }
}

/// Run `write`; on a malformed-success body, verify with one `fetch`.
///
/// # Errors
///
/// - any error from `write` other than [`Error::MalformedBody`], unchanged
/// - any error from the verification `fetch`, unchanged
/// - [`Error::VerificationFailed`] listing every mismatching field
pub async fn write_verified<W, WF, F, FF>(intent: &UpdateIntent, write: W, fetch: F) -> Result<Value>
where
    W: FnOnce() -> WF,
    WF: Future<Output = Result<Value>>,
    F: FnOnce(String) -> FF,
    FF: Future<Output = Result<Value>>,
{
    let message = match write().await {
        Ok(entity) => return Ok(entity),
        Err(Error::MalformedBody { status, message }) => {
            warn!(
                id = %intent.id,
                status,
                error = %message,
                "Update returned an unreadable body; verifying entity state"
            );
            message
        }
        Err(e) => return Err(e),
    };

    let fresh = fetch(intent.id.clone()).await?;
    match reconcile(intent, fresh) {
        VerificationResult::Confirmed(entity) => {
            info!(id = %intent.id, "Update verified despite unreadable response");
            Ok(entity)
        }
        VerificationResult::Mismatched(mismatches) => {
            warn!(
                id = %intent.id,
                mismatches = mismatches.len(),
                original_error = %message,
                "Update verification failed"
            );
            Err(Error::VerificationFailed(mismatches))
        }
    }
}
