// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! The transactional update protocol: one event, one document, one atomic
//! read-modify-write.

use std::fmt;

use tracing::debug;

use crate::config::SketchParams;
use crate::document::FeatureEvent;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::policy;
use crate::store::AtomicScope;
use crate::store::DocumentStore;
use crate::store::ReadResult;

/// What an update did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOutcome {
    /// No document existed; one was created.
    Created,
    /// The document changed and was replaced.
    Replaced,
    /// The event changed nothing; no write was issued.
    Unchanged,
    /// The feature is not tracked; the store was not touched.
    Skipped,
}

impl UpdateOutcome {
    /// Returns true if the update wrote a document.
    pub fn wrote(self) -> bool {
        matches!(self, UpdateOutcome::Created | UpdateOutcome::Replaced)
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateOutcome::Created => "created",
            UpdateOutcome::Replaced => "replaced",
            UpdateOutcome::Unchanged => "unchanged",
            UpdateOutcome::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Applies `event` to its metadata document inside `scope`.
///
/// The document is read, folded with [`policy::apply_event`], and written back
/// only if something changed: created when it did not exist, replaced guarded
/// by the version it was read at otherwise. Losing a race to another writer
/// surfaces as `RetryWith`; the caller retries the whole invocation.
///
/// # Errors
///
/// - `Validation` if the event is malformed.
/// - `RetryWith` if another writer created or modified the document first.
/// - `BudgetExceeded` if the scope ran out of budget.
/// - `InvalidData` if the stored document is malformed.
pub fn update_feature(
    scope: &mut dyn AtomicScope,
    event: &FeatureEvent,
    params: &SketchParams,
) -> Result<UpdateOutcome, Error> {
    event.validate()?;
    if policy::aggregates_for(&event.feature.name).is_none() {
        debug!(feature = %event.feature.name, "feature is not tracked, skipping");
        return Ok(UpdateOutcome::Skipped);
    }

    let id = event.document_id();
    match scope.read(&id)? {
        ReadResult::NotFound => {
            let applied = policy::apply_event(None, event, params)?;
            scope.create(&applied.document).map_err(lost_race)?;
            debug!(id = %id, "created meta document");
            Ok(UpdateOutcome::Created)
        }
        ReadResult::Found(doc, version) => {
            let applied = policy::apply_event(Some(doc), event, params)?;
            if !applied.changed {
                debug!(id = %id, "meta document unchanged, no write");
                return Ok(UpdateOutcome::Unchanged);
            }
            scope
                .replace(&applied.document, version)
                .map_err(lost_race)?;
            debug!(id = %id, version, "replaced meta document");
            Ok(UpdateOutcome::Replaced)
        }
    }
}

/// Runs [`update_feature`] in a fresh atomic scope of `store`.
///
/// A commit rejected because another writer got there first is reported as
/// `RetryWith`, like a conflict inside the scope.
///
/// # Errors
///
/// Same as [`update_feature`].
pub fn update_document<S: DocumentStore>(
    store: &S,
    event: &FeatureEvent,
    params: &SketchParams,
) -> Result<UpdateOutcome, Error> {
    store
        .transact(|scope| update_feature(scope, event, params))
        .map_err(lost_race)
}

fn lost_race(err: Error) -> Error {
    match err.kind() {
        ErrorKind::Conflict => Error::retry_with(format!(
            "meta document was created by another writer: {}",
            err.message()
        )),
        ErrorKind::VersionConflict => Error::retry_with(format!(
            "meta document was modified by another writer: {}",
            err.message()
        )),
        _ => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_outcome_sequence() {
        let store = MemoryStore::new();
        let params = SketchParams::default();
        let x = FeatureEvent::new("eid", 1, "obj", "X");
        let y = FeatureEvent::new("eid", 1, "obj", "Y");

        assert_eq!(update_document(&store, &x, &params).unwrap(), UpdateOutcome::Created);
        assert_eq!(update_document(&store, &x, &params).unwrap(), UpdateOutcome::Unchanged);
        assert_eq!(update_document(&store, &y, &params).unwrap(), UpdateOutcome::Replaced);
        assert_eq!(store.commits(), 2);
    }

    #[test]
    fn test_untracked_feature_is_skipped() {
        let store = MemoryStore::new();
        let event = FeatureEvent::new("eid", 1, "color", "red");
        let outcome = update_document(&store, &event, &SketchParams::default()).unwrap();
        assert_eq!(outcome, UpdateOutcome::Skipped);
        assert!(!outcome.wrote());
        assert!(store.is_empty());
    }

    #[test]
    fn test_conflicts_become_retry_with() {
        let store = MemoryStore::new();
        let params = SketchParams::default();
        let event = FeatureEvent::new("eid", 1, "obj", "X");

        // both scopes read NotFound, the inner one commits first
        let err = store
            .transact(|scope| {
                let outcome = update_feature(scope, &event, &params)?;
                update_document(&store, &event, &params)?;
                Ok(outcome)
            })
            .map_err(lost_race)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RetryWith);
        assert!(err.message().ends_with("retry from the client"));
    }

    #[test]
    fn test_invalid_event() {
        let store = MemoryStore::new();
        let event = FeatureEvent::new("eid", serde_json::Value::Null, "obj", "X");
        let err = update_document(&store, &event, &SketchParams::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
