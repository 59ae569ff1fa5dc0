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

//! Which aggregates a feature maintains, and the pure fold of one event into
//! a document.

use tracing::trace;

use crate::aggregate::AggregateKind;
use crate::config::SketchParams;
use crate::document::FeatureEvent;
use crate::document::MetadataDocument;
use crate::error::Error;

const POLICY: &[(&str, &[AggregateKind])] = &[
    (
        "cat",
        &[
            AggregateKind::CountUnique,
            AggregateKind::CountUniqueHll,
            AggregateKind::Exists,
            AggregateKind::CountMin,
        ],
    ),
    ("src_evt", &[AggregateKind::CountUnique]),
    ("time", &[AggregateKind::Min, AggregateKind::Max]),
    ("obj", &[AggregateKind::CountUniqueHll]),
];

/// Returns the aggregate kinds maintained for `feature_name`, or `None` if the
/// feature is not tracked.
///
/// ```rust
/// # use metasketch::aggregate::AggregateKind;
/// # use metasketch::policy::aggregates_for;
/// assert_eq!(
///     aggregates_for("time"),
///     Some(&[AggregateKind::Min, AggregateKind::Max][..])
/// );
/// assert_eq!(aggregates_for("unknown"), None);
/// ```
pub fn aggregates_for(feature_name: &str) -> Option<&'static [AggregateKind]> {
    POLICY
        .iter()
        .find(|(name, _)| *name == feature_name)
        .map(|(_, kinds)| *kinds)
}

/// Every tracked feature name.
pub fn tracked_features() -> impl Iterator<Item = &'static str> {
    POLICY.iter().map(|(name, _)| *name)
}

/// Result of folding one event into a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// The document after the event.
    pub document: MetadataDocument,
    /// Whether anything differs from the document that was passed in.
    pub changed: bool,
}

/// Folds `event` into `existing`, or into a fresh document when there is none.
///
/// Every aggregate the feature maps to receives exactly one update. Missing
/// aggregates are created from `params`; existing ones keep the parameters
/// they were persisted with. The function has no side effects and can be
/// re-run on every retry.
///
/// # Errors
///
/// Returns `InvalidArgument` if the feature is not tracked or `params` cannot
/// build a missing aggregate, and `InvalidData` if `existing` belongs to a
/// different key.
pub fn apply_event(
    existing: Option<MetadataDocument>,
    event: &FeatureEvent,
    params: &SketchParams,
) -> Result<Applied, Error> {
    let kinds = aggregates_for(&event.feature.name).ok_or_else(|| {
        Error::invalid_argument(format!(
            "feature '{}' has no aggregate policy",
            event.feature.name
        ))
    })?;

    let id = event.document_id();
    let (mut document, mut changed) = match existing {
        Some(doc) if doc.id != id => {
            return Err(Error::invalid_data(format!(
                "document '{}' does not belong to key '{id}'",
                doc.id
            )));
        }
        Some(doc) => (doc, false),
        None => (MetadataDocument::for_event(event), true),
    };

    let key = event.sketch_key();
    for kind in kinds {
        let (state, created) = document.aggregates.get_or_create(*kind, params)?;
        let updated = state.apply(&key, &event.feature.value);
        trace!(id = %id, kind = kind.name(), created, updated, "applied event");
        changed |= created || updated;
    }

    Ok(Applied { document, changed })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_every_kind_is_covered() {
        let mut kinds: Vec<_> = tracked_features()
            .flat_map(|f| aggregates_for(f).unwrap_or_default().iter().copied())
            .collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), 6);
    }

    #[test]
    fn test_new_document_is_changed() {
        let event = FeatureEvent::new("eid", 1, "src_evt", "login");
        let applied = apply_event(None, &event, &SketchParams::default()).unwrap();
        assert!(applied.changed);
        assert_eq!(applied.document.id, "_en=eid.ev=1.fn=src_evt");
        assert_eq!(
            applied.document.aggregates.value(AggregateKind::CountUnique),
            Some(json!(1))
        );
    }

    #[test]
    fn test_repeated_value_is_unchanged() {
        let params = SketchParams::default();
        let event = FeatureEvent::new("eid", 1, "obj", "X");
        let first = apply_event(None, &event, &params).unwrap();
        let second = apply_event(Some(first.document.clone()), &event, &params).unwrap();
        assert!(!second.changed);
        assert_eq!(second.document, first.document);
    }

    #[test]
    fn test_time_tracks_extremes() {
        let params = SketchParams::default();
        let mut doc = None;
        for t in [50, 20, 80, 60] {
            let event = FeatureEvent::new("uid", "u1", "time", t);
            doc = Some(apply_event(doc, &event, &params).unwrap().document);
        }
        let doc = doc.unwrap();
        assert_eq!(doc.aggregates.value(AggregateKind::Min), Some(json!(20)));
        assert_eq!(doc.aggregates.value(AggregateKind::Max), Some(json!(80)));

        let inside = FeatureEvent::new("uid", "u1", "time", 70);
        assert!(!apply_event(Some(doc), &inside, &params).unwrap().changed);
    }

    #[test]
    fn test_missing_aggregate_is_added_to_existing_document() {
        let params = SketchParams::default();
        let event = FeatureEvent::new("cid", 3, "cat", "books");
        let mut doc = apply_event(None, &event, &params).unwrap().document;
        doc.aggregates = Default::default();
        let applied = apply_event(Some(doc), &event, &params).unwrap();
        assert!(applied.changed);
        assert_eq!(applied.document.aggregates.len(), 4);
    }

    #[test]
    fn test_rejects_foreign_document_and_untracked_feature() {
        let params = SketchParams::default();
        let doc = apply_event(None, &FeatureEvent::new("eid", 1, "obj", "X"), &params)
            .unwrap()
            .document;
        let other = FeatureEvent::new("eid", 2, "obj", "X");
        let err = apply_event(Some(doc), &other, &params).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidData);

        let untracked = FeatureEvent::new("eid", 1, "color", "red");
        let err = apply_event(None, &untracked, &params).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
