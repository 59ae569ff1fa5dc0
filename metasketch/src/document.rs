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

//! Events and the metadata documents they are folded into.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::aggregate::Aggregates;
use crate::error::Error;

/// The entity an event is about, e.g. `{ "name": "eid", "value": 1 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity field name, e.g. `eid`.
    #[serde(default)]
    pub name: String,
    /// Entity value; `null` marks it as missing.
    #[serde(default)]
    pub value: Value,
}

/// One observed feature value, e.g. `{ "name": "obj", "value": "X" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Feature field name, e.g. `obj`.
    #[serde(default)]
    pub name: String,
    /// Observed value; `null` marks it as missing.
    #[serde(default)]
    pub value: Value,
}

/// The feature a metadata document aggregates; the document keeps only its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureName {
    /// Feature field name.
    pub name: String,
}

/// A single (entity, feature) observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEvent {
    /// Who the observation is about.
    #[serde(default = "missing_entity")]
    pub entity: Entity,
    /// What was observed.
    #[serde(default = "missing_feature")]
    pub feature: Feature,
}

fn missing_entity() -> Entity {
    Entity {
        name: String::new(),
        value: Value::Null,
    }
}

fn missing_feature() -> Feature {
    Feature {
        name: String::new(),
        value: Value::Null,
    }
}

impl FeatureEvent {
    /// Creates an event.
    pub fn new(
        entity_name: impl Into<String>,
        entity_value: impl Into<Value>,
        feature_name: impl Into<String>,
        feature_value: impl Into<Value>,
    ) -> Self {
        Self {
            entity: Entity {
                name: entity_name.into(),
                value: entity_value.into(),
            },
            feature: Feature {
                name: feature_name.into(),
                value: feature_value.into(),
            },
        }
    }

    /// Parses and validates an event in its wire shape
    /// `{ "entity": { "name", "value" }, "feature": { "name", "value" } }`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the text is not an event or a field is missing.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let event: FeatureEvent = serde_json::from_str(text)
            .map_err(|e| Error::validation(format!("malformed event: {e}")))?;
        event.validate()?;
        Ok(event)
    }

    /// Checks that entity and feature carry both a name and a value.
    ///
    /// # Errors
    ///
    /// Returns `Validation` describing the missing part.
    pub fn validate(&self) -> Result<(), Error> {
        if self.entity.name.is_empty() || self.entity.value.is_null() {
            return Err(Error::validation(
                "the event's 'entity' property is not a {name: ..., value: ...} object",
            ));
        }
        if self.feature.name.is_empty() || self.feature.value.is_null() {
            return Err(Error::validation(
                "the event's 'feature' property is not a {name: ..., value: ...} object",
            ));
        }
        Ok(())
    }

    /// Id of the metadata document this event folds into.
    pub fn document_id(&self) -> String {
        compose_id(&self.entity.name, &self.entity.value, &self.feature.name)
    }

    /// The feature value as fed to sketches and the unique-value set.
    pub fn sketch_key(&self) -> String {
        render_value(&self.feature.value)
    }
}

/// Aggregate metadata for one `(entity name, entity value, feature name)` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    /// Composite key, see [`compose_id`].
    pub id: String,
    /// The entity, value included.
    pub entity: Entity,
    /// The aggregated feature; only its name is kept.
    pub feature: FeatureName,
    /// Aggregates keyed by kind.
    #[serde(default)]
    pub aggregates: Aggregates,
    /// Always true; marks the document as metadata in a shared container.
    #[serde(rename = "isMetadata", default = "is_metadata")]
    pub is_metadata: bool,
}

fn is_metadata() -> bool {
    true
}

impl MetadataDocument {
    /// Creates the empty document for the event's composite key.
    pub fn for_event(event: &FeatureEvent) -> Self {
        Self {
            id: event.document_id(),
            entity: event.entity.clone(),
            feature: FeatureName {
                name: event.feature.name.clone(),
            },
            aggregates: Aggregates::default(),
            is_metadata: true,
        }
    }

    /// Parses a persisted document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the JSON does not match the document shape.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serializes the document to its persisted JSON shape.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if serialization fails.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Builds the deterministic document id `_en=<name>.ev=<value>.fn=<feature>`.
///
/// ```rust
/// # use metasketch::document::compose_id;
/// # use serde_json::json;
/// assert_eq!(compose_id("eid", &json!(1), "obj"), "_en=eid.ev=1.fn=obj");
/// assert_eq!(compose_id("uid", &json!("u-7"), "cat"), "_en=uid.ev=u-7.fn=cat");
/// ```
pub fn compose_id(entity_name: &str, entity_value: &Value, feature_name: &str) -> String {
    format!(
        "_en={entity_name}.ev={}.fn={feature_name}",
        render_value(entity_value)
    )
}

/// Renders a value the way it appears in ids and sketch keys: strings verbatim,
/// everything else as compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
