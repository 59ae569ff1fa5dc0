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

//! Fans raw records out into feature events and drives each one through the
//! update protocol with bounded retry.
//!
//! Records are processed in batches of [`DispatchConfig::batch_size`]. Every
//! event of a batch runs concurrently on the rayon pool and the whole batch is
//! joined before the next one starts. A `RetryWith` or `BudgetExceeded`
//! failure re-runs the full read-modify-write, up to
//! [`DispatchConfig::max_attempts`] times; any other failure is reported
//! without retry. One failing event never stops its siblings.
//!
//! ```rust
//! # use metasketch::aggregate::AggregateKind;
//! # use metasketch::config::DispatchConfig;
//! # use metasketch::dispatch::Dispatcher;
//! # use metasketch::store::{read_aggregate, MemoryStore};
//! # use serde_json::json;
//! let dispatcher = Dispatcher::new(MemoryStore::new(), DispatchConfig::default()).unwrap();
//! let report = dispatcher.run(&[
//!     json!({ "eid": 1, "cid": "c", "uid": "u", "time": 5, "src_evt": "s", "cat": "a",
//!             "obj": "X" }),
//!     json!({ "eid": 1, "cid": "c", "uid": "u", "time": 9, "src_evt": "s", "cat": "b",
//!             "obj": "Y" }),
//! ]);
//! assert!(report.failures.is_empty());
//! assert_eq!(report.events, 24);
//!
//! let max = read_aggregate(dispatcher.store(), "eid", &json!(1), "time", AggregateKind::Max);
//! assert_eq!(max.unwrap(), Some(json!(9)));
//! ```

use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use rayon::prelude::*;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::DispatchConfig;
use crate::document::Entity;
use crate::document::Feature;
use crate::document::FeatureEvent;
use crate::error::Error;
use crate::store::DocumentStore;
use crate::update::UpdateOutcome;
use crate::update::update_document;

/// Expands one raw record into the cross product of its entity and feature
/// fields, entities outermost.
///
/// A field missing from the record yields an event with a `null` value, which
/// the protocol rejects as a validation error.
///
/// ```rust
/// # use metasketch::dispatch::expand_record;
/// # use serde_json::json;
/// let entities = ["eid".to_owned()];
/// let features = ["time".to_owned(), "obj".to_owned()];
/// let events = expand_record(&json!({ "eid": 7, "time": 3, "obj": "X" }), &entities, &features);
/// assert_eq!(events.len(), 2);
/// assert_eq!(events[1].document_id(), "_en=eid.ev=7.fn=obj");
/// ```
pub fn expand_record(
    record: &Value,
    entities: &[String],
    features: &[String],
) -> Vec<FeatureEvent> {
    let field = |name: &str| record.get(name).cloned().unwrap_or(Value::Null);
    let mut events = Vec::with_capacity(entities.len() * features.len());
    for entity in entities {
        let entity_value = field(entity);
        for feature in features {
            events.push(FeatureEvent {
                entity: Entity {
                    name: entity.clone(),
                    value: entity_value.clone(),
                },
                feature: Feature {
                    name: feature.clone(),
                    value: field(feature),
                },
            });
        }
    }
    events
}

/// A successfully applied event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// What the final attempt did.
    pub outcome: UpdateOutcome,
    /// Number of attempts, at least 1.
    pub attempts: u32,
}

/// An event that could not be applied.
#[derive(Debug)]
pub struct EventFailure {
    /// The event.
    pub event: FeatureEvent,
    /// `Fatal` after exhausted retries, otherwise the error of the attempt.
    pub error: Error,
    /// Number of attempts made.
    pub attempts: u32,
}

/// Summary of a [`Dispatcher::run`].
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Records consumed.
    pub records: usize,
    /// Events derived from the records.
    pub events: usize,
    /// Batches processed.
    pub batches: usize,
    /// Successful events per outcome.
    pub outcomes: HashMap<UpdateOutcome, usize>,
    /// Total retries across all events, i.e. lost races and budget exhaustions.
    pub retries: u64,
    /// Events that failed.
    pub failures: Vec<EventFailure>,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl DispatchReport {
    /// Number of successful events that ended with `outcome`.
    pub fn count(&self, outcome: UpdateOutcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    /// Number of events applied without failure.
    pub fn succeeded(&self) -> usize {
        self.outcomes.values().sum()
    }

    fn record(&mut self, result: Result<Delivery, EventFailure>) {
        match result {
            Ok(delivery) => {
                self.retries += u64::from(delivery.attempts - 1);
                *self.outcomes.entry(delivery.outcome).or_default() += 1;
            }
            Err(failure) => {
                self.retries += u64::from(failure.attempts.saturating_sub(1));
                self.failures.push(failure);
            }
        }
    }
}

/// Applies records to a [`DocumentStore`].
#[derive(Debug)]
pub struct Dispatcher<S> {
    store: S,
    config: DispatchConfig,
}

impl<S: DocumentStore> Dispatcher<S> {
    /// Creates a dispatcher.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `config` does not validate.
    pub fn new(store: S, config: DispatchConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Returns the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Consumes the dispatcher, returning the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Processes `records` batch by batch and reports what happened.
    pub fn run(&self, records: &[Value]) -> DispatchReport {
        let start = Instant::now();
        let mut report = DispatchReport::default();

        for batch in records.chunks(self.config.batch_size) {
            let events: Vec<FeatureEvent> = batch
                .iter()
                .flat_map(|record| {
                    expand_record(record, &self.config.entities, &self.config.features)
                })
                .collect();
            let results: Vec<_> = events.par_iter().map(|event| self.deliver(event)).collect();

            report.records += batch.len();
            report.events += events.len();
            report.batches += 1;
            for result in results {
                report.record(result);
            }

            info!(
                records = report.records,
                retries = report.retries,
                failures = report.failures.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "batch {} done",
                report.batches
            );
        }

        report.elapsed = start.elapsed();
        report
    }

    /// Applies one event, retrying lost races and budget exhaustion.
    ///
    /// # Errors
    ///
    /// Returns the failure with the number of attempts made. Exhausted retries
    /// are reported as `Fatal`.
    pub fn deliver(&self, event: &FeatureEvent) -> Result<Delivery, EventFailure> {
        let max_attempts = self.config.max_attempts;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match update_document(&self.store, event, &self.config.sketch) {
                Ok(outcome) => return Ok(Delivery { outcome, attempts }),
                Err(err) => err,
            };

            if !err.is_retryable() {
                warn!(id = %event.document_id(), "event failed: {err}");
                return Err(EventFailure {
                    event: event.clone(),
                    error: err,
                    attempts,
                });
            }

            if attempts >= max_attempts {
                let id = event.document_id();
                warn!(id = %id, attempts, "all retries are over, giving up: {err}");
                return Err(EventFailure {
                    event: event.clone(),
                    error: Error::fatal("all retries are over, giving up")
                        .with_context("id", id)
                        .with_context("attempts", attempts)
                        .with_context("last_error", err.kind()),
                    attempts,
                });
            }

            debug!(
                id = %event.document_id(),
                attempt = attempts,
                kind = %err.kind(),
                "retrying update"
            );
            if let Some(delay) = self.config.backoff(attempts) {
                thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;

    fn record(eid: i64, obj: &str) -> Value {
        json!({
            "eid": eid, "cid": "c1", "uid": "u1", "time": eid, "src_evt": "s", "cat": "k",
            "obj": obj
        })
    }

    #[test]
    fn test_expand_is_cross_product() {
        let config = DispatchConfig::default();
        let events = expand_record(&record(1, "X"), &config.entities, &config.features);
        assert_eq!(events.len(), 12);
        assert_eq!(events[0].document_id(), "_en=eid.ev=1.fn=time");
        assert_eq!(events[11].document_id(), "_en=uid.ev=u1.fn=obj");
        assert!(events.iter().all(|e| e.validate().is_ok()));
    }

    #[test]
    fn test_missing_field_fails_validation_only_for_its_events() {
        let dispatcher = Dispatcher::new(MemoryStore::new(), DispatchConfig::default()).unwrap();
        let record = json!({ "eid": 1, "cid": "c", "uid": "u", "time": 1, "cat": "k", "obj": "X" });
        let report = dispatcher.run(&[record]);
        assert_eq!(report.events, 12);
        assert_eq!(report.failures.len(), 3);
        assert!(report
            .failures
            .iter()
            .all(|f| f.error.kind() == ErrorKind::Validation && f.attempts == 1));
        assert_eq!(report.succeeded(), 9);
        assert_eq!(report.retries, 0);
    }

    #[test]
    fn test_batches() {
        let config = DispatchConfig::default().batch_size(2);
        let dispatcher = Dispatcher::new(MemoryStore::new(), config).unwrap();
        let records: Vec<_> = (0..5).map(|i| record(i, "X")).collect();
        let report = dispatcher.run(&records);
        assert_eq!(report.batches, 3);
        assert_eq!(report.records, 5);
        assert_eq!(report.events, 60);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_budget_exhaustion_is_retried() {
        let store = MemoryStore::new();
        store.exhaust_budget(3);
        let dispatcher = Dispatcher::new(store, DispatchConfig::default()).unwrap();
        let delivery = dispatcher
            .deliver(&FeatureEvent::new("eid", 1, "obj", "X"))
            .unwrap();
        assert_eq!(delivery.attempts, 4);
        assert_eq!(delivery.outcome, UpdateOutcome::Created);
    }

    #[test]
    fn test_exhausted_retries_are_fatal() {
        let store = MemoryStore::new();
        store.exhaust_budget(10);
        let dispatcher = Dispatcher::new(store, DispatchConfig::default().max_attempts(3)).unwrap();
        let failure = dispatcher
            .deliver(&FeatureEvent::new("eid", 1, "obj", "X"))
            .unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.error.kind(), ErrorKind::Fatal);
        assert_eq!(failure.error.context("last_error"), Some("BudgetExceeded"));
        assert!(dispatcher.store().is_empty());
    }
}
