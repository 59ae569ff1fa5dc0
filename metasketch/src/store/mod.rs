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

//! The document store consumed by the update protocol.
//!
//! A store exposes atomic scopes: [`DocumentStore::transact`] runs a closure
//! against an [`AtomicScope`] and either commits every write the closure staged
//! or none of them. Writes are guarded optimistically. `create` fails with
//! `Conflict` if the id already exists, and `replace` fails with
//! `VersionConflict` if the document changed since the version was read.

mod memory;

pub use self::memory::MemoryScope;
pub use self::memory::MemoryStore;

use std::sync::Arc;

use serde_json::Value;

use crate::aggregate::AggregateKind;
use crate::document::MetadataDocument;
use crate::document::compose_id;
use crate::error::Error;

/// Opaque version token returned by reads and checked by replaces.
pub type Version = u64;

/// Outcome of a point read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    /// The document and the version it was read at.
    Found(MetadataDocument, Version),
    /// No document with that id.
    NotFound,
}

/// Operations available inside one atomic scope.
///
/// Any call may fail with `BudgetExceeded`, after which the scope must be
/// abandoned.
pub trait AtomicScope {
    /// Reads the committed document with `id`.
    fn read(&mut self, id: &str) -> Result<ReadResult, Error>;

    /// Stages the creation of `doc`; fails with `Conflict` if its id exists.
    fn create(&mut self, doc: &MetadataDocument) -> Result<(), Error>;

    /// Stages overwriting `doc`; fails with `VersionConflict` unless the stored
    /// document is still at `expected`.
    fn replace(&mut self, doc: &MetadataDocument, expected: Version) -> Result<(), Error>;
}

/// A keyed document store supporting single-scope atomic updates.
pub trait DocumentStore: Send + Sync {
    /// Runs `f` in a fresh atomic scope.
    ///
    /// Staged writes are committed only if `f` returns `Ok` and every write is
    /// still valid at commit time; otherwise nothing is written.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, or `Conflict` / `VersionConflict` if another
    /// writer committed first.
    fn transact<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn AtomicScope) -> Result<T, Error>;

    /// Reads a committed document outside of any scope.
    fn get(&self, id: &str) -> Result<Option<MetadataDocument>, Error>;
}

impl<S: DocumentStore> DocumentStore for &S {
    fn transact<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn AtomicScope) -> Result<T, Error>,
    {
        (**self).transact(f)
    }

    fn get(&self, id: &str) -> Result<Option<MetadataDocument>, Error> {
        (**self).get(id)
    }
}

impl<S: DocumentStore> DocumentStore for Arc<S> {
    fn transact<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn AtomicScope) -> Result<T, Error>,
    {
        (**self).transact(f)
    }

    fn get(&self, id: &str) -> Result<Option<MetadataDocument>, Error> {
        (**self).get(id)
    }
}

/// Returns the current value of one aggregate, or `None` if the document or
/// the aggregate does not exist.
///
/// # Errors
///
/// Returns `InvalidData` if the stored document cannot be parsed.
pub fn read_aggregate<S: DocumentStore>(
    store: &S,
    entity_name: &str,
    entity_value: &Value,
    feature_name: &str,
    kind: AggregateKind,
) -> Result<Option<Value>, Error> {
    let id = compose_id(entity_name, entity_value, feature_name);
    Ok(store.get(&id)?.and_then(|doc| doc.aggregates.value(kind)))
}
