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

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use super::AtomicScope;
use super::DocumentStore;
use super::ReadResult;
use super::Version;
use crate::document::MetadataDocument;
use crate::error::Error;
use crate::error::ErrorKind;

/// In-memory [`DocumentStore`].
///
/// Documents are kept as JSON text so every read parses the persisted shape,
/// exactly like a remote store would. Scopes never hold the lock while the
/// caller's closure runs; staged writes are re-validated under the lock at
/// commit.
///
/// ```rust
/// # use metasketch::store::{DocumentStore, MemoryStore, ReadResult};
/// # use metasketch::document::{FeatureEvent, MetadataDocument};
/// let store = MemoryStore::new();
/// let doc = MetadataDocument::for_event(&FeatureEvent::new("eid", 1, "obj", "X"));
/// store.transact(|scope| scope.create(&doc)).unwrap();
/// assert_eq!(store.get(&doc.id).unwrap(), Some(doc));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    budget_failures: AtomicU32,
}

#[derive(Debug, Default)]
struct State {
    documents: HashMap<String, Stored>,
    last_version: Version,
    commits: u64,
}

#[derive(Debug, Clone)]
struct Stored {
    json: String,
    version: Version,
}

#[derive(Debug)]
enum Write {
    Create { id: String, json: String },
    Replace { id: String, json: String, expected: Version },
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` scope calls (reads or staged writes) fail with
    /// `BudgetExceeded`, as a store running out of its request budget would.
    pub fn exhaust_budget(&self, n: u32) {
        self.budget_failures.store(n, Ordering::SeqCst);
    }

    /// Stores raw JSON under `id`, bypassing validation. Returns the version.
    pub fn insert_raw(&self, id: impl Into<String>, json: impl Into<String>) -> Version {
        let mut state = self.state.lock();
        state.last_version += 1;
        let version = state.last_version;
        state.documents.insert(
            id.into(),
            Stored {
                json: json.into(),
                version,
            },
        );
        version
    }

    /// Returns the stored JSON text of `id`.
    pub fn raw(&self, id: &str) -> Option<String> {
        self.state.lock().documents.get(id).map(|s| s.json.clone())
    }

    /// Returns the committed version of `id`.
    pub fn version(&self, id: &str) -> Option<Version> {
        self.state.lock().documents.get(id).map(|s| s.version)
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.state.lock().documents.len()
    }

    /// Returns true if the store holds no document.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of transactions that committed at least one write.
    pub fn commits(&self) -> u64 {
        self.state.lock().commits
    }

    fn load(&self, id: &str) -> Option<Stored> {
        self.state.lock().documents.get(id).cloned()
    }

    fn take_budget_failure(&self) -> bool {
        self.budget_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn commit(&self, writes: Vec<Write>) -> Result<(), Error> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock();
        for write in &writes {
            match write {
                Write::Create { id, .. } => {
                    if state.documents.contains_key(id) {
                        return Err(create_conflict(id));
                    }
                }
                Write::Replace { id, expected, .. } => {
                    let current = state.documents.get(id).map(|s| s.version);
                    if current != Some(*expected) {
                        return Err(version_conflict(id, *expected, current));
                    }
                }
            }
        }

        for write in writes {
            state.last_version += 1;
            let version = state.last_version;
            let (id, json) = match write {
                Write::Create { id, json } => (id, json),
                Write::Replace { id, json, .. } => (id, json),
            };
            state.documents.insert(id, Stored { json, version });
        }
        state.commits += 1;
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn transact<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn AtomicScope) -> Result<T, Error>,
    {
        let mut scope = MemoryScope {
            store: self,
            staged: HashMap::new(),
            order: Vec::new(),
        };
        let result = f(&mut scope)?;
        let writes = scope.into_writes();
        self.commit(writes)?;
        Ok(result)
    }

    fn get(&self, id: &str) -> Result<Option<MetadataDocument>, Error> {
        self.load(id)
            .map(|stored| parse(id, &stored.json))
            .transpose()
    }
}

/// One open scope of a [`MemoryStore`].
///
/// Reads observe committed state only. At most one write per id is staged.
#[derive(Debug)]
pub struct MemoryScope<'a> {
    store: &'a MemoryStore,
    staged: HashMap<String, Write>,
    order: Vec<String>,
}

impl MemoryScope<'_> {
    fn stage(&mut self, id: &str, write: Write) -> Result<(), Error> {
        match self.staged.entry(id.to_owned()) {
            Entry::Occupied(_) => Err(Error::new(
                ErrorKind::Conflict,
                format!("document '{id}' already written in this scope"),
            )),
            Entry::Vacant(entry) => {
                entry.insert(write);
                self.order.push(id.to_owned());
                Ok(())
            }
        }
    }

    fn into_writes(mut self) -> Vec<Write> {
        let mut writes = Vec::with_capacity(self.order.len());
        for id in &self.order {
            if let Some(write) = self.staged.remove(id) {
                writes.push(write);
            }
        }
        writes
    }
}

impl AtomicScope for MemoryScope<'_> {
    fn read(&mut self, id: &str) -> Result<ReadResult, Error> {
        if self.store.take_budget_failure() {
            return Err(Error::budget_exceeded());
        }
        match self.store.load(id) {
            Some(stored) => Ok(ReadResult::Found(parse(id, &stored.json)?, stored.version)),
            None => Ok(ReadResult::NotFound),
        }
    }

    fn create(&mut self, doc: &MetadataDocument) -> Result<(), Error> {
        if self.store.take_budget_failure() {
            return Err(Error::budget_exceeded());
        }
        if self.store.load(&doc.id).is_some() {
            return Err(create_conflict(&doc.id));
        }
        let json = doc.to_json()?;
        self.stage(
            &doc.id,
            Write::Create {
                id: doc.id.clone(),
                json,
            },
        )
    }

    fn replace(&mut self, doc: &MetadataDocument, expected: Version) -> Result<(), Error> {
        if self.store.take_budget_failure() {
            return Err(Error::budget_exceeded());
        }
        let current = self.store.load(&doc.id).map(|s| s.version);
        if current != Some(expected) {
            return Err(version_conflict(&doc.id, expected, current));
        }
        let json = doc.to_json()?;
        self.stage(
            &doc.id,
            Write::Replace {
                id: doc.id.clone(),
                json,
                expected,
            },
        )
    }
}

fn parse(id: &str, json: &str) -> Result<MetadataDocument, Error> {
    MetadataDocument::from_json(json).map_err(|e| e.with_context("id", id))
}

fn create_conflict(id: &str) -> Error {
    Error::new(
        ErrorKind::Conflict,
        format!("document '{id}' already exists"),
    )
}

fn version_conflict(id: &str, expected: Version, current: Option<Version>) -> Error {
    let found = match current {
        Some(v) => v.to_string(),
        None => "none".to_owned(),
    };
    Error::new(
        ErrorKind::VersionConflict,
        format!("document '{id}' is at version {found}, expected {expected}"),
    )
}
