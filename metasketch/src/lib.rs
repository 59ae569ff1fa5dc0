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

//! # metasketch
//!
//! Streaming aggregate metadata over event feeds. Each `(entity, feature)` pair
//! owns a small JSON document holding exact aggregates (min, max, unique
//! values) and mergeable sketches (HyperLogLog, Bloom filter, Count-Min). Events
//! are folded into documents by an atomic read-modify-write protocol under
//! optimistic concurrency, driven by a batched dispatcher with bounded retry.
//!
//! The crate is divided into modules, leaf first:
//!
//! - [`hash`], [`hll`], [`bloom`], [`countmin`] and [`exact`]: the aggregate
//!   primitives.
//! - [`document`], [`aggregate`] and [`policy`]: the document model and the pure
//!   fold of an event into a document.
//! - [`store`], [`update`] and [`dispatch`]: persistence, the update protocol
//!   and fan-out.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

pub mod aggregate;
pub mod bloom;
pub mod config;
pub mod countmin;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod exact;
pub mod hash;
pub mod hll;
pub mod policy;
pub mod store;
pub mod update;
