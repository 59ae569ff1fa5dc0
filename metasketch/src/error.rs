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

//! The crate-wide [`Error`] type.
//!
//! Every fallible operation returns an [`Error`] tagged with an [`ErrorKind`].
//! Callers branch on the kind: `RetryWith` and `BudgetExceeded` mean the whole
//! update may be re-run from scratch, everything else is final.

use std::fmt;

/// Classifies an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A caller-supplied parameter is out of range.
    InvalidArgument,
    /// Persisted sketch or document state is malformed.
    InvalidData,
    /// The incoming event is malformed and must not be retried.
    Validation,
    /// A document with the same id already exists.
    Conflict,
    /// The document was modified since it was read.
    VersionConflict,
    /// Another writer won the race; the whole update must be retried.
    RetryWith,
    /// The atomic scope ran out of its time/resource budget before completion.
    BudgetExceeded,
    /// Unrecoverable failure; never retried.
    Fatal,
}

impl ErrorKind {
    /// Returns the kind's name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::InvalidData => "InvalidData",
            ErrorKind::Validation => "Validation",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::VersionConflict => "VersionConflict",
            ErrorKind::RetryWith => "RetryWith",
            ErrorKind::BudgetExceeded => "BudgetExceeded",
            ErrorKind::Fatal => "Fatal",
        }
    }

    /// Whether an operation failing with this kind should be re-invoked from scratch.
    pub const fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::RetryWith | ErrorKind::BudgetExceeded)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error with a kind, a human readable message and optional key/value
/// context added while it travels up the stack.
///
/// # Examples
///
/// ```
/// # use metasketch::error::Error;
/// # use metasketch::error::ErrorKind;
/// let err = Error::new(ErrorKind::RetryWith, "document was modified")
///     .with_context("id", "_en=eid.ev=1.fn=obj");
/// assert!(err.is_retryable());
/// assert_eq!(err.context("id"), Some("_en=eid.ev=1.fn=obj"));
/// assert_eq!(
///     err.to_string(),
///     "RetryWith: document was modified [id=_en=eid.ev=1.fn=obj]"
/// );
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
}

impl Error {
    /// Creates an error without context.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Attaches a `key=value` pair.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Returns the kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the value recorded for a context key, if any.
    pub fn context(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the caller should retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl Error {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, msg)
    }

    pub(crate) fn invalid_data(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidData, msg)
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, msg)
    }

    pub(crate) fn retry_with(msg: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::RetryWith,
            format!("{msg}; retry from the client"),
        )
    }

    pub(crate) fn budget_exceeded() -> Self {
        Self::new(
            ErrorKind::BudgetExceeded,
            "the request was not accepted due to time/resource budget; retry from the client",
        )
    }

    pub(crate) fn fatal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, msg)
    }

    pub(crate) fn incompatible(name: &'static str, what: impl fmt::Display) -> Self {
        Self::invalid_argument(format!("incompatible {name}: {what}"))
    }

    pub(crate) fn malformed(field: &'static str, msg: impl fmt::Display) -> Self {
        Self::invalid_data(format!("malformed {field}: {msg}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_data(err.to_string()).with_context("source", "json")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(((first_key, first_value), rest)) = self.context.split_first() {
            write!(f, " [{first_key}={first_value}")?;
            for (key, value) in rest {
                write!(f, ", {key}={value}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return f
                .debug_struct("Error")
                .field("kind", &self.kind)
                .field("message", &self.message)
                .field("context", &self.context)
                .finish();
        }
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn test_display_without_context() {
        let err = Error::validation("feature value is missing");
        assert_snapshot!(err, @"Validation: feature value is missing");
    }

    #[test]
    fn test_display_with_context() {
        let err = Error::retry_with("meta document was created by another writer")
            .with_context("id", "_en=eid.ev=1.fn=obj")
            .with_context("attempt", 3);
        assert_eq!(
            err.to_string(),
            "RetryWith: meta document was created by another writer; retry from the client \
             [id=_en=eid.ev=1.fn=obj, attempt=3]"
        );
    }

    #[test]
    fn test_alternate_debug_lists_fields() {
        let err = Error::fatal("gave up").with_context("attempts", 100);
        assert_snapshot!(format!("{err:#?}"), @r#"
        Error {
            kind: Fatal,
            message: "gave up",
            context: [
                (
                    "attempts",
                    "100",
                ),
            ],
        }
        "#);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(Error::retry_with("x").is_retryable());
        assert!(Error::budget_exceeded().is_retryable());
        assert!(!Error::validation("x").is_retryable());
        assert!(!Error::fatal("x").is_retryable());
        assert!(!Error::new(ErrorKind::Conflict, "x").is_retryable());
    }

    #[test]
    fn test_context_lookup() {
        let err = Error::fatal("gave up").with_context("attempts", 100);
        assert_eq!(err.context("attempts"), Some("100"));
        assert_eq!(err.context("id"), None);
    }

    #[test]
    fn test_json_errors_are_invalid_data() {
        let err: Error = serde_json::from_str::<u32>("\"x\"").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert_eq!(err.context("source"), Some("json"));
    }
}
