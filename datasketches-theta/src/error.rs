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

//! Error types for sketch construction, merging and deserialization.

use std::fmt;

/// The category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The family byte of the input is not accepted for its serial version.
    IncompatibleFamily,
    /// The serial version byte of the input is not supported.
    UnknownFormatVersion,
    /// The input was built with a different hash seed.
    SeedMismatch,
    /// A construction parameter is out of its valid range.
    ConfigurationError,
    /// The input is truncated or its preamble is inconsistent.
    MalformedInput,
    /// A caller-supplied buffer is too small for the requested operation.
    CapacityExceeded,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::IncompatibleFamily => "IncompatibleFamily",
            ErrorKind::UnknownFormatVersion => "UnknownFormatVersion",
            ErrorKind::SeedMismatch => "SeedMismatch",
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::MalformedInput => "MalformedInput",
            ErrorKind::CapacityExceeded => "CapacityExceeded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by fallible sketch operations.
///
/// Every error is reported at the offending call and leaves the receiver unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
}

impl Error {
    /// Creates a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: vec![],
        }
    }

    /// Attaches a key/value pair describing where the error happened.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message of this error.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigurationError, message)
    }

    pub(crate) fn deserial(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedInput, message)
    }

    pub(crate) fn insufficient_data(tag: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::MalformedInput,
            format!("insufficient data: {tag}"),
        )
    }

    pub(crate) fn invalid_family(expected: &str, actual: u8, name: &'static str) -> Self {
        Self::new(
            ErrorKind::IncompatibleFamily,
            format!("{name} requires family {expected}, got {actual}"),
        )
    }

    pub(crate) fn unsupported_serial_version(expected: &str, actual: u8) -> Self {
        Self::new(
            ErrorKind::UnknownFormatVersion,
            format!("unsupported serial version: expected {expected}, got {actual}"),
        )
    }

    pub(crate) fn invalid_preamble_longs(expected: &[u8], actual: u8) -> Self {
        Self::new(
            ErrorKind::MalformedInput,
            format!("invalid preamble longs: expected one of {expected:?}, got {actual}"),
        )
    }

    pub(crate) fn seed_hash_mismatch(expected: u16, actual: u16) -> Self {
        Self::new(
            ErrorKind::SeedMismatch,
            format!("seed hash mismatch: expected 0x{expected:04X}, got 0x{actual:04X}"),
        )
    }

    pub(crate) fn capacity_exceeded(required: usize, actual: usize) -> Self {
        Self::new(
            ErrorKind::CapacityExceeded,
            format!("buffer too small: requires {required} bytes, got {actual}"),
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}: {value}")?;
            }
            write!(f, " }}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}
