// mch-raw-core
// Copyright (c) 2026 MCH Raw Data Software Authors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `error` module defines the common error taxonomy for the codec.

use std::error::Error as StdError;
use std::fmt;

/// `MchRawError` enumerates every way an operation in this crate can fail.
///
/// Not every variant aborts the pipeline: see the propagation policy
/// documented on each variant.
#[derive(Debug)]
pub enum MchRawError {
    /// An input violated a documented precondition (bit-width exceeded, a
    /// span whose size is not a multiple of the expected granularity, an
    /// e-link index out of range, ...). The offending operation had no
    /// effect.
    BadArgument(String),
    /// The dispatch token (format, charge-sum mode) carried by a later RDH
    /// contradicted the one established for the session. Fatal for the
    /// session.
    FormatMismatch(String),
    /// An RDH failed its version/size/`memorySize` checks. Fatal for the
    /// current buffer only; the decoder instance remains usable for the
    /// next buffer.
    RdhInvalid(String),
    /// A lookup through an [`ElectronicMapping`](crate::elecmap::ElectronicMapping)
    /// failed to resolve a key that the caller expected to be mapped. This
    /// is a configuration error, not a data error.
    MissingMapping(String),
}

impl fmt::Display for MchRawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MchRawError::BadArgument(msg) => write!(f, "bad argument: {msg}"),
            MchRawError::FormatMismatch(msg) => write!(f, "format mismatch: {msg}"),
            MchRawError::RdhInvalid(msg) => write!(f, "invalid RDH: {msg}"),
            MchRawError::MissingMapping(msg) => write!(f, "missing electronic mapping: {msg}"),
        }
    }
}

impl StdError for MchRawError {}

/// Convenience alias for the crate's fallible operations.
pub type Result<T> = std::result::Result<T, MchRawError>;

/// Convenience function to create a [`MchRawError::BadArgument`].
pub fn bad_argument<T>(msg: impl Into<String>) -> Result<T> {
    Err(MchRawError::BadArgument(msg.into()))
}

/// Convenience function to create a [`MchRawError::FormatMismatch`].
pub fn format_mismatch<T>(msg: impl Into<String>) -> Result<T> {
    Err(MchRawError::FormatMismatch(msg.into()))
}

/// Convenience function to create a [`MchRawError::RdhInvalid`].
pub fn rdh_invalid<T>(msg: impl Into<String>) -> Result<T> {
    Err(MchRawError::RdhInvalid(msg.into()))
}

/// Convenience function to create a [`MchRawError::MissingMapping`].
pub fn missing_mapping<T>(msg: impl Into<String>) -> Result<T> {
    Err(MchRawError::MissingMapping(msg.into()))
}
