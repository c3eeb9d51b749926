// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io;
use thiserror::Error;
use crate::usb::transport::TransferStatus;

/// Non-fatal problems found while decoding a descriptor buffer.
///
/// These are collected next to the decoded tree instead of aborting the walk.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{name} at offset {offset}: reading {size} bytes exceeds the {available} bytes available")]
    OutOfBounds {
        name: &'static str,
        offset: usize,
        size: usize,
        available: usize,
    },

    #[error("Descriptor at offset {offset} has invalid length {length}, decoding stopped")]
    MalformedDescriptor {
        offset: usize,
        length: usize,
    },

    #[error("{name} at offset {offset} declares {declared} bytes but {consumed} bytes were decoded")]
    LengthMismatch {
        name: &'static str,
        offset: usize,
        declared: usize,
        consumed: usize,
    },

    #[error("{name} at offset {offset}: expected {expected} {what} but found {actual}")]
    CountMismatch {
        name: &'static str,
        what: &'static str,
        offset: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Transfer finished with status {status}: {reason}")]
    TransferFailed {
        status: TransferStatus,
        reason: &'static str,
    },
}

/// Errors which abort a single fetch operation.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to open device: {0}")]
    Open(#[from] io::Error),

    #[error("Transfer failed with status {status}: {reason}")]
    Transfer {
        status: TransferStatus,
        reason: &'static str,
    },

    #[error("Transfer timed out")]
    Timeout,

    #[error("Response to {name} request is too short: expected at least {expected} bytes, got {actual}")]
    ResponseTooShort {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{name} declares a total length of {declared} bytes, less than its {minimum} byte header")]
    InvalidTotalLength {
        name: &'static str,
        declared: u16,
        minimum: usize,
    },

    #[error("Wrong descriptor type in {name} response: expected 0x{expected:02X}, got 0x{actual:02X}")]
    WrongType {
        name: &'static str,
        expected: u8,
        actual: u8,
    },

    #[error("Device reports no supported string descriptor languages")]
    NoLanguages,
}

#[derive(Error, Debug)]
pub enum ManualTransferError {
    #[error("Invalid input: {0}")]
    InvalidUserInput(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl From<String> for ManualTransferError {
    fn from(other: String) -> Self {
        ManualTransferError::InvalidUserInput(other)
    }
}
