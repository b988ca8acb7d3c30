/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SendStreamError>;

/// Everything that can go wrong decoding a send stream or mutating the diff tree.
///
/// All variants are fatal: the processor never retries, it unwinds with one of these.
#[derive(Error, Debug, PartialEq)]
pub enum SendStreamError {
    #[error("short read: expected {expected} bytes, only {available} available")]
    ShortRead { expected: usize, available: usize },
    #[error("bad magic header, expected 'btrfs-stream'")]
    BadMagic,
    #[error("unsupported stream version '{0}', only version 1 is supported")]
    UnsupportedVersion(u32),
    #[error("invalid command type '{0}'")]
    InvalidCommandType(u16),
    #[error("unexpected attribute: expected type {expected}, got {actual}")]
    UnexpectedAttribute { expected: u16, actual: u16 },
    #[error("truncated attribute: needed {needed} bytes, {available} available")]
    TruncatedAttribute { needed: usize, available: usize },
    #[error("unsupported command '{0}'")]
    Unsupported(String),
    #[error("node already exists at '{0}'")]
    DuplicateCreate(String),
    #[error("duplicate child '{0}' under '{1}'")]
    DuplicateChild(String, String),
    #[error("node at '{0}' not found")]
    MissingChild(String),
    #[error("unhandled command '{0:?}'")]
    UnhandledCommand(String),
    #[error("invalid utf-8 in attribute value")]
    InvalidUtf8,
    #[error("invalid ignore pattern: {0}")]
    InvalidIgnorePattern(String),
    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SendStreamError {
    fn from(err: std::io::Error) -> Self {
        SendStreamError::Io(err.to_string())
    }
}
