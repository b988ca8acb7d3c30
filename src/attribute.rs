/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt::Display;

use crate::error::{Result, SendStreamError};

/// Numeric attribute ids, following the kernel's v1 `btrfs_send.h` enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AttributeType {
    Unspec = 0,
    Uuid = 1,
    Ctransid = 2,
    Ino = 3,
    Size = 4,
    Mode = 5,
    Uid = 6,
    Gid = 7,
    Rdev = 8,
    Ctime = 9,
    Mtime = 10,
    Atime = 11,
    Otime = 12,
    XattrName = 13,
    XattrData = 14,
    Path = 15,
    PathTo = 16,
    PathLink = 17,
    FileOffset = 18,
    Data = 19,
    CloneUuid = 20,
    CloneCtransid = 21,
    ClonePath = 22,
    CloneOffset = 23,
    CloneLen = 24,
}

/// A timestamp attribute: seconds plus nanoseconds, both little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub secs: u64,
    pub nanos: u32,
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

/// An opaque byte attribute, annotated with whether it happens to be valid UTF-8
/// (used only to decide how to render it for display purposes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrBytes {
    pub data: Vec<u8>,
    pub is_utf8: bool,
}

impl Display for AttrBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_utf8 {
            write!(f, "{}", String::from_utf8_lossy(&self.data))
        } else {
            write!(f, "<{} bytes binary>", self.data.len())
        }
    }
}

/// Decodes the strictly-ordered `(type, length, value)` attribute list inside one
/// command's payload. Every `expect_*` call must name the attribute type the caller
/// is about to consume; a mismatch or an exhausted payload is a decode error, never
/// a silent default.
pub struct AttributeReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AttributeReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn next_raw(&mut self, expected: AttributeType) -> Result<&'a [u8]> {
        if self.pos + 4 > self.data.len() {
            return Err(SendStreamError::TruncatedAttribute {
                needed: 4,
                available: self.data.len() - self.pos,
            });
        }
        let ty = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        let len = u16::from_le_bytes([self.data[self.pos + 2], self.data[self.pos + 3]]) as usize;
        if ty != expected as u16 {
            return Err(SendStreamError::UnexpectedAttribute {
                expected: expected as u16,
                actual: ty,
            });
        }
        let start = self.pos + 4;
        if start + len > self.data.len() {
            return Err(SendStreamError::TruncatedAttribute {
                needed: len,
                available: self.data.len() - start,
            });
        }
        self.pos = start + len;
        Ok(&self.data[start..start + len])
    }

    pub fn u64(&mut self, ty: AttributeType) -> Result<u64> {
        let bytes = self.next_raw(ty)?;
        Ok(u64::from_le_bytes(bytes_to_array(bytes)))
    }

    pub fn time(&mut self, ty: AttributeType) -> Result<Timestamp> {
        let bytes = self.next_raw(ty)?;
        let secs = u64::from_le_bytes(bytes_to_array(&bytes[0..8]));
        let nanos = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        Ok(Timestamp { secs, nanos })
    }

    pub fn uuid(&mut self, ty: AttributeType) -> Result<String> {
        let bytes = self.next_raw(ty)?;
        Ok(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// `PATH`/`PATH_TO` style attribute: any leading `/` is stripped.
    pub fn path(&mut self, ty: AttributeType) -> Result<String> {
        let bytes = self.next_raw(ty)?;
        let s = String::from_utf8(bytes.to_vec()).map_err(|_| SendStreamError::InvalidUtf8)?;
        Ok(s.trim_start_matches('/').to_string())
    }

    /// `PATH_LINK` attribute: exact bytes preserved, no leading-slash stripping.
    pub fn path_link(&mut self, ty: AttributeType) -> Result<String> {
        let bytes = self.next_raw(ty)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SendStreamError::InvalidUtf8)
    }

    pub fn string(&mut self, ty: AttributeType) -> Result<String> {
        let bytes = self.next_raw(ty)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SendStreamError::InvalidUtf8)
    }

    pub fn bytes(&mut self, ty: AttributeType) -> Result<AttrBytes> {
        let bytes = self.next_raw(ty)?;
        let is_utf8 = std::str::from_utf8(bytes).is_ok();
        Ok(AttrBytes {
            data: bytes.to_vec(),
            is_utf8,
        })
    }
}

fn bytes_to_array(bytes: &[u8]) -> [u8; 8] {
    let mut array = [0u8; 8];
    array.copy_from_slice(&bytes[..8]);
    array
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(ty: u16, value: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&ty.to_le_bytes());
        bytes.extend_from_slice(&(value.len() as u16).to_le_bytes());
        bytes.extend_from_slice(value);
        bytes
    }

    #[test]
    fn decodes_u64_in_order() {
        let payload = attr(AttributeType::Size as u16, &42u64.to_le_bytes());
        let mut reader = AttributeReader::new(&payload);
        assert_eq!(reader.u64(AttributeType::Size).unwrap(), 42);
    }

    #[test]
    fn strips_leading_slash_for_path_but_not_path_link() {
        let mut payload = attr(AttributeType::Path as u16, b"/foo/bar");
        payload.extend(attr(AttributeType::PathLink as u16, b"/relative/target"));
        let mut reader = AttributeReader::new(&payload);
        assert_eq!(reader.path(AttributeType::Path).unwrap(), "foo/bar");
        assert_eq!(
            reader.path_link(AttributeType::PathLink).unwrap(),
            "/relative/target"
        );
    }

    #[test]
    fn rejects_out_of_order_attribute() {
        let payload = attr(AttributeType::Size as u16, &1u64.to_le_bytes());
        let mut reader = AttributeReader::new(&payload);
        let err = reader.u64(AttributeType::Mode).unwrap_err();
        assert_eq!(
            err,
            SendStreamError::UnexpectedAttribute {
                expected: AttributeType::Mode as u16,
                actual: AttributeType::Size as u16,
            }
        );
    }

    #[test]
    fn rejects_truncated_attribute() {
        let payload = attr(AttributeType::Uid as u16, &1u64.to_le_bytes());
        let truncated = &payload[..payload.len() - 2];
        let mut reader = AttributeReader::new(truncated);
        assert!(matches!(
            reader.u64(AttributeType::Uid).unwrap_err(),
            SendStreamError::TruncatedAttribute { .. }
        ));
    }

    #[test]
    fn renders_uuid_as_lowercase_hex() {
        let payload = attr(AttributeType::Uuid as u16, &[0xde, 0xad, 0xbe, 0xef]);
        let mut reader = AttributeReader::new(&payload);
        assert_eq!(reader.uuid(AttributeType::Uuid).unwrap(), "deadbeef");
    }
}
