/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::io::Read;

use crate::byte_reader::ByteReader;
use crate::error::{Result, SendStreamError};

const MAGIC: &[u8] = b"btrfs-stream";
const SUPPORTED_VERSION: u32 = 1;

/// Reads the NUL-terminated magic header followed by the little-endian version, and
/// fails fast if either does not match what this processor understands.
pub fn validate_header<R: Read>(reader: &mut ByteReader<R>) -> Result<()> {
    let header = reader.peek_and_discard(MAGIC.len() + 1)?;
    if &header[..MAGIC.len()] != MAGIC || header[MAGIC.len()] != 0 {
        return Err(SendStreamError::BadMagic);
    }
    let version_bytes = reader.peek_and_discard(4)?;
    let version = u32::from_le_bytes(version_bytes.try_into().unwrap());
    if version != SUPPORTED_VERSION {
        return Err(SendStreamError::UnsupportedVersion(version));
    }
    Ok(())
}
