/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::io::Read;

use crate::byte_reader::ByteReader;
use crate::error::{Result, SendStreamError};

/// Numeric command ids, following the kernel's v1 `btrfs_send.h` enumeration plus
/// the v2/v3 additions, which this decoder accepts but files under `OpClass::Ignore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandType {
    Unspec = 0,
    Subvol = 1,
    Snapshot = 2,
    Mkfile = 3,
    Mkdir = 4,
    Mknod = 5,
    Mkfifo = 6,
    Mksock = 7,
    Symlink = 8,
    Rename = 9,
    Link = 10,
    Unlink = 11,
    Rmdir = 12,
    SetXattr = 13,
    RemoveXattr = 14,
    Write = 15,
    Clone = 16,
    Truncate = 17,
    Chmod = 18,
    Chown = 19,
    Utimes = 20,
    End = 21,
    UpdateExtent = 22,
    Fallocate = 23,
    Fileattr = 24,
    EncodedWrite = 25,
    EnableVerity = 26,
}

impl CommandType {
    fn from_u16(value: u16) -> Result<Self> {
        use CommandType::*;
        Ok(match value {
            0 => Unspec,
            1 => Subvol,
            2 => Snapshot,
            3 => Mkfile,
            4 => Mkdir,
            5 => Mknod,
            6 => Mkfifo,
            7 => Mksock,
            8 => Symlink,
            9 => Rename,
            10 => Link,
            11 => Unlink,
            12 => Rmdir,
            13 => SetXattr,
            14 => RemoveXattr,
            15 => Write,
            16 => Clone,
            17 => Truncate,
            18 => Chmod,
            19 => Chown,
            20 => Utimes,
            21 => End,
            22 => UpdateExtent,
            23 => Fallocate,
            24 => Fileattr,
            25 => EncodedWrite,
            26 => EnableVerity,
            _ => return Err(SendStreamError::InvalidCommandType(value)),
        })
    }
}

/// Logical grouping the stream processor dispatches on. Several distinct command
/// types collapse onto the same class — `classify` is the single source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Create,
    Rename,
    Delete,
    Modify,
    Ignore,
    End,
    Unspec,
}

pub fn classify(command: CommandType) -> OpClass {
    use CommandType::*;
    match command {
        Subvol | Snapshot | Mkfile | Mkdir | Mknod | Mkfifo | Mksock | Symlink => OpClass::Create,
        Link | Rename => OpClass::Rename,
        Unlink | Rmdir => OpClass::Delete,
        Write | Clone | Truncate | Chmod | Chown | SetXattr | RemoveXattr | UpdateExtent => {
            OpClass::Modify
        }
        // Filed under Ignore by the static table; the processor's dispatch loop
        // special-cases UTIMES before it reaches the Ignore no-op branch.
        Utimes | Fallocate | Fileattr | EncodedWrite | EnableVerity => OpClass::Ignore,
        End => OpClass::End,
        Unspec => OpClass::Unspec,
    }
}

/// One decoded command record: its type and the raw bytes of its attribute list.
pub struct Command {
    pub command_type: CommandType,
    pub payload: Vec<u8>,
}

/// Reads one `(size, type, crc, payload)` record. The crc is consumed but never checked —
/// the kernel guarantees stream integrity at a layer below this decoder.
pub fn decode_command<R: Read>(reader: &mut ByteReader<R>) -> Result<Command> {
    let header = reader.peek_and_discard(10)?;
    let size = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
    let raw_type = u16::from_le_bytes(header[4..6].try_into().unwrap());
    let _crc = u32::from_le_bytes(header[6..10].try_into().unwrap());
    let command_type = CommandType::from_u16(raw_type)?;
    let payload = reader.peek_and_discard(size)?;
    Ok(Command {
        command_type,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn command_bytes(ty: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&ty.to_le_bytes());
        bytes.extend_from_slice(&0xdead_beefu32.to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn decodes_command_header_and_payload() {
        let bytes = command_bytes(CommandType::Mkdir as u16, b"hello");
        let mut reader = ByteReader::new(Cursor::new(bytes));
        let cmd = decode_command(&mut reader).unwrap();
        assert_eq!(cmd.command_type, CommandType::Mkdir);
        assert_eq!(cmd.payload, b"hello");
    }

    #[test]
    fn rejects_out_of_range_type() {
        let bytes = command_bytes(9999, b"");
        let mut reader = ByteReader::new(Cursor::new(bytes));
        assert_eq!(
            decode_command(&mut reader).unwrap_err(),
            SendStreamError::InvalidCommandType(9999)
        );
    }

    #[test]
    fn classifies_known_op_classes() {
        assert_eq!(classify(CommandType::Mkdir), OpClass::Create);
        assert_eq!(classify(CommandType::Rename), OpClass::Rename);
        assert_eq!(classify(CommandType::Link), OpClass::Rename);
        assert_eq!(classify(CommandType::Unlink), OpClass::Delete);
        assert_eq!(classify(CommandType::Write), OpClass::Modify);
        assert_eq!(classify(CommandType::Utimes), OpClass::Ignore);
        assert_eq!(classify(CommandType::Fallocate), OpClass::Ignore);
        assert_eq!(classify(CommandType::End), OpClass::End);
        assert_eq!(classify(CommandType::Unspec), OpClass::Unspec);
    }
}
