/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::io::Read;

use crate::error::{Result, SendStreamError};

/// Default chunk size pulled from the underlying reader when the staging buffer runs dry.
const FILL_CHUNK: usize = 8 * 1024;

/// Buffered window over an arbitrary byte source.
///
/// `peek_and_discard` is the only operation the rest of the decoder needs: hand back the
/// next `n` bytes and move the cursor past them. The staging buffer grows to fit whatever
/// `n` is requested, so a single oversized read (a large `DATA` attribute, say) never gets
/// truncated by a fixed-size buffer.
pub struct ByteReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
}

impl<R: Read> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(FILL_CHUNK),
            pos: 0,
        }
    }

    pub fn peek_and_discard(&mut self, n: usize) -> Result<Vec<u8>> {
        self.fill_to(n)?;
        let out = self.buf[self.pos..self.pos + n].to_vec();
        self.pos += n;
        self.compact();
        Ok(out)
    }

    fn fill_to(&mut self, n: usize) -> Result<()> {
        while self.buf.len() - self.pos < n {
            let missing = n - (self.buf.len() - self.pos);
            let mut chunk = vec![0u8; missing.max(FILL_CHUNK)];
            let read = self.inner.read(&mut chunk)?;
            if read == 0 {
                return Err(SendStreamError::ShortRead {
                    expected: n,
                    available: self.buf.len() - self.pos,
                });
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
        Ok(())
    }

    /// Drops already-consumed bytes once the window has drifted far enough to matter.
    fn compact(&mut self) {
        if self.pos > FILL_CHUNK {
            self.buf.drain(0..self.pos);
            self.pos = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn reads_exact_window() {
        let mut reader = ByteReader::new(Cursor::new(vec![1, 2, 3, 4, 5]));
        assert_eq!(reader.peek_and_discard(2).unwrap(), vec![1, 2]);
        assert_eq!(reader.peek_and_discard(3).unwrap(), vec![3, 4, 5]);
    }

    #[test]
    fn fails_short_read() {
        let mut reader = ByteReader::new(Cursor::new(vec![1, 2]));
        let err = reader.peek_and_discard(5).unwrap_err();
        assert_eq!(
            err,
            SendStreamError::ShortRead {
                expected: 5,
                available: 2,
            }
        );
    }

    #[test]
    fn handles_window_larger_than_fill_chunk() {
        let data: Vec<u8> = (0..(FILL_CHUNK * 3)).map(|i| (i % 251) as u8).collect();
        let mut reader = ByteReader::new(Cursor::new(data.clone()));
        let got = reader.peek_and_discard(data.len()).unwrap();
        assert_eq!(got, data);
    }

    #[test]
    fn reads_span_multiple_fills() {
        let mut reader = ByteReader::new(Cursor::new(vec![1, 2, 3, 4, 5, 6]));
        assert_eq!(reader.peek_and_discard(1).unwrap(), vec![1]);
        assert_eq!(reader.peek_and_discard(1).unwrap(), vec![2]);
        assert_eq!(reader.peek_and_discard(4).unwrap(), vec![3, 4, 5, 6]);
    }
}
