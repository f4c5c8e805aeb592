//! Fixed-layout field access shared by all control messages.
//!
//! All multi-byte integers are big-endian (network byte order).

use super::ProtocolError;
use std::net::Ipv4Addr;

/// Cursor over a received payload.
///
/// Every read is bounds-checked; `finish` enforces that the payload was
/// consumed exactly.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading a payload that must hold at least `min_len` bytes.
    pub(crate) fn new(buf: &'a [u8], min_len: usize) -> Result<Self, ProtocolError> {
        if buf.len() < min_len {
            return Err(ProtocolError::MessageTooShort {
                expected: min_len,
                got: buf.len(),
            });
        }
        Ok(Self { buf, pos: 0 })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(ProtocolError::MessageTooShort {
                expected: end,
                got: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn addr(&mut self) -> Result<Ipv4Addr, ProtocolError> {
        let b = self.take(4)?;
        Ok(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
    }

    /// Check that exactly `declared` bytes were consumed and nothing trails.
    pub(crate) fn finish(self, declared: usize) -> Result<(), ProtocolError> {
        if self.pos != declared || self.buf.len() != declared {
            return Err(ProtocolError::MalformedHeader {
                expected: declared,
                consumed: self.buf.len(),
            });
        }
        Ok(())
    }
}

pub(crate) fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_addr(buf: &mut Vec<u8>, addr: Ipv4Addr) {
    buf.extend_from_slice(&addr.octets());
}

/// Set or clear a single flag bit.
pub(crate) fn set_bit(flags: &mut u8, bit: u8, on: bool) {
    if on {
        *flags |= 1 << bit;
    } else {
        *flags &= !(1 << bit);
    }
}
