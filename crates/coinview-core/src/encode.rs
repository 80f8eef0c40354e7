//! Low-level byte encodings shared by the wire and disk formats.
//!
//! Two integer encodings appear in the stored records:
//! - CompactSize, the length prefix used for vectors (`0xfd`/`0xfe`/`0xff` markers).
//! - VARINT, the MSB base-128 encoding with a +1 offset per continuation byte,
//!   used inside coin and undo records. Every value has exactly one encoding.

use sha2::{Digest, Sha256};

use crate::error::CodecError;
use crate::types::Hash256;

/// Largest length accepted from a CompactSize prefix.
pub const MAX_COMPACT_SIZE: u64 = 0x0200_0000;

/// Append a CompactSize length prefix.
pub fn write_compact_size(buf: &mut Vec<u8>, size: u64) {
    if size < 0xfd {
        buf.push(size as u8);
    } else if size <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(size as u16).to_le_bytes());
    } else if size <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(size as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&size.to_le_bytes());
    }
}

/// Append a VARINT.
pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    // ceil(64 / 7) bytes at most.
    let mut tmp = [0u8; 10];
    let mut len = 0;
    let mut n = value;
    loop {
        tmp[len] = (n & 0x7f) as u8 | if len > 0 { 0x80 } else { 0x00 };
        if n <= 0x7f {
            break;
        }
        n = (n >> 7) - 1;
        len += 1;
    }
    buf.extend(tmp[..=len].iter().rev());
}

/// Double SHA-256.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    Hash256(Sha256::digest(first).into())
}

/// Forward-only cursor over a byte slice.
///
/// Every read either consumes exactly the bytes it needs or fails with
/// [`CodecError::UnexpectedEof`]; nothing is consumed on failure.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::UnexpectedEof {
                needed: len - self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), CodecError> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u32_le(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_hash(&mut self) -> Result<Hash256, CodecError> {
        Ok(Hash256(self.read_array()?))
    }

    /// Read a canonical CompactSize no larger than [`MAX_COMPACT_SIZE`].
    pub fn read_compact_size(&mut self) -> Result<u64, CodecError> {
        let value = match self.read_u8()? {
            0xfd => {
                let v = u64::from(u16::from_le_bytes(self.read_array()?));
                if v < 0xfd {
                    return Err(CodecError::NonCanonicalCompactSize);
                }
                v
            }
            0xfe => {
                let v = u64::from(self.read_u32_le()?);
                if v <= 0xffff {
                    return Err(CodecError::NonCanonicalCompactSize);
                }
                v
            }
            0xff => {
                let v = self.read_u64_le()?;
                if v <= 0xffff_ffff {
                    return Err(CodecError::NonCanonicalCompactSize);
                }
                v
            }
            n => u64::from(n),
        };
        if value > MAX_COMPACT_SIZE {
            return Err(CodecError::OversizedLength {
                len: value,
                max: MAX_COMPACT_SIZE,
            });
        }
        Ok(value)
    }

    pub fn read_varint(&mut self) -> Result<u64, CodecError> {
        let mut n: u64 = 0;
        loop {
            let byte = self.read_u8()?;
            if n > (u64::MAX >> 7) {
                return Err(CodecError::VarIntOverflow);
            }
            n = (n << 7) | u64::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                return Ok(n);
            }
            n = n.checked_add(1).ok_or(CodecError::VarIntOverflow)?;
        }
    }

    /// Read a VARINT that must fit in a `u32`.
    pub fn read_varint_u32(&mut self) -> Result<u32, CodecError> {
        let value = self.read_varint()?;
        u32::try_from(value).map_err(|_| CodecError::ValueOutOfRange {
            value,
            target: "u32",
        })
    }
}

/// Decode a hex string into bytes.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, CodecError> {
    hex::decode(s.trim()).map_err(|e| CodecError::InvalidHex(e.to_string()))
}
