//! Byte reader for the canonical binary form.

use super::codec::DecodeError;
use byteorder::{BigEndian, ReadBytesExt};
use num_bigint::{BigInt, BigUint, Sign};

pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Reader<'a> {
        Reader { bytes, pos: 0 }
    }

    // Basic operations --------------------------------------------------------
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(DecodeError::UnexpectedEof { offset: self.pos, needed: 1 })?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: len,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    // Read and interpret types ------------------------------------------------

    // be
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let mut slice = self.read_bytes(4)?;
        slice
            .read_u32::<BigEndian>()
            .map_err(|_| DecodeError::UnexpectedEof { offset: self.pos, needed: 4 })
    }

    /// Reads a length-prefixed (u32 big-endian) byte block and returns a
    /// reader over exactly that block.
    pub fn read_block(&mut self) -> Result<Reader<'a>, DecodeError> {
        let len = self.read_u32()? as usize;
        if len > self.remaining() {
            return Err(DecodeError::BadLength {
                offset: self.pos,
                declared: len,
                available: self.remaining(),
            });
        }
        Ok(Reader::new(self.read_bytes(len)?))
    }

    /// Reads a zarith-encoded integer: the first byte carries six bits of
    /// magnitude and the sign bit, every following byte seven bits, least
    /// significant group first, with the high bit marking continuation.
    pub fn read_zarith(&mut self) -> Result<BigInt, DecodeError> {
        let start = self.pos;
        let first = self.read_u8()?;
        let negative = first & 0x40 != 0;
        let mut groups: Vec<u8> = vec![first & 0x3f];
        let mut more = first & 0x80 != 0;
        while more {
            let byte = self.read_u8()?;
            more = byte & 0x80 != 0;
            if !more && byte == 0 {
                // trailing zero group: non-canonical encoding
                return Err(DecodeError::NonCanonicalInt { offset: start });
            }
            groups.push(byte & 0x7f);
        }

        let mut magnitude = BigUint::from(0u8);
        for (index, group) in groups.iter().enumerate().rev() {
            let bits = if index == 0 { 6 } else { 7 };
            magnitude = (magnitude << bits) | BigUint::from(*group);
        }
        let sign = if negative { Sign::Minus } else { Sign::Plus };
        if negative && magnitude == BigUint::from(0u8) {
            return Err(DecodeError::NonCanonicalInt { offset: start });
        }
        Ok(BigInt::from_biguint(sign, magnitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_u32_big_endian() {
        let bytes = [0x00, 0x00, 0x01, 0x02];
        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_u32().unwrap(), 258);
        assert!(reader.is_empty());
    }

    #[test]
    fn read_past_end_fails() {
        let bytes = [0x01];
        let mut reader = Reader::new(&bytes);
        assert!(reader.read_bytes(2).is_err());
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn read_zarith_values() {
        let read = |v: &[u8]| Reader::new(v).read_zarith().unwrap();
        assert_eq!(read(&[0x00]), BigInt::from(0));
        assert_eq!(read(&[0x01]), BigInt::from(1));
        assert_eq!(read(&[0x41]), BigInt::from(-1));
        assert_eq!(read(&[0x3f]), BigInt::from(63));
        assert_eq!(read(&[0x80, 0x01]), BigInt::from(64));
        assert_eq!(read(&[0xc0, 0x01]), BigInt::from(-64));
        assert_eq!(read(&[0xa4, 0x01]), BigInt::from(100));
    }

    #[test]
    fn read_zarith_rejects_truncated_and_non_canonical() {
        assert!(Reader::new(&[0x80]).read_zarith().is_err());
        assert!(Reader::new(&[0x81, 0x00]).read_zarith().is_err());
        assert!(Reader::new(&[0x40]).read_zarith().is_err());
    }

    #[test]
    fn read_block_checks_declared_length() {
        let bytes = [0x00, 0x00, 0x00, 0x05, 0x01];
        assert!(matches!(
            Reader::new(&bytes).read_block(),
            Err(DecodeError::BadLength { declared: 5, .. })
        ));
    }
}
