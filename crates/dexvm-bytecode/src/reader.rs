//! Cursor-based decoding of DEX primitives
//!
//! `DexReader` reads little-endian integers, LEB128 varints and the modified
//! UTF-8 string encoding used by the DEX string table. Nested sections are
//! parsed by pushing the current position, jumping to a section offset and
//! popping back afterwards.

use thiserror::Error;

/// Errors that can occur while reading raw module bytes
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Unexpected end of buffer
    #[error("Unexpected end of module data at offset {0}")]
    UnexpectedEnd(usize),

    /// Leading byte of a modified UTF-8 sequence is not a valid class
    #[error("illegal modified utf-8 at offset {0}")]
    IllegalModifiedUtf8(usize),

    /// `pop_offset` without a matching `push_offset`
    #[error("Offset stack underflow at offset {0}")]
    OffsetUnderflow(usize),

    /// A LEB128 value is longer than five bytes
    #[error("Malformed LEB128 value at offset {0}")]
    MalformedLeb128(usize),
}

/// Sequential reader over a DEX byte buffer
pub struct DexReader<'a> {
    buffer: &'a [u8],
    position: usize,
    saved: Vec<usize>,
}

impl<'a> DexReader<'a> {
    /// Create a reader positioned at the start of `buffer`
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
            saved: Vec::new(),
        }
    }

    /// Get the current position in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    /// Total length of the underlying buffer
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check whether the underlying buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Advance the cursor without reading
    pub fn skip(&mut self, count: usize) -> Result<(), DecodeError> {
        let end = self.position + count;
        if end > self.buffer.len() {
            return Err(DecodeError::UnexpectedEnd(self.position));
        }
        self.position = end;
        Ok(())
    }

    /// Save the current position and jump to `offset`
    pub fn push_offset(&mut self, offset: usize) {
        self.saved.push(self.position);
        self.position = offset;
    }

    /// Restore the position saved by the matching `push_offset`
    pub fn pop_offset(&mut self) -> Result<(), DecodeError> {
        match self.saved.pop() {
            Some(position) => {
                self.position = position;
                Ok(())
            }
            None => Err(DecodeError::OffsetUnderflow(self.position)),
        }
    }

    // ===== Fixed Width =====

    /// Read a single unsigned byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        match self.buffer.get(self.position) {
            Some(&value) => {
                self.position += 1;
                Ok(value)
            }
            None => Err(DecodeError::UnexpectedEnd(self.position)),
        }
    }

    /// Read a single signed byte
    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a 16-bit unsigned integer (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let low = self.read_u8()? as u16;
        let high = self.read_u8()? as u16;
        Ok(low | (high << 8))
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let mut value = 0u32;
        for shift in [0, 8, 16, 24] {
            value |= (self.read_u8()? as u32) << shift;
        }
        Ok(value)
    }

    /// Read a 32-bit signed integer (little-endian)
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_u32()? as i32)
    }

    /// Read `byte_length` bytes and sign-extend them to 64 bits
    pub fn read_signed(&mut self, byte_length: usize) -> Result<i64, DecodeError> {
        let value = self.read_unsigned(byte_length)?;
        let shift = 64 - 8 * byte_length as u32;
        Ok(((value << shift) as i64) >> shift)
    }

    /// Read `byte_length` bytes and zero-extend them to 64 bits
    pub fn read_unsigned(&mut self, byte_length: usize) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        for i in 0..byte_length.min(8) {
            value |= (self.read_u8()? as u64) << (8 * i);
        }
        Ok(value)
    }

    /// Read `byte_length` bytes as the high-order bytes of a 64-bit value
    ///
    /// Float and double encoded values drop trailing zero bytes, so the
    /// payload is extended with zeros on the right.
    pub fn read_right_extended(&mut self, byte_length: usize, width: usize) -> Result<u64, DecodeError> {
        let value = self.read_unsigned(byte_length)?;
        Ok(value << (8 * (width - byte_length.min(width))))
    }

    // ===== Variable Width =====

    /// Read an unsigned LEB128 value
    pub fn read_uleb128(&mut self) -> Result<u32, DecodeError> {
        let start = self.position;
        let mut value = 0u32;
        let mut shift = 0u32;
        loop {
            let data = self.read_u8()?;
            if shift >= 35 {
                return Err(DecodeError::MalformedLeb128(start));
            }
            value |= ((data & 0x7F) as u32).wrapping_shl(shift);
            shift += 7;
            if data & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    /// Read a signed LEB128 value
    pub fn read_sleb128(&mut self) -> Result<i32, DecodeError> {
        let start = self.position;
        let mut value = 0i32;
        let mut shift = 0u32;
        loop {
            let data = self.read_u8()?;
            if shift >= 35 {
                return Err(DecodeError::MalformedLeb128(start));
            }
            value |= ((data & 0x7F) as i32).wrapping_shl(shift);
            shift += 7;
            if data & 0x80 == 0 {
                if shift < 32 {
                    let extend = 32 - shift;
                    value = (value << extend) >> extend;
                }
                return Ok(value);
            }
        }
    }

    // ===== Strings =====

    /// Read `char_count` UTF-16 code units in modified UTF-8
    pub fn read_mutf8(&mut self, char_count: usize) -> Result<String, DecodeError> {
        let mut units = Vec::with_capacity(char_count);
        for _ in 0..char_count {
            let start = self.position;
            let data = self.read_u8()? as u16;
            let unit = match data >> 4 {
                0..=7 => data,
                12 | 13 => {
                    let second = self.read_u8()? as u16;
                    ((data & 0x1F) << 6) | (second & 0x3F)
                }
                14 => {
                    let second = self.read_u8()? as u16;
                    let third = self.read_u8()? as u16;
                    ((data & 0x0F) << 12) | ((second & 0x3F) << 6) | (third & 0x3F)
                }
                _ => return Err(DecodeError::IllegalModifiedUtf8(start)),
            };
            units.push(unit);
        }
        Ok(String::from_utf16_lossy(&units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_little_endian() {
        let bytes = [0x42, 0x34, 0x12, 0x01, 0xEF, 0xCD, 0xAB, 0xFE, 0xFF, 0xFF, 0xFF];
        let mut reader = DexReader::new(&bytes);

        assert_eq!(reader.read_u8().unwrap(), 0x42);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0xABCD_EF01);
        assert_eq!(reader.read_i32().unwrap(), -2);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_reader_leb128() {
        let bytes = [0x00, 0x7F, 0x80, 0x7F, 0xE5, 0x8E, 0x26];
        let mut reader = DexReader::new(&bytes);
        assert_eq!(reader.read_uleb128().unwrap(), 0);
        assert_eq!(reader.read_uleb128().unwrap(), 127);
        assert_eq!(reader.read_uleb128().unwrap(), 16256);
        assert_eq!(reader.read_uleb128().unwrap(), 624_485);

        let bytes = [0x00, 0x01, 0x7F, 0x80, 0x7F];
        let mut reader = DexReader::new(&bytes);
        assert_eq!(reader.read_sleb128().unwrap(), 0);
        assert_eq!(reader.read_sleb128().unwrap(), 1);
        assert_eq!(reader.read_sleb128().unwrap(), -1);
        assert_eq!(reader.read_sleb128().unwrap(), -128);
    }

    #[test]
    fn test_reader_signed_widths() {
        let bytes = [0xFE, 0x7F, 0x00, 0x00, 0x80];
        let mut reader = DexReader::new(&bytes);
        assert_eq!(reader.read_signed(1).unwrap(), -2);
        assert_eq!(reader.read_signed(2).unwrap(), 0x7F);
        assert_eq!(reader.read_signed(2).unwrap(), -32768);
    }

    #[test]
    fn test_reader_right_extended() {
        // 1.0f32 is 0x3F800000; the encoder keeps only the two high bytes
        let bytes = [0x80, 0x3F];
        let mut reader = DexReader::new(&bytes);
        let bits = reader.read_right_extended(2, 4).unwrap() as u32;
        assert_eq!(f32::from_bits(bits), 1.0);
    }

    #[test]
    fn test_reader_mutf8() {
        // "a", U+00E9 (2 bytes), U+30C6 (3 bytes)
        let bytes = [0x61, 0xC3, 0xA9, 0xE3, 0x83, 0x86];
        let mut reader = DexReader::new(&bytes);
        assert_eq!(reader.read_mutf8(3).unwrap(), "a\u{e9}\u{30c6}");

        // modified UTF-8 encodes NUL as two bytes
        let bytes = [0xC0, 0x80];
        let mut reader = DexReader::new(&bytes);
        assert_eq!(reader.read_mutf8(1).unwrap(), "\0");
    }

    #[test]
    fn test_reader_mutf8_illegal_leading_byte() {
        let bytes = [0x61, 0x85];
        let mut reader = DexReader::new(&bytes);
        assert_eq!(
            reader.read_mutf8(2),
            Err(DecodeError::IllegalModifiedUtf8(1))
        );
    }

    #[test]
    fn test_reader_offset_stack() {
        let bytes = [1, 2, 3, 4];
        let mut reader = DexReader::new(&bytes);
        reader.read_u8().unwrap();
        reader.push_offset(3);
        assert_eq!(reader.read_u8().unwrap(), 4);
        reader.push_offset(2);
        assert_eq!(reader.read_u8().unwrap(), 3);
        reader.pop_offset().unwrap();
        reader.pop_offset().unwrap();
        assert_eq!(reader.read_u8().unwrap(), 2);
        assert!(reader.pop_offset().is_err());
    }
}
