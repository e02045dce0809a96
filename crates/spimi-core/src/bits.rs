//! Bit-level writer and reader over byte buffers
//!
//! Bits are packed MSB-first. The last byte is padded with zero bits.

use crate::error::{IndexError, Result};

/// Accumulates bits into a byte buffer
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single bit
    pub fn push_bit(&mut self, bit: bool) {
        let offset = self.bit_len % 8;
        if offset == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> offset;
        }
        self.bit_len += 1;
    }

    /// Append the low `count` bits of `value`, most significant first
    pub fn push_bits(&mut self, value: u64, count: u32) {
        debug_assert!(count <= 64);
        for shift in (0..count).rev() {
            self.push_bit((value >> shift) & 1 == 1);
        }
    }

    /// Append `count` one-bits followed by a zero-bit
    pub fn push_unary(&mut self, count: u32) {
        for _ in 0..count {
            self.push_bit(true);
        }
        self.push_bit(false);
    }

    /// Number of bits written so far
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Finish writing, returning the zero-padded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reads bits from a byte slice, tracking exactly how many were consumed
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = self
            .bytes
            .get(self.pos / 8)
            .ok_or_else(|| IndexError::corrupt("bit stream ended inside a code"))?;
        let bit = byte & (0x80 >> (self.pos % 8)) != 0;
        self.pos += 1;
        Ok(bit)
    }

    /// Read `count` bits as an unsigned integer, most significant first
    pub fn read_bits(&mut self, count: u32) -> Result<u64> {
        debug_assert!(count <= 64);
        let mut value = 0u64;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()? as u64;
        }
        Ok(value)
    }

    pub fn bits_consumed(&self) -> usize {
        self.pos
    }

    /// Bytes touched so far, counting a partially read byte as whole
    pub fn bytes_consumed(&self) -> usize {
        self.pos.div_ceil(8)
    }

    /// Skip the padding bits up to the next byte boundary
    pub fn align_to_byte(&mut self) {
        self.pos = self.bytes_consumed() * 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msb_first_packing() {
        let mut writer = BitWriter::new();
        writer.push_bits(0b101, 3);
        assert_eq!(writer.bit_len(), 3);
        assert_eq!(writer.into_bytes(), vec![0b1010_0000]);
    }

    #[test]
    fn test_spans_bytes() {
        let mut writer = BitWriter::new();
        writer.push_unary(9);
        writer.push_bits(0b11, 2);
        assert_eq!(writer.bit_len(), 12);
        assert_eq!(writer.into_bytes(), vec![0xFF, 0b1011_0000]);
    }

    #[test]
    fn test_reader_tracks_consumption() {
        let bytes = [0b1100_0001, 0b1000_0000];
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(2).unwrap(), 0b11);
        assert_eq!(reader.bits_consumed(), 2);
        assert_eq!(reader.bytes_consumed(), 1);

        reader.align_to_byte();
        assert_eq!(reader.bits_consumed(), 8);
        assert!(reader.read_bit().unwrap());
        assert_eq!(reader.bytes_consumed(), 2);
    }

    #[test]
    fn test_reading_past_end() {
        let bytes = [0u8];
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(8).unwrap(), 0);
        assert!(matches!(reader.read_bit(), Err(IndexError::Corrupt(_))));
    }
}
