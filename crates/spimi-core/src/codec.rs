//! Universal gap codes for postings compression
//!
//! Gamma: unary(L - 1) followed by the L - 1 bits after the leading one.
//! Delta: gamma(L) followed by the same L - 1 offset bits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bits::{BitReader, BitWriter};
use crate::error::{IndexError, Result};

/// Number of significant bits in `n`
fn bit_length(n: u32) -> u32 {
    u32::BITS - n.leading_zeros()
}

fn check_positive(n: u32) -> Result<()> {
    if n == 0 {
        return Err(IndexError::Codec(0));
    }
    Ok(())
}

/// Encode `n` as a gamma code, returning the number of bits written
pub fn gamma_encode(n: u32, writer: &mut BitWriter) -> Result<usize> {
    check_positive(n)?;
    let offset_len = bit_length(n) - 1;
    writer.push_unary(offset_len);
    writer.push_bits(n as u64, offset_len);
    Ok(2 * offset_len as usize + 1)
}

/// Decode one gamma code
pub fn gamma_decode(reader: &mut BitReader<'_>) -> Result<u32> {
    let mut offset_len = 0u32;
    while reader.read_bit()? {
        offset_len += 1;
        if offset_len >= u32::BITS {
            return Err(IndexError::corrupt("gamma length prefix exceeds 32 bits"));
        }
    }
    let offset = reader.read_bits(offset_len)?;
    Ok(((1u64 << offset_len) | offset) as u32)
}

/// Encode `n` as a delta code, returning the number of bits written
pub fn delta_encode(n: u32, writer: &mut BitWriter) -> Result<usize> {
    check_positive(n)?;
    let len = bit_length(n);
    let prefix_bits = gamma_encode(len, writer)?;
    writer.push_bits(n as u64, len - 1);
    Ok(prefix_bits + len as usize - 1)
}

/// Decode one delta code
pub fn delta_decode(reader: &mut BitReader<'_>) -> Result<u32> {
    let len = gamma_decode(reader)?;
    if len > u32::BITS {
        return Err(IndexError::corrupt(format!(
            "delta code announces {len} significant bits"
        )));
    }
    let offset = reader.read_bits(len - 1)?;
    Ok(((1u64 << (len - 1)) | offset) as u32)
}

/// Which universal code is used for postings gaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapCodec {
    #[default]
    Gamma,
    Delta,
}

impl GapCodec {
    pub fn encode(self, n: u32, writer: &mut BitWriter) -> Result<usize> {
        match self {
            GapCodec::Gamma => gamma_encode(n, writer),
            GapCodec::Delta => delta_encode(n, writer),
        }
    }

    pub fn decode(self, reader: &mut BitReader<'_>) -> Result<u32> {
        match self {
            GapCodec::Gamma => gamma_decode(reader),
            GapCodec::Delta => delta_decode(reader),
        }
    }

    /// Exact code length in bits, without byte padding
    pub fn encoded_bits(self, n: u32) -> Result<usize> {
        check_positive(n)?;
        let len = bit_length(n) as usize;
        Ok(match self {
            GapCodec::Gamma => 2 * len - 1,
            GapCodec::Delta => {
                let len_of_len = bit_length(len as u32) as usize;
                (2 * len_of_len - 1) + len - 1
            }
        })
    }

    /// Append one code padded to a whole number of bytes, returning the byte count
    pub fn encode_aligned(self, n: u32, out: &mut Vec<u8>) -> Result<usize> {
        let mut writer = BitWriter::new();
        self.encode(n, &mut writer)?;
        let bytes = writer.into_bytes();
        out.extend_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Decode one byte-aligned code, returning the value and the bytes consumed
    pub fn decode_aligned(self, bytes: &[u8]) -> Result<(u32, usize)> {
        let mut reader = BitReader::new(bytes);
        let n = self.decode(&mut reader)?;
        Ok((n, reader.bytes_consumed()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GapCodec::Gamma => "gamma",
            GapCodec::Delta => "delta",
        }
    }
}

impl fmt::Display for GapCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GapCodec {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gamma" => Ok(GapCodec::Gamma),
            "delta" => Ok(GapCodec::Delta),
            other => Err(IndexError::InvalidOption(format!(
                "unknown codec '{other}', expected 'gamma' or 'delta'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bit_string(codec: GapCodec, n: u32) -> String {
        let mut writer = BitWriter::new();
        let bits = codec.encode(n, &mut writer).unwrap();
        let bytes = writer.into_bytes();
        (0..bits)
            .map(|i| if bytes[i / 8] & (0x80 >> (i % 8)) != 0 { '1' } else { '0' })
            .collect()
    }

    #[test]
    fn test_known_codes() {
        assert_eq!(bit_string(GapCodec::Gamma, 1), "0");
        assert_eq!(bit_string(GapCodec::Gamma, 5), "11001");
        assert_eq!(bit_string(GapCodec::Gamma, 13), "1110101");
        assert_eq!(bit_string(GapCodec::Delta, 1), "0");
        assert_eq!(bit_string(GapCodec::Delta, 5), "10101");
        assert_eq!(bit_string(GapCodec::Delta, 13), "11000101");
    }

    #[test]
    fn test_stream_roundtrip() {
        for codec in [GapCodec::Gamma, GapCodec::Delta] {
            let mut writer = BitWriter::new();
            for n in 1..=100_000u32 {
                codec.encode(n, &mut writer).unwrap();
            }
            let bytes = writer.into_bytes();
            let mut reader = BitReader::new(&bytes);
            for n in 1..=100_000u32 {
                assert_eq!(codec.decode(&mut reader).unwrap(), n, "{codec} {n}");
            }
        }
    }

    #[test]
    fn test_large_values() {
        for codec in [GapCodec::Gamma, GapCodec::Delta] {
            for n in [1 << 20, 123_456_789, u32::MAX - 1, u32::MAX] {
                let mut buf = Vec::new();
                let written = codec.encode_aligned(n, &mut buf).unwrap();
                assert_eq!(written, buf.len());
                assert_eq!(codec.decode_aligned(&buf).unwrap(), (n, buf.len()));
            }
        }
    }

    #[test]
    fn test_gamma_length() {
        for n in 1..=5000u32 {
            let expected = 2 * (31 - n.leading_zeros()) as usize + 1;
            let mut writer = BitWriter::new();
            assert_eq!(gamma_encode(n, &mut writer).unwrap(), expected);
            assert_eq!(writer.bit_len(), expected);
            assert_eq!(GapCodec::Gamma.encoded_bits(n).unwrap(), expected);
        }
    }

    #[test]
    fn test_delta_length_matches_writer() {
        for n in [1u32, 2, 3, 7, 8, 255, 256, 65_535, 1 << 30, u32::MAX] {
            let mut writer = BitWriter::new();
            let bits = delta_encode(n, &mut writer).unwrap();
            assert_eq!(bits, writer.bit_len());
            assert_eq!(GapCodec::Delta.encoded_bits(n).unwrap(), bits);
        }
    }

    #[test]
    fn test_delta_shorter_for_large_gaps() {
        assert!(GapCodec::Delta.encoded_bits(2).unwrap() > GapCodec::Gamma.encoded_bits(2).unwrap());
        for n in [1u32 << 16, 1 << 20, 1 << 31] {
            assert!(GapCodec::Delta.encoded_bits(n).unwrap() < GapCodec::Gamma.encoded_bits(n).unwrap());
        }
    }

    #[test]
    fn test_zero_rejected() {
        let mut writer = BitWriter::new();
        assert!(matches!(gamma_encode(0, &mut writer), Err(IndexError::Codec(0))));
        assert!(matches!(delta_encode(0, &mut writer), Err(IndexError::Codec(0))));
        assert!(GapCodec::Gamma.encode_aligned(0, &mut Vec::new()).is_err());
        assert_eq!(writer.bit_len(), 0);
    }

    #[test]
    fn test_padding_not_consumed() {
        // gamma(2) = "100", padded to one byte, followed by gamma(1) = "0"
        let mut buf = Vec::new();
        GapCodec::Gamma.encode_aligned(2, &mut buf).unwrap();
        GapCodec::Gamma.encode_aligned(1, &mut buf).unwrap();
        assert_eq!(buf, vec![0b1000_0000, 0]);

        let (first, used) = GapCodec::Gamma.decode_aligned(&buf).unwrap();
        assert_eq!((first, used), (2, 1));
        assert_eq!(GapCodec::Gamma.decode_aligned(&buf[used..]).unwrap(), (1, 1));
    }

    #[test]
    fn test_truncated_code() {
        // unary prefix promises more bits than remain
        assert!(GapCodec::Gamma.decode_aligned(&[0b1111_1110]).is_err());
        assert!(GapCodec::Gamma.decode_aligned(&[0xFF; 5]).is_err());
    }

    #[test]
    fn test_parse_codec() {
        assert_eq!("gamma".parse::<GapCodec>().unwrap(), GapCodec::Gamma);
        assert_eq!("Delta".parse::<GapCodec>().unwrap(), GapCodec::Delta);
        assert!("vbyte".parse::<GapCodec>().is_err());
        assert_eq!(GapCodec::Delta.to_string(), "delta");
    }
}
