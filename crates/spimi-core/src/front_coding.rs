//! Front coding for blocks of sorted dictionary terms
//!
//! A block whose terms share a non-empty prefix `P` is stored as
//!
//! ```text
//! len(t0) P '*' suffix(t0) { len(suffix(tj)) '|' suffix(tj) }
//! ```
//!
//! Blocks without a shared prefix store each term as `len term`.
//! Lengths are big-endian `u16`.

use byteorder::{ByteOrder, WriteBytesExt};

use crate::error::{IndexError, Result};
use crate::layout::Endian;
use crate::spimi::validate_term;

/// Ends the shared prefix of a front-coded block
pub const PREFIX_END: u8 = b'*';
/// Precedes every suffix after the first one
pub const SUFFIX_MARK: u8 = b'|';
/// Bytes that may never appear inside a term
pub const RESERVED_MARKERS: [u8; 3] = [PREFIX_END, SUFFIX_MARK, b'~'];

/// Longest byte prefix shared by every term
pub fn longest_common_prefix<'a>(terms: &[&'a str]) -> &'a str {
    let Some((first, rest)) = terms.split_first() else {
        return "";
    };
    let mut len = first.len();
    for term in rest {
        len = first
            .bytes()
            .zip(term.bytes())
            .take(len)
            .take_while(|(a, b)| a == b)
            .count();
    }
    while !first.is_char_boundary(len) {
        len -= 1;
    }
    &first[..len]
}

fn write_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len = u16::try_from(len)
        .map_err(|_| IndexError::InvalidOption(format!("term length {len} exceeds u16")))?;
    out.write_u16::<Endian>(len)?;
    Ok(())
}

/// Append one block of sorted terms, returning the bytes written
pub fn encode_block(terms: &[&str], out: &mut Vec<u8>) -> Result<usize> {
    for term in terms {
        validate_term(term)?;
    }
    let start = out.len();
    let prefix = longest_common_prefix(terms);
    let Some((first, rest)) = terms.split_first() else {
        return Ok(0);
    };

    if prefix.is_empty() {
        for term in terms {
            write_len(out, term.len())?;
            out.extend_from_slice(term.as_bytes());
        }
    } else {
        write_len(out, first.len())?;
        out.extend_from_slice(prefix.as_bytes());
        out.push(PREFIX_END);
        out.extend_from_slice(&first.as_bytes()[prefix.len()..]);
        for term in rest {
            let suffix = &term.as_bytes()[prefix.len()..];
            write_len(out, suffix.len())?;
            out.push(SUFFIX_MARK);
            out.extend_from_slice(suffix);
        }
    }
    Ok(out.len() - start)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| IndexError::corrupt("dictionary block truncated"))?;
        self.pos = end;
        Ok(slice)
    }

    fn read_len(&mut self) -> Result<usize> {
        Ok(Endian::read_u16(self.take(2)?) as usize)
    }
}

fn to_term(prefix: &[u8], suffix: &[u8]) -> Result<String> {
    let mut bytes = Vec::with_capacity(prefix.len() + suffix.len());
    bytes.extend_from_slice(prefix);
    bytes.extend_from_slice(suffix);
    String::from_utf8(bytes).map_err(|_| IndexError::corrupt("dictionary term is not UTF-8"))
}

/// Decode `count` terms from the start of `bytes`, returning them with the bytes consumed
pub fn decode_block(bytes: &[u8], count: usize) -> Result<(Vec<String>, usize)> {
    let mut cursor = Cursor { bytes, pos: 0 };
    let mut terms = Vec::with_capacity(count);
    if count == 0 {
        return Ok((terms, 0));
    }

    let first_len = cursor.read_len()?;
    let window_end = (cursor.pos + first_len + 1).min(bytes.len());
    let prefix_end = bytes[cursor.pos..window_end]
        .iter()
        .position(|&b| b == PREFIX_END);

    match prefix_end {
        Some(0) => return Err(IndexError::corrupt("front-coded block with empty prefix")),
        Some(prefix_len) => {
            let prefix = cursor.take(prefix_len)?;
            cursor.take(1)?;
            let suffix = cursor.take(first_len - prefix_len)?;
            terms.push(to_term(prefix, suffix)?);
            for _ in 1..count {
                let len = cursor.read_len()?;
                if cursor.take(1)? != [SUFFIX_MARK] {
                    return Err(IndexError::corrupt("missing suffix marker"));
                }
                terms.push(to_term(prefix, cursor.take(len)?)?);
            }
        }
        None => {
            terms.push(to_term(&[], cursor.take(first_len)?)?);
            for _ in 1..count {
                let len = cursor.read_len()?;
                terms.push(to_term(&[], cursor.take(len)?)?);
            }
        }
    }
    Ok((terms, cursor.pos))
}

/// Decode only the first term of the block starting at `bytes`
pub fn decode_first_term(bytes: &[u8]) -> Result<String> {
    let (mut terms, _) = decode_block(bytes, 1)?;
    terms
        .pop()
        .ok_or_else(|| IndexError::corrupt("empty dictionary block"))
}

/// A whole dictionary front-coded in blocks of `block_size` terms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontCodedDictionary {
    pub bytes: Vec<u8>,
    /// Byte offset where each block starts
    pub block_offsets: Vec<u32>,
}

pub fn encode_blocks(terms: &[&str], block_size: usize) -> Result<FrontCodedDictionary> {
    if block_size == 0 {
        return Err(IndexError::InvalidOption("block size must be positive".into()));
    }
    let mut bytes = Vec::new();
    let mut block_offsets = Vec::with_capacity(terms.len().div_ceil(block_size));
    for block in terms.chunks(block_size) {
        let offset = bytes.len() as u64;
        block_offsets.push(u32::try_from(offset).map_err(|_| IndexError::OffsetOverflow(offset))?);
        encode_block(block, &mut bytes)?;
    }
    Ok(FrontCodedDictionary {
        bytes,
        block_offsets,
    })
}

/// Sequentially decode `num_terms` terms written in blocks of `block_size`
pub fn decode_blocks(bytes: &[u8], block_size: usize, num_terms: usize) -> Result<Vec<String>> {
    if block_size == 0 {
        return Err(IndexError::InvalidOption("block size must be positive".into()));
    }
    let mut terms = Vec::with_capacity(num_terms);
    let mut pos = 0;
    while terms.len() < num_terms {
        let count = block_size.min(num_terms - terms.len());
        let (block, used) = decode_block(&bytes[pos..], count)?;
        terms.extend(block);
        pos += used;
    }
    Ok(terms)
}
