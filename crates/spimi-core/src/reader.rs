//! Decoding of both on-disk layouts
//!
//! Lookup on the compressed layout binary-searches the block pointers by the
//! first term of each block, then scans the located block sequentially.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use byteorder::ByteOrder;

use crate::config::{CompressionOptions, LayoutManifest};
use crate::error::{IndexError, Result};
use crate::front_coding::{decode_block, decode_first_term};
use crate::layout::{
    read_u32_at, Endian, FileKind, Layout, BLOCK_POINTER_LEN, COMPRESSED_RECORD_LEN,
    MANIFEST_FILE, UNCOMPRESSED_RECORD_LEN,
};
use crate::spimi::{Posting, TermEntry};

fn read_layout(dir: &Path, layout: Layout) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    Ok((
        fs::read(layout.path(dir, FileKind::Pointers))?,
        fs::read(layout.path(dir, FileKind::Dictionary))?,
        fs::read(layout.path(dir, FileKind::Postings))?,
    ))
}

fn tail(bytes: &[u8], offset: u32) -> Result<&[u8]> {
    bytes
        .get(offset as usize..)
        .ok_or_else(|| IndexError::corrupt(format!("pointer {offset} is past the end of file")))
}

fn out_of_range(what: &str, idx: usize, len: usize) -> IndexError {
    IndexError::corrupt(format!("{what} {idx} out of range for {len}"))
}

/// Binary search over `len` sorted positions with a fallible comparison
fn search_by<F>(len: usize, mut cmp: F) -> Result<std::result::Result<usize, usize>>
where
    F: FnMut(usize) -> Result<Ordering>,
{
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match cmp(mid)? {
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => hi = mid,
            Ordering::Equal => return Ok(Ok(mid)),
        }
    }
    Ok(Err(lo))
}

#[derive(Debug, Clone, Copy)]
struct UncompressedPointer {
    df: u32,
    term_offset: u32,
    postings_offset: u32,
}

/// Reader for the uncompressed layout, every term is directly addressable
#[derive(Debug, Clone)]
pub struct UncompressedIndexReader {
    pointers: Vec<UncompressedPointer>,
    dictionary: Vec<u8>,
    postings: Vec<u8>,
}

impl UncompressedIndexReader {
    pub fn open(dir: &Path) -> Result<Self> {
        let (pointers, dictionary, postings) = read_layout(dir, Layout::Uncompressed)?;
        Self::from_bytes(&pointers, dictionary, postings)
    }

    pub fn from_bytes(pointers: &[u8], dictionary: Vec<u8>, postings: Vec<u8>) -> Result<Self> {
        if pointers.len() % UNCOMPRESSED_RECORD_LEN != 0 {
            return Err(IndexError::corrupt("uncompressed pointer file has a partial record"));
        }
        let pointers = pointers
            .chunks_exact(UNCOMPRESSED_RECORD_LEN)
            .map(|record| UncompressedPointer {
                df: Endian::read_u32(&record[0..4]),
                term_offset: Endian::read_u32(&record[4..8]),
                postings_offset: Endian::read_u32(&record[8..12]),
            })
            .collect();
        Ok(Self {
            pointers,
            dictionary,
            postings,
        })
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    fn pointer(&self, idx: usize) -> Result<UncompressedPointer> {
        self.pointers
            .get(idx)
            .copied()
            .ok_or_else(|| out_of_range("term", idx, self.len()))
    }

    /// Term at dictionary position `idx`
    pub fn term(&self, idx: usize) -> Result<String> {
        let bytes = tail(&self.dictionary, self.pointer(idx)?.term_offset)?;
        let term = bytes
            .get(..2)
            .map(|len| 2 + Endian::read_u16(len) as usize)
            .and_then(|end| bytes.get(2..end))
            .ok_or_else(|| IndexError::corrupt("dictionary term truncated"))?;
        String::from_utf8(term.to_vec())
            .map_err(|_| IndexError::corrupt("dictionary term is not UTF-8"))
    }

    pub fn postings(&self, idx: usize) -> Result<Vec<Posting>> {
        let pointer = self.pointer(idx)?;
        let start = pointer.postings_offset as usize;
        (0..pointer.df as usize)
            .map(|i| {
                let pos = start + i * 8;
                Ok(Posting {
                    doc_id: read_u32_at(&self.postings, pos)?,
                    tf: read_u32_at(&self.postings, pos + 4)?,
                })
            })
            .collect()
    }

    pub fn lookup(&self, term: &str) -> Result<Option<TermEntry>> {
        match search_by(self.len(), |idx| Ok(self.term(idx)?.as_str().cmp(term)))? {
            Ok(idx) => Ok(Some(TermEntry::from_postings(self.postings(idx)?))),
            Err(_) => Ok(None),
        }
    }

    /// Decode every term in dictionary order
    pub fn entries(&self) -> Result<Vec<(String, TermEntry)>> {
        (0..self.len())
            .map(|idx| Ok((self.term(idx)?, TermEntry::from_postings(self.postings(idx)?))))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct CompressedPointer {
    df: u32,
    posting_offset: u32,
}

/// Reader for the compressed layout
#[derive(Debug, Clone)]
pub struct CompressedIndexReader {
    options: CompressionOptions,
    pointers: Vec<CompressedPointer>,
    block_offsets: Vec<u32>,
    dictionary: Vec<u8>,
    postings: Vec<u8>,
}

impl CompressedIndexReader {
    /// Open a compressed layout using the options recorded in its manifest
    pub fn open(dir: &Path) -> Result<Self> {
        let manifest: LayoutManifest =
            serde_json::from_slice(&fs::read(dir.join(MANIFEST_FILE))?)?;
        if manifest.version != LayoutManifest::VERSION {
            return Err(IndexError::corrupt(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        let reader = Self::open_with_options(dir, manifest.options)?;
        if reader.len() as u64 != manifest.num_terms {
            return Err(IndexError::corrupt(format!(
                "manifest lists {} terms, pointer file has {}",
                manifest.num_terms,
                reader.len()
            )));
        }
        Ok(reader)
    }

    pub fn open_with_options(dir: &Path, options: CompressionOptions) -> Result<Self> {
        let (pointers, dictionary, postings) = read_layout(dir, Layout::Compressed)?;
        Self::from_bytes(options, &pointers, dictionary, postings)
    }

    pub fn from_bytes(
        options: CompressionOptions,
        pointers: &[u8],
        dictionary: Vec<u8>,
        postings: Vec<u8>,
    ) -> Result<Self> {
        options.validate()?;
        let mut records = Vec::new();
        let mut block_offsets = Vec::new();
        let mut pos = 0;
        while pos < pointers.len() {
            let starts_block = records.len() % options.block_size == 0;
            let record_len = COMPRESSED_RECORD_LEN + if starts_block { BLOCK_POINTER_LEN } else { 0 };
            if pos + record_len > pointers.len() {
                return Err(IndexError::corrupt("compressed pointer file has a partial record"));
            }
            records.push(CompressedPointer {
                df: read_u32_at(pointers, pos)?,
                posting_offset: read_u32_at(pointers, pos + 4)?,
            });
            if starts_block {
                block_offsets.push(read_u32_at(pointers, pos + 8)?);
            }
            pos += record_len;
        }
        Ok(Self {
            options,
            pointers: records,
            block_offsets,
            dictionary,
            postings,
        })
    }

    pub fn options(&self) -> &CompressionOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    pub fn num_blocks(&self) -> usize {
        self.block_offsets.len()
    }

    fn block_len(&self, block: usize) -> usize {
        let k = self.options.block_size;
        k.min(self.len() - block * k)
    }

    fn block_bytes(&self, block: usize) -> Result<&[u8]> {
        let offset = self
            .block_offsets
            .get(block)
            .copied()
            .ok_or_else(|| out_of_range("block", block, self.num_blocks()))?;
        tail(&self.dictionary, offset)
    }

    /// Decode all terms of one block; raw dictionaries read like prefix-less blocks
    pub fn block_terms(&self, block: usize) -> Result<Vec<String>> {
        let bytes = self.block_bytes(block)?;
        Ok(decode_block(bytes, self.block_len(block))?.0)
    }

    fn block_first_term(&self, block: usize) -> Result<String> {
        decode_first_term(self.block_bytes(block)?)
    }

    /// Decode the postings of the term at dictionary position `idx`
    pub fn postings(&self, idx: usize) -> Result<Vec<Posting>> {
        let pointer = self
            .pointers
            .get(idx)
            .copied()
            .ok_or_else(|| out_of_range("term", idx, self.len()))?;
        let bytes = tail(&self.postings, pointer.posting_offset)?;
        // every posting takes at least one gap byte and a u32 tf
        let mut postings = Vec::with_capacity((pointer.df as usize).min(bytes.len() / 5));
        if pointer.df == 0 {
            return Ok(postings);
        }

        let mut doc_id = read_u32_at(bytes, 0)?;
        postings.push(Posting {
            doc_id,
            tf: read_u32_at(bytes, 4)?,
        });
        let mut pos = 8;
        for _ in 1..pointer.df {
            let (gap, used) = self.options.codec.decode_aligned(
                bytes
                    .get(pos..)
                    .ok_or_else(|| IndexError::corrupt("postings list truncated"))?,
            )?;
            pos += used;
            doc_id = doc_id
                .checked_add(gap)
                .ok_or_else(|| IndexError::corrupt("document id overflows u32"))?;
            postings.push(Posting {
                doc_id,
                tf: read_u32_at(bytes, pos)?,
            });
            pos += 4;
        }
        Ok(postings)
    }

    /// Dictionary position of `term`, if present
    pub fn position(&self, term: &str) -> Result<Option<usize>> {
        // last block whose first term is <= term
        let block = match search_by(self.num_blocks(), |b| {
            Ok(self.block_first_term(b)?.as_str().cmp(term))
        })? {
            Ok(block) => return Ok(Some(block * self.options.block_size)),
            Err(0) => return Ok(None),
            Err(next) => next - 1,
        };
        Ok(self
            .block_terms(block)?
            .iter()
            .position(|t| t == term)
            .map(|j| block * self.options.block_size + j))
    }

    pub fn lookup(&self, term: &str) -> Result<Option<TermEntry>> {
        match self.position(term)? {
            Some(idx) => Ok(Some(TermEntry::from_postings(self.postings(idx)?))),
            None => Ok(None),
        }
    }

    /// Decode every term in dictionary order
    pub fn entries(&self) -> Result<Vec<(String, TermEntry)>> {
        let mut entries = Vec::with_capacity(self.len());
        for block in 0..self.num_blocks() {
            for term in self.block_terms(block)? {
                let idx = entries.len();
                entries.push((term, TermEntry::from_postings(self.postings(idx)?)));
            }
        }
        Ok(entries)
    }
}
