//! On-disk layout shared by the writers and readers
//!
//! Every multi-byte integer is big-endian. Each output file is staged as a
//! temporary file in the target directory and only renamed into place once
//! the whole layout was written.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{IndexError, Result};

/// Byte order of every integer in the index files
pub type Endian = BigEndian;

/// Longest accepted term, in bytes
pub const MAX_TERM_LEN: usize = u8::MAX as usize;

/// `(df, term_offset, postings_offset)`
pub const UNCOMPRESSED_RECORD_LEN: usize = 12;
/// `(df, posting_offset)`
pub const COMPRESSED_RECORD_LEN: usize = 8;
/// Dictionary offset appended to every k-th compressed record
pub const BLOCK_POINTER_LEN: usize = 4;
/// `(doc_id, max_tf, doc_len)`
pub const DOCINFO_RECORD_LEN: usize = 12;

/// Manifest describing how a compressed layout was written
pub const MANIFEST_FILE: &str = "compressed.meta.json";

/// Which of the two serializations a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Uncompressed,
    Compressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pointers,
    Dictionary,
    Postings,
    DocInfo,
}

impl Layout {
    fn prefix(self) -> &'static str {
        match self {
            Layout::Uncompressed => "uncompressed",
            Layout::Compressed => "compressed",
        }
    }

    pub fn file_name(self, kind: FileKind) -> String {
        let ext = match kind {
            FileKind::Pointers => "ptr",
            FileKind::Dictionary => "dictionary",
            FileKind::Postings => "postings",
            FileKind::DocInfo => "docinfo",
        };
        format!("{}.{}", self.prefix(), ext)
    }

    pub fn path(self, dir: &Path, kind: FileKind) -> PathBuf {
        dir.join(self.file_name(kind))
    }
}

/// Output file written under a temporary name, tracking its write offset
pub(crate) struct StagedFile {
    target: PathBuf,
    out: BufWriter<NamedTempFile>,
    offset: u64,
}

impl StagedFile {
    pub fn create(target: PathBuf) -> Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{name}."))
            .suffix(".partial")
            .tempfile_in(dir)?;
        Ok(Self {
            target,
            out: BufWriter::new(temp),
            offset: 0,
        })
    }

    /// Current offset as a 32-bit file pointer
    pub fn pointer(&self) -> Result<u32> {
        u32::try_from(self.offset).map_err(|_| IndexError::OffsetOverflow(self.offset))
    }

    /// Flush everything to the temporary file
    pub fn finish(self) -> Result<Staged> {
        let temp = self.out.into_inner().map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;
        Ok(Staged {
            temp,
            target: self.target,
            len: self.offset,
        })
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.out.write(buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// A fully written temporary file waiting to be renamed into place
pub(crate) struct Staged {
    temp: NamedTempFile,
    target: PathBuf,
    len: u64,
}

impl Staged {
    pub fn persist(self) -> Result<u64> {
        let file: File = self.temp.persist(&self.target).map_err(|e| e.error)?;
        drop(file);
        Ok(self.len)
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Rename every staged file into place, returning their sizes in order
///
/// The last file commits the layout. A previous copy of it is removed before
/// anything is renamed, and it is renamed last. If any rename fails, the
/// files already renamed by this call are removed again.
pub(crate) fn persist_all(files: Vec<Staged>) -> Result<Vec<u64>> {
    if let Some(marker) = files.last() {
        remove_if_exists(&marker.target)?;
    }

    let mut persisted: Vec<PathBuf> = Vec::with_capacity(files.len());
    let mut sizes = Vec::with_capacity(files.len());
    for file in files {
        let target = file.target.clone();
        match file.persist() {
            Ok(len) => {
                persisted.push(target);
                sizes.push(len);
            }
            Err(err) => {
                for path in &persisted {
                    if let Err(cleanup) = remove_if_exists(path) {
                        warn!(
                            path = %path.display(),
                            error = %cleanup,
                            "failed to roll back index file"
                        );
                    }
                }
                return Err(err);
            }
        }
    }
    Ok(sizes)
}

/// Write a term as a `u16` length followed by its bytes
pub(crate) fn write_term<W: Write>(out: &mut W, term: &str) -> Result<()> {
    let len = u16::try_from(term.len()).map_err(|_| {
        IndexError::InconsistentState(format!("term of {} bytes in dictionary", term.len()))
    })?;
    out.write_u16::<Endian>(len)?;
    out.write_all(term.as_bytes())?;
    Ok(())
}

pub(crate) fn read_u32_at(bytes: &[u8], pos: usize) -> Result<u32> {
    bytes
        .get(pos..pos + 4)
        .map(Endian::read_u32)
        .ok_or_else(|| IndexError::corrupt(format!("u32 at offset {pos} is out of bounds")))
}

/// Sizes of the files produced by one writer invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub layout: Layout,
    pub num_terms: usize,
    pub max_term_len: usize,
    pub pointer_bytes: u64,
    pub dictionary_bytes: u64,
    pub postings_bytes: u64,
    pub docinfo_bytes: u64,
}

impl WriteSummary {
    /// Bytes of the three index files, document statistics excluded
    pub fn index_bytes(&self) -> u64 {
        self.pointer_bytes + self.dictionary_bytes + self.postings_bytes
    }
}
