//! Reference layout without any compression
//!
//! * `uncompressed.dictionary`: `u16` length + term bytes, per term
//! * `uncompressed.postings`: `(doc_id, tf)` pairs, grouped by term
//! * `uncompressed.ptr`: `(df, term_offset, postings_offset)` per term

use std::fs;
use std::path::Path;

use byteorder::WriteBytesExt;
use tracing::{debug, info};

use crate::docinfo::write_doc_info;
use crate::error::Result;
use crate::layout::{persist_all, write_term, Endian, FileKind, Layout, StagedFile, WriteSummary};
use crate::spimi::InvertedIndex;

/// Serialize `index` into `dir` using the uncompressed layout
pub fn write_uncompressed(index: &InvertedIndex, dir: &Path) -> Result<WriteSummary> {
    index.check_invariants()?;
    fs::create_dir_all(dir)?;

    let layout = Layout::Uncompressed;
    let max_term_len = index.stats().max_term_len;
    debug!(dir = %dir.display(), max_term_len, "writing uncompressed index");

    let mut pointers = StagedFile::create(layout.path(dir, FileKind::Pointers))?;
    let mut dictionary = StagedFile::create(layout.path(dir, FileKind::Dictionary))?;
    let mut postings = StagedFile::create(layout.path(dir, FileKind::Postings))?;
    let mut docinfo = StagedFile::create(layout.path(dir, FileKind::DocInfo))?;

    for (term, entry) in index.iter() {
        let term_offset = dictionary.pointer()?;
        let postings_offset = postings.pointer()?;

        write_term(&mut dictionary, term)?;
        for posting in entry.postings() {
            postings.write_u32::<Endian>(posting.doc_id)?;
            postings.write_u32::<Endian>(posting.tf)?;
        }

        pointers.write_u32::<Endian>(entry.df())?;
        pointers.write_u32::<Endian>(term_offset)?;
        pointers.write_u32::<Endian>(postings_offset)?;
    }
    write_doc_info(&mut docinfo, index.doc_info())?;

    let staged = vec![
        pointers.finish()?,
        dictionary.finish()?,
        postings.finish()?,
        docinfo.finish()?,
    ];
    let sizes = persist_all(staged)?;

    let summary = WriteSummary {
        layout,
        num_terms: index.len(),
        max_term_len,
        pointer_bytes: sizes[0],
        dictionary_bytes: sizes[1],
        postings_bytes: sizes[2],
        docinfo_bytes: sizes[3],
    };
    info!(
        dir = %dir.display(),
        terms = summary.num_terms,
        bytes = summary.index_bytes(),
        "wrote uncompressed index"
    );
    Ok(summary)
}
