//! Compressed layout: gap-coded postings and a blocked dictionary
//!
//! * `compressed.postings`: per term, the first doc id and its tf as `u32`,
//!   then for every later posting a byte-aligned gamma or delta coded gap
//!   followed by the tf as `u32`
//! * `compressed.dictionary`: front-coded blocks, or `u16` length + term bytes
//! * `compressed.ptr`: `(df, posting_offset)` per term, plus the dictionary
//!   offset for every term whose position is a multiple of the block size

use std::fs;
use std::io::Write;
use std::path::Path;

use byteorder::WriteBytesExt;
use tracing::{debug, info};

use crate::codec::GapCodec;
use crate::config::{CompressionOptions, LayoutManifest};
use crate::docinfo::write_doc_info;
use crate::error::{IndexError, Result};
use crate::front_coding::encode_block;
use crate::layout::{
    persist_all, write_term, Endian, FileKind, Layout, StagedFile, WriteSummary, MANIFEST_FILE,
};
use crate::spimi::{InvertedIndex, TermEntry};

/// Write one postings list, returning the offset it starts at
fn write_postings(
    out: &mut StagedFile,
    entry: &TermEntry,
    codec: GapCodec,
    gap_buf: &mut Vec<u8>,
) -> Result<u32> {
    let mut postings = entry.postings().iter();
    let first = postings
        .next()
        .ok_or_else(|| IndexError::InconsistentState("empty postings list".to_string()))?;

    let posting_ptr = out.pointer()?;
    out.write_u32::<Endian>(first.doc_id)?;
    out.write_u32::<Endian>(first.tf)?;

    let mut prev = first.doc_id;
    for posting in postings {
        let gap = posting.doc_id.checked_sub(prev).filter(|&gap| gap > 0).ok_or_else(|| {
            IndexError::InconsistentState(format!(
                "document {} follows {prev} in a postings list",
                posting.doc_id
            ))
        })?;
        gap_buf.clear();
        codec.encode_aligned(gap, gap_buf)?;
        out.write_all(gap_buf)?;
        out.write_u32::<Endian>(posting.tf)?;
        prev = posting.doc_id;
    }
    Ok(posting_ptr)
}

fn flush_block(dictionary: &mut StagedFile, block: &mut Vec<&str>, buf: &mut Vec<u8>) -> Result<()> {
    if block.is_empty() {
        return Ok(());
    }
    buf.clear();
    encode_block(block, buf)?;
    dictionary.write_all(buf)?;
    block.clear();
    Ok(())
}

/// Serialize `index` into `dir` using the compressed layout
pub fn write_compressed(
    index: &InvertedIndex,
    dir: &Path,
    options: &CompressionOptions,
) -> Result<WriteSummary> {
    options.validate()?;
    index.check_invariants()?;
    fs::create_dir_all(dir)?;

    let layout = Layout::Compressed;
    let block_size = options.block_size;
    debug!(
        dir = %dir.display(),
        block_size,
        codec = %options.codec,
        front_coding = options.front_coding,
        "writing compressed index"
    );

    let mut pointers = StagedFile::create(layout.path(dir, FileKind::Pointers))?;
    let mut dictionary = StagedFile::create(layout.path(dir, FileKind::Dictionary))?;
    let mut postings = StagedFile::create(layout.path(dir, FileKind::Postings))?;
    let mut docinfo = StagedFile::create(layout.path(dir, FileKind::DocInfo))?;
    let mut manifest = StagedFile::create(dir.join(MANIFEST_FILE))?;

    let mut block: Vec<&str> = Vec::with_capacity(block_size);
    let mut block_buf = Vec::new();
    let mut gap_buf = Vec::new();

    for (i, (term, entry)) in index.iter().enumerate() {
        let starts_block = i % block_size == 0;
        if options.front_coding && starts_block {
            flush_block(&mut dictionary, &mut block, &mut block_buf)?;
        }

        let term_ptr = dictionary.pointer()?;
        if options.front_coding {
            block.push(term);
        } else {
            write_term(&mut dictionary, term)?;
        }

        let posting_ptr = write_postings(&mut postings, entry, options.codec, &mut gap_buf)?;

        pointers.write_u32::<Endian>(entry.df())?;
        pointers.write_u32::<Endian>(posting_ptr)?;
        if starts_block {
            pointers.write_u32::<Endian>(term_ptr)?;
        }
    }
    flush_block(&mut dictionary, &mut block, &mut block_buf)?;

    write_doc_info(&mut docinfo, index.doc_info())?;
    serde_json::to_writer_pretty(
        &mut manifest,
        &LayoutManifest::new(*options, index.len(), index.doc_info().len()),
    )?;

    let staged = vec![
        pointers.finish()?,
        dictionary.finish()?,
        postings.finish()?,
        docinfo.finish()?,
        manifest.finish()?,
    ];
    let sizes = persist_all(staged)?;

    let summary = WriteSummary {
        layout,
        num_terms: index.len(),
        max_term_len: index.stats().max_term_len,
        pointer_bytes: sizes[0],
        dictionary_bytes: sizes[1],
        postings_bytes: sizes[2],
        docinfo_bytes: sizes[3],
    };
    info!(
        dir = %dir.display(),
        terms = summary.num_terms,
        bytes = summary.index_bytes(),
        codec = %options.codec,
        front_coding = options.front_coding,
        "wrote compressed index"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{BLOCK_POINTER_LEN, COMPRESSED_RECORD_LEN};
    use crate::reader::CompressedIndexReader;
    use crate::spimi::build_with_stop_words;
    use crate::stopwords::StopWords;

    fn read(dir: &Path, kind: FileKind) -> Vec<u8> {
        fs::read(Layout::Compressed.path(dir, kind)).unwrap()
    }

    #[test]
    fn test_gamma_postings_bytes() {
        // doc ids 3, 5, 6: first id raw, then gaps 2 ("100") and 1 ("0")
        let index = build_with_stop_words(
            vec![("jet", 3), ("jet", 5), ("jet", 5), ("jet", 6)],
            StopWords::none(),
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        write_compressed(&index, dir.path(), &CompressionOptions::default()).unwrap();

        assert_eq!(
            read(dir.path(), FileKind::Postings),
            vec![0, 0, 0, 3, 0, 0, 0, 1, 0b1000_0000, 0, 0, 0, 2, 0, 0, 0, 0, 1]
        );
        assert_eq!(
            read(dir.path(), FileKind::Pointers),
            vec![0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(read(dir.path(), FileKind::Dictionary), b"\0\x03jet*");
    }

    #[test]
    fn test_sparse_term_pointers() {
        let tokens: Vec<(String, u32)> = (0..21u32).map(|i| (format!("term{i:02}"), i)).collect();
        let index = build_with_stop_words(tokens, StopWords::none()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        for front_coding in [true, false] {
            let options = CompressionOptions {
                block_size: 4,
                codec: GapCodec::Delta,
                front_coding,
            };
            let summary = write_compressed(&index, dir.path(), &options).unwrap();
            let expected = 21 * COMPRESSED_RECORD_LEN + 21usize.div_ceil(4) * BLOCK_POINTER_LEN;
            assert_eq!(summary.pointer_bytes, expected as u64);
            assert_eq!(read(dir.path(), FileKind::Pointers).len(), expected);
        }
    }

    #[test]
    fn test_front_coding_saves_space() {
        let tokens: Vec<(String, u32)> =
            (0..64u32).map(|i| (format!("aerodynamic{i:03}"), i / 4)).collect();
        let index = build_with_stop_words(tokens, StopWords::none()).unwrap();

        let plain_dir = tempfile::tempdir().unwrap();
        let coded_dir = tempfile::tempdir().unwrap();
        let off = CompressionOptions {
            front_coding: false,
            ..Default::default()
        };
        let plain = write_compressed(&index, plain_dir.path(), &off).unwrap();
        let coded =
            write_compressed(&index, coded_dir.path(), &CompressionOptions::default()).unwrap();
        assert!(coded.dictionary_bytes < plain.dictionary_bytes);
        assert_eq!(coded.postings_bytes, plain.postings_bytes);
    }

    #[test]
    fn test_invalid_block_size() {
        let index = build_with_stop_words(vec![("x", 0)], StopWords::none()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let options = CompressionOptions {
            block_size: 0,
            ..Default::default()
        };
        assert!(write_compressed(&index, dir.path(), &options).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_write_leaves_no_layout() {
        let index =
            build_with_stop_words(vec![("nozzle", 0), ("wing", 2)], StopWords::none()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let options = CompressionOptions::default();
        write_compressed(&index, dir.path(), &options).unwrap();

        // a directory in place of the dictionary makes its rename fail
        let dictionary = Layout::Compressed.path(dir.path(), FileKind::Dictionary);
        fs::remove_file(&dictionary).unwrap();
        fs::create_dir(&dictionary).unwrap();
        assert!(write_compressed(&index, dir.path(), &options).is_err());

        assert!(!dir.path().join(MANIFEST_FILE).exists());
        assert!(!Layout::Compressed.path(dir.path(), FileKind::Pointers).exists());
        assert!(CompressedIndexReader::open(dir.path()).is_err());
        let partial = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".partial"))
            .count();
        assert_eq!(partial, 0);
    }

    #[test]
    fn test_failed_write_into_empty_dir() {
        let index = build_with_stop_words(vec![("jet", 1)], StopWords::none()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(Layout::Compressed.path(dir.path(), FileKind::Dictionary)).unwrap();

        assert!(write_compressed(&index, dir.path(), &CompressionOptions::default()).is_err());
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["compressed.dictionary"]);
    }

    #[test]
    fn test_empty_index() {
        let index = build_with_stop_words(Vec::<(&str, u32)>::new(), StopWords::none()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let summary =
            write_compressed(&index, dir.path(), &CompressionOptions::default()).unwrap();
        assert_eq!(summary.index_bytes(), 0);
        assert!(dir.path().join(MANIFEST_FILE).exists());
    }
}
