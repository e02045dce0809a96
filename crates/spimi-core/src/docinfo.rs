//! Per-document statistics file: `(doc_id, max_tf, doc_len)` records in doc id order

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use byteorder::WriteBytesExt;

use crate::error::{IndexError, Result};
use crate::layout::{read_u32_at, Endian, DOCINFO_RECORD_LEN};
use crate::spimi::DocInfo;

pub(crate) fn write_doc_info<W: Write>(out: &mut W, doc_info: &BTreeMap<u32, DocInfo>) -> Result<()> {
    for (&doc_id, info) in doc_info {
        out.write_u32::<Endian>(doc_id)?;
        out.write_u32::<Endian>(info.max_tf)?;
        out.write_u32::<Endian>(info.doc_len)?;
    }
    Ok(())
}

pub fn decode_doc_info(bytes: &[u8]) -> Result<BTreeMap<u32, DocInfo>> {
    if bytes.len() % DOCINFO_RECORD_LEN != 0 {
        return Err(IndexError::corrupt(format!(
            "document statistics of {} bytes is not a whole number of records",
            bytes.len()
        )));
    }
    let mut doc_info = BTreeMap::new();
    let mut prev = None;
    for pos in (0..bytes.len()).step_by(DOCINFO_RECORD_LEN) {
        let doc_id = read_u32_at(bytes, pos)?;
        if prev.is_some_and(|p| p >= doc_id) {
            return Err(IndexError::corrupt(format!(
                "document {doc_id} out of order in statistics file"
            )));
        }
        prev = Some(doc_id);
        doc_info.insert(
            doc_id,
            DocInfo {
                max_tf: read_u32_at(bytes, pos + 4)?,
                doc_len: read_u32_at(bytes, pos + 8)?,
            },
        );
    }
    Ok(doc_info)
}

/// Read a `.docinfo` file written by either layout
pub fn read_doc_info(path: &Path) -> Result<BTreeMap<u32, DocInfo>> {
    decode_doc_info(&std::fs::read(path)?)
}
