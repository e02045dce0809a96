//! Spimi Core - single-pass inverted index construction and compression
//!
//! Builds an in-memory inverted index from a stream of `(term, doc_id)`
//! pairs and writes it in an uncompressed reference layout or a compressed
//! layout using gamma/delta gap codes and front-coded dictionary blocks.

pub mod bits;
pub mod codec;
pub mod compressed;
pub mod config;
pub mod docinfo;
pub mod error;
pub mod front_coding;
pub mod layout;
pub mod reader;
pub mod spimi;
pub mod stopwords;
pub mod uncompressed;

pub use codec::GapCodec;
pub use compressed::write_compressed;
pub use config::CompressionOptions;
pub use docinfo::read_doc_info;
pub use error::{IndexError, Result};
pub use layout::{FileKind, Layout, WriteSummary};
pub use reader::{CompressedIndexReader, UncompressedIndexReader};
pub use spimi::{
    build, build_with_stop_words, DocInfo, IndexStats, InvertedIndex, Posting, SpimiBuilder,
    TermEntry,
};
pub use stopwords::StopWords;
pub use uncompressed::write_uncompressed;
