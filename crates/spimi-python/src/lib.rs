//! Python bindings for the Spimi index builder

use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use spimi_core::{
    write_compressed, write_uncompressed, CompressionOptions, GapCodec, IndexError,
    InvertedIndex, SpimiBuilder, StopWords, WriteSummary,
};
use std::collections::HashMap;
use std::path::PathBuf;

fn to_py_err(err: IndexError) -> PyErr {
    match err {
        IndexError::Io(err) => PyIOError::new_err(err.to_string()),
        IndexError::MalformedToken { .. } | IndexError::Codec(_) | IndexError::InvalidOption(_) => {
            PyValueError::new_err(err.to_string())
        }
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

fn to_doc_id(doc_id: i64) -> PyResult<u32> {
    u32::try_from(doc_id)
        .map_err(|_| PyValueError::new_err(format!("doc_id out of range: {doc_id}")))
}

fn summary_dict(summary: &WriteSummary) -> HashMap<String, PyObject> {
    Python::with_gil(|py| {
        let mut map = HashMap::new();
        map.insert("num_terms".to_string(), summary.num_terms.to_object(py));
        map.insert("pointer_bytes".to_string(), summary.pointer_bytes.to_object(py));
        map.insert("dictionary_bytes".to_string(), summary.dictionary_bytes.to_object(py));
        map.insert("postings_bytes".to_string(), summary.postings_bytes.to_object(py));
        map.insert("docinfo_bytes".to_string(), summary.docinfo_bytes.to_object(py));
        map
    })
}

/// Python-exposed inverted index
///
/// Tokens are added while building; `build()` freezes the index so it can
/// be written or queried.
#[pyclass]
pub struct SpimiIndex {
    builder: Option<SpimiBuilder>,
    index: Option<InvertedIndex>,
}

impl SpimiIndex {
    fn builder(&mut self) -> PyResult<&mut SpimiBuilder> {
        self.builder
            .as_mut()
            .ok_or_else(|| PyRuntimeError::new_err("index is already built"))
    }

    fn index(&self) -> PyResult<&InvertedIndex> {
        self.index
            .as_ref()
            .ok_or_else(|| PyRuntimeError::new_err("index is not built, call build() first"))
    }
}

#[pymethods]
impl SpimiIndex {
    /// Create an empty index
    ///
    /// Args:
    ///     stop_words: Terms to leave out of the dictionary (default: English list)
    #[new]
    #[pyo3(signature = (stop_words=None))]
    fn new(stop_words: Option<Vec<String>>) -> Self {
        let stop_words = match stop_words {
            Some(words) => words.into_iter().collect(),
            None => StopWords::english(),
        };
        Self {
            builder: Some(SpimiBuilder::with_stop_words(stop_words)),
            index: None,
        }
    }

    /// Add one token occurrence
    fn add(&mut self, term: &str, doc_id: i64) -> PyResult<()> {
        let doc_id = to_doc_id(doc_id)?;
        self.builder()?.add(term, doc_id).map_err(to_py_err)
    }

    /// Add a sequence of `(term, doc_id)` pairs
    fn extend(&mut self, pairs: Vec<(String, i64)>) -> PyResult<()> {
        let builder = self.builder()?;
        for (term, doc_id) in pairs {
            builder.add(&term, to_doc_id(doc_id)?).map_err(to_py_err)?;
        }
        Ok(())
    }

    /// Freeze the index; further `add` calls fail
    fn build(&mut self) {
        if let Some(builder) = self.builder.take() {
            self.index = Some(builder.finish());
        }
    }

    /// Get index statistics
    ///
    /// Returns:
    ///     Dictionary with num_terms, num_docs, num_postings, total_tokens
    fn stats(&self) -> PyResult<HashMap<String, PyObject>> {
        let stats = self.index()?.stats();
        Ok(Python::with_gil(|py| {
            let mut map = HashMap::new();
            map.insert("num_terms".to_string(), stats.num_terms.to_object(py));
            map.insert("num_docs".to_string(), stats.num_docs.to_object(py));
            map.insert("num_postings".to_string(), stats.num_postings.to_object(py));
            map.insert("total_tokens".to_string(), stats.total_tokens.to_object(py));
            map
        }))
    }

    /// Write the uncompressed layout into `dir`
    fn write_uncompressed(&self, dir: PathBuf) -> PyResult<HashMap<String, PyObject>> {
        let summary = write_uncompressed(self.index()?, &dir).map_err(to_py_err)?;
        Ok(summary_dict(&summary))
    }

    /// Write the compressed layout into `dir`
    ///
    /// Args:
    ///     block_size: Terms per dictionary block (default: 8)
    ///     codec: Gap code, "gamma" or "delta"
    ///     front_coding: Share prefixes inside dictionary blocks
    #[pyo3(signature = (dir, block_size=8, codec="gamma", front_coding=true))]
    fn write_compressed(
        &self,
        dir: PathBuf,
        block_size: usize,
        codec: &str,
        front_coding: bool,
    ) -> PyResult<HashMap<String, PyObject>> {
        let options = CompressionOptions {
            block_size,
            codec: codec.parse::<GapCodec>().map_err(to_py_err)?,
            front_coding,
        };
        let summary = write_compressed(self.index()?, &dir, &options).map_err(to_py_err)?;
        Ok(summary_dict(&summary))
    }

    /// Look up a term
    ///
    /// Returns:
    ///     List of (doc_id, tf) pairs, or None for an unknown term
    fn lookup(&self, term: &str) -> PyResult<Option<Vec<(u32, u32)>>> {
        Ok(self
            .index()?
            .get(term)
            .map(|entry| entry.postings().iter().map(|p| (p.doc_id, p.tf)).collect()))
    }

    fn __len__(&self) -> usize {
        match (&self.builder, &self.index) {
            (Some(builder), _) => builder.num_terms(),
            (None, Some(index)) => index.len(),
            (None, None) => 0,
        }
    }

    fn __repr__(&self) -> String {
        match &self.index {
            Some(index) => {
                let stats = index.stats();
                format!(
                    "SpimiIndex(num_terms={}, num_docs={}, built=True)",
                    stats.num_terms, stats.num_docs
                )
            }
            None => format!("SpimiIndex(num_terms={}, built=False)", self.__len__()),
        }
    }
}

/// Python module
#[pymodule]
fn spimi_rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<SpimiIndex>()?;
    Ok(())
}
