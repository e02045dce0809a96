//! Single-pass in-memory inverted index construction

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{IndexError, Result};
use crate::front_coding::RESERVED_MARKERS;
use crate::layout::{StagedFile, MAX_TERM_LEN};
use crate::stopwords::StopWords;

/// Occurrences of a term in one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: u32,
    pub tf: u32,
}

/// Dictionary entry: document frequency and postings ordered by doc id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermEntry {
    df: u32,
    postings: Vec<Posting>,
}

impl TermEntry {
    fn new(doc_id: u32) -> Self {
        Self {
            df: 1,
            postings: vec![Posting { doc_id, tf: 1 }],
        }
    }

    pub(crate) fn from_postings(postings: Vec<Posting>) -> Self {
        Self {
            df: postings.len() as u32,
            postings,
        }
    }

    /// Count one more occurrence in `doc_id`, returning its term frequency
    fn record(&mut self, doc_id: u32) -> u32 {
        let idx = match self.postings.last() {
            Some(last) if last.doc_id == doc_id => self.postings.len() - 1,
            Some(last) if last.doc_id > doc_id => {
                match self.postings.binary_search_by_key(&doc_id, |p| p.doc_id) {
                    Ok(idx) => idx,
                    Err(idx) => {
                        self.postings.insert(idx, Posting { doc_id, tf: 0 });
                        idx
                    }
                }
            }
            _ => {
                self.postings.push(Posting { doc_id, tf: 0 });
                self.postings.len() - 1
            }
        };
        self.postings[idx].tf += 1;
        self.df = self.postings.len() as u32;
        self.postings[idx].tf
    }

    pub fn df(&self) -> u32 {
        self.df
    }

    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    /// Term frequency in `doc_id`, if the term occurs there
    pub fn tf(&self, doc_id: u32) -> Option<u32> {
        self.postings
            .binary_search_by_key(&doc_id, |p| p.doc_id)
            .ok()
            .map(|idx| self.postings[idx].tf)
    }

    fn check(&self, term: &str) -> Result<()> {
        if self.df as usize != self.postings.len() {
            return Err(IndexError::InconsistentState(format!(
                "term {term:?} has df {} but {} postings",
                self.df,
                self.postings.len()
            )));
        }
        if self.postings.is_empty() {
            return Err(IndexError::InconsistentState(format!(
                "term {term:?} has an empty postings list"
            )));
        }
        if let Some(p) = self.postings.iter().find(|p| p.tf == 0) {
            return Err(IndexError::InconsistentState(format!(
                "term {term:?} has zero tf for document {}",
                p.doc_id
            )));
        }
        if let Some(w) = self.postings.windows(2).find(|w| w[0].doc_id >= w[1].doc_id) {
            return Err(IndexError::InconsistentState(format!(
                "term {term:?} postings not strictly increasing at documents {} and {}",
                w[0].doc_id, w[1].doc_id
            )));
        }
        Ok(())
    }
}

/// Per-document statistics gathered while indexing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocInfo {
    /// Tokens seen for the document, stop words included
    pub doc_len: u32,
    /// Largest term frequency in the document
    pub max_tf: u32,
}

/// Reject terms that cannot be stored in the dictionary layouts
pub fn validate_term(term: &str) -> Result<()> {
    if term.is_empty() {
        return Err(IndexError::malformed(term, "empty term"));
    }
    if !term.is_ascii() {
        return Err(IndexError::malformed(term, "term is not ASCII"));
    }
    if term.len() > MAX_TERM_LEN {
        return Err(IndexError::malformed(
            term,
            format!("term longer than {MAX_TERM_LEN} bytes"),
        ));
    }
    if let Some(marker) = term.bytes().find(|b| RESERVED_MARKERS.contains(b)) {
        return Err(IndexError::malformed(
            term,
            format!("reserved character '{}'", marker as char),
        ));
    }
    Ok(())
}

/// Builds an inverted index in one pass over `(term, doc_id)` pairs
pub struct SpimiBuilder {
    stop_words: StopWords,
    terms: AHashMap<String, TermEntry>,
    doc_info: AHashMap<u32, DocInfo>,
    total_tokens: u64,
}

impl SpimiBuilder {
    /// Create a builder with the English stop-word list
    pub fn new() -> Self {
        Self::with_stop_words(StopWords::default())
    }

    pub fn with_stop_words(stop_words: StopWords) -> Self {
        Self {
            stop_words,
            terms: AHashMap::new(),
            doc_info: AHashMap::new(),
            total_tokens: 0,
        }
    }

    /// Index one token occurrence
    pub fn add(&mut self, term: &str, doc_id: u32) -> Result<()> {
        validate_term(term)?;
        self.total_tokens += 1;

        let info = self
            .doc_info
            .entry(doc_id)
            .and_modify(|info| info.doc_len += 1)
            .or_insert(DocInfo {
                doc_len: 1,
                max_tf: 1,
            });

        // stop words still count toward doc_len
        if self.stop_words.contains(term) {
            return Ok(());
        }

        let tf = match self.terms.get_mut(term) {
            Some(entry) => entry.record(doc_id),
            None => {
                self.terms.insert(term.to_string(), TermEntry::new(doc_id));
                1
            }
        };
        info.max_tf = info.max_tf.max(tf);
        Ok(())
    }

    /// Index every pair of a token stream
    pub fn extend<I, S>(&mut self, tokens: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        for (term, doc_id) in tokens {
            self.add(term.as_ref(), doc_id)?;
        }
        Ok(())
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn num_docs(&self) -> usize {
        self.doc_info.len()
    }

    /// Sort the dictionary and freeze the index
    pub fn finish(self) -> InvertedIndex {
        let mut terms: Vec<(String, TermEntry)> = self.terms.into_iter().collect();
        terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        let index = InvertedIndex {
            terms,
            doc_info: self.doc_info.into_iter().collect(),
            total_tokens: self.total_tokens,
        };
        debug!(
            terms = index.len(),
            docs = index.doc_info.len(),
            tokens = index.total_tokens,
            "froze inverted index"
        );
        index
    }
}

impl Default for SpimiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an index with the English stop-word list
pub fn build<I, S>(tokens: I) -> Result<InvertedIndex>
where
    I: IntoIterator<Item = (S, u32)>,
    S: AsRef<str>,
{
    build_with_stop_words(tokens, StopWords::default())
}

pub fn build_with_stop_words<I, S>(tokens: I, stop_words: StopWords) -> Result<InvertedIndex>
where
    I: IntoIterator<Item = (S, u32)>,
    S: AsRef<str>,
{
    let mut builder = SpimiBuilder::with_stop_words(stop_words);
    builder.extend(tokens)?;
    Ok(builder.finish())
}

/// Read-only inverted index with terms in byte order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvertedIndex {
    terms: Vec<(String, TermEntry)>,
    doc_info: BTreeMap<u32, DocInfo>,
    total_tokens: u64,
}

impl InvertedIndex {
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms and entries in dictionary order
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &TermEntry)> + '_ {
        self.terms.iter().map(|(term, entry)| (term.as_str(), entry))
    }

    pub fn get(&self, term: &str) -> Option<&TermEntry> {
        self.terms
            .binary_search_by(|(t, _)| t.as_str().cmp(term))
            .ok()
            .map(|idx| &self.terms[idx].1)
    }

    pub fn doc_info(&self) -> &BTreeMap<u32, DocInfo> {
        &self.doc_info
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            num_terms: self.terms.len(),
            num_docs: self.doc_info.len(),
            num_postings: self.terms.iter().map(|(_, e)| e.postings.len()).sum(),
            total_tokens: self.total_tokens,
            max_term_len: self.terms.iter().map(|(t, _)| t.len()).max().unwrap_or(0),
        }
    }

    /// Verify dictionary order and every postings list
    pub fn check_invariants(&self) -> Result<()> {
        if let Some(w) = self.terms.windows(2).find(|w| w[0].0 >= w[1].0) {
            return Err(IndexError::InconsistentState(format!(
                "dictionary not sorted at {:?} and {:?}",
                w[0].0, w[1].0
            )));
        }
        for (term, entry) in &self.terms {
            validate_term(term)?;
            entry.check(term)?;
        }
        Ok(())
    }

    /// Persist the built index so a later run can skip building
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let mut file = StagedFile::create(path.to_path_buf())?;
        serde_json::to_writer(&mut file, self)?;
        let bytes = file.finish()?.persist()?;
        info!(path = %path.display(), bytes, "saved index snapshot");
        Ok(())
    }

    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let index: InvertedIndex = serde_json::from_reader(reader)?;
        index.check_invariants()?;
        info!(path = %path.display(), terms = index.len(), "loaded index snapshot");
        Ok(index)
    }
}

/// Index statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub num_terms: usize,
    pub num_docs: usize,
    pub num_postings: usize,
    pub total_tokens: u64,
    pub max_term_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_stop_words(tokens: &[(&str, u32)]) -> InvertedIndex {
        build_with_stop_words(tokens.iter().copied(), StopWords::none()).unwrap()
    }

    #[test]
    fn test_term_frequencies() {
        let index = no_stop_words(&[("a", 0), ("b", 0), ("a", 1), ("b", 1), ("b", 1)]);

        let b = index.get("b").unwrap();
        assert_eq!(b.df(), 2);
        assert_eq!(
            b.postings(),
            &[Posting { doc_id: 0, tf: 1 }, Posting { doc_id: 1, tf: 2 }]
        );
        assert_eq!(index.doc_info()[&1].max_tf, 2);
        assert_eq!(index.doc_info()[&1].doc_len, 3);
        assert_eq!(index.doc_info()[&0].max_tf, 1);
    }

    #[test]
    fn test_sorted_dictionary() {
        let index = no_stop_words(&[("zeta", 0), ("alpha", 0), ("Beta", 1), ("alp", 1)]);
        let terms: Vec<&str> = index.iter().map(|(t, _)| t).collect();
        assert_eq!(terms, vec!["Beta", "alp", "alpha", "zeta"]);
        index.check_invariants().unwrap();
    }

    #[test]
    fn test_stop_words_counted_not_indexed() {
        let index = build(vec![("the", 3), ("wing", 3), ("of", 3), ("wing", 3)]).unwrap();
        assert!(index.get("the").is_none());
        assert!(index.get("of").is_none());
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.doc_info()[&3],
            DocInfo {
                doc_len: 4,
                max_tf: 2
            }
        );
    }

    #[test]
    fn test_df_matches_postings() {
        let tokens: Vec<(String, u32)> = (0..50u32)
            .flat_map(|doc| {
                (0..=(doc % 7)).map(move |i| (format!("t{}", (doc + i) % 11), doc))
            })
            .collect();
        let index = build_with_stop_words(tokens, StopWords::none()).unwrap();
        for (_, entry) in index.iter() {
            assert_eq!(entry.df() as usize, entry.postings().len());
            assert!(entry.postings().windows(2).all(|w| w[0].doc_id < w[1].doc_id));
        }
        index.check_invariants().unwrap();
    }

    #[test]
    fn test_out_of_order_documents() {
        let index = no_stop_words(&[("x", 5), ("x", 2), ("x", 9), ("x", 2)]);
        let entry = index.get("x").unwrap();
        let docs: Vec<u32> = entry.postings().iter().map(|p| p.doc_id).collect();
        assert_eq!(docs, vec![2, 5, 9]);
        assert_eq!(entry.tf(2), Some(2));
        assert_eq!(entry.tf(3), None);
        assert_eq!(entry.df(), 3);
    }

    #[test]
    fn test_empty_stream() {
        let index = no_stop_words(&[]);
        assert!(index.is_empty());
        assert!(index.doc_info().is_empty());
        assert_eq!(index.stats().max_term_len, 0);
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let mut builder = SpimiBuilder::with_stop_words(StopWords::none());
        for bad in ["", "caf\u{e9}", "a*b", "x|y", "~tilde"] {
            let err = builder.add(bad, 0).unwrap_err();
            assert!(matches!(err, IndexError::MalformedToken { .. }), "{bad:?}");
        }
        let long = "x".repeat(MAX_TERM_LEN + 1);
        assert!(builder.add(&long, 0).is_err());
        assert!(builder.add(&"x".repeat(MAX_TERM_LEN), 0).is_ok());

        let index = builder.finish();
        assert_eq!(index.len(), 1);
        assert_eq!(index.doc_info()[&0].doc_len, 1);
    }

    #[test]
    fn test_stats() {
        let index = no_stop_words(&[("flow", 0), ("flow", 1), ("boundary", 1)]);
        let stats = index.stats();
        assert_eq!(stats.num_terms, 2);
        assert_eq!(stats.num_docs, 2);
        assert_eq!(stats.num_postings, 3);
        assert_eq!(stats.total_tokens, 3);
        assert_eq!(stats.max_term_len, "boundary".len());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let index = no_stop_words(&[("shock", 0), ("wave", 0), ("shock", 2)]);
        index.save_snapshot(&path).unwrap();
        assert_eq!(InvertedIndex::load_snapshot(&path).unwrap(), index);
    }

    #[test]
    fn test_inconsistent_state_detected() {
        let mut index = no_stop_words(&[("a", 0), ("a", 1)]);
        index.terms[0].1.df = 5;
        assert!(matches!(
            index.check_invariants(),
            Err(IndexError::InconsistentState(_))
        ));
    }
}
