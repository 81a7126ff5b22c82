//! Inverted index for the lexical backend
//!
//! Two maps are kept in step:
//! - term -> (record id -> term frequency), the posting side
//! - record id -> (length, distinct terms), the forward side
//!
//! The forward side lets re-indexing and removal touch only the terms the
//! record actually contained. Document frequency is the size of a term's
//! posting map, so there is no separate counter to drift.
//!
//! # Thread Safety
//!
//! Both maps are DashMaps. Searches may run while other records are being
//! indexed; a search sees each record either fully indexed or not at all
//! per term, never a torn posting.

use crate::tokenizer::tokenize;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// Postings
// ============================================================================

/// One record's occurrence of a term
#[derive(Debug, Clone, PartialEq)]
pub struct PostingEntry {
    /// Record id
    pub doc_id: String,
    /// Occurrences of the term in the record
    pub tf: u32,
    /// Record length in tokens
    pub doc_len: u32,
}

impl PostingEntry {
    /// Create a posting entry
    pub fn new(doc_id: impl Into<String>, tf: u32, doc_len: u32) -> Self {
        PostingEntry {
            doc_id: doc_id.into(),
            tf,
            doc_len,
        }
    }
}

/// Snapshot of a term's postings, ordered by record id
#[derive(Debug, Clone, Default)]
pub struct PostingList {
    /// Entries, one per record containing the term
    pub entries: Vec<PostingEntry>,
}

impl PostingList {
    /// Number of records containing the term
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no record contains the term
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Forward entry for an indexed record
#[derive(Debug, Clone)]
struct DocEntry {
    len: u32,
    terms: Vec<String>,
}

// ============================================================================
// InvertedIndex
// ============================================================================

/// Inverted index over record content
#[derive(Default)]
pub struct InvertedIndex {
    postings: DashMap<String, HashMap<String, u32>>,
    docs: DashMap<String, DocEntry>,
    total_len: AtomicUsize,
}

impl InvertedIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every record
    pub fn clear(&self) {
        self.postings.clear();
        self.docs.clear();
        self.total_len.store(0, Ordering::Release);
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Number of indexed records
    pub fn total_docs(&self) -> usize {
        self.docs.len()
    }

    /// Number of records containing `term`
    pub fn doc_freq(&self, term: &str) -> usize {
        self.postings.get(term).map(|p| p.len()).unwrap_or(0)
    }

    /// Mean record length in tokens; 0 for an empty index
    pub fn avg_doc_len(&self) -> f32 {
        let docs = self.docs.len();
        if docs == 0 {
            return 0.0;
        }
        self.total_len.load(Ordering::Acquire) as f32 / docs as f32
    }

    /// BM25 idf: `ln((N - df + 0.5) / (df + 0.5) + 1)`, always positive
    pub fn compute_idf(&self, term: &str) -> f32 {
        let n = self.total_docs() as f32;
        let df = self.doc_freq(term) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    // ========================================================================
    // Updates
    // ========================================================================

    /// Index a record's text. An id already present is replaced.
    pub fn index_document(&self, doc_id: &str, text: &str) {
        self.remove_document(doc_id);

        let tokens = tokenize(text);
        let len = tokens.len() as u32;
        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *counts.entry(token).or_insert(0) += 1;
        }

        let mut terms = Vec::with_capacity(counts.len());
        for (term, tf) in counts {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(doc_id.to_string(), tf);
            terms.push(term);
        }

        self.docs.insert(doc_id.to_string(), DocEntry { len, terms });
        self.total_len.fetch_add(len as usize, Ordering::AcqRel);
    }

    /// Remove a record. Unknown ids are ignored.
    pub fn remove_document(&self, doc_id: &str) {
        let Some((_, doc)) = self.docs.remove(doc_id) else {
            return;
        };
        for term in &doc.terms {
            let emptied = match self.postings.get_mut(term) {
                Some(mut postings) => {
                    postings.remove(doc_id);
                    postings.is_empty()
                }
                None => false,
            };
            if emptied {
                self.postings.remove_if(term, |_, p| p.is_empty());
            }
        }
        self.total_len.fetch_sub(doc.len as usize, Ordering::AcqRel);
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// Postings for a term, or `None` when no record contains it
    pub fn lookup(&self, term: &str) -> Option<PostingList> {
        let postings = self.postings.get(term)?;
        let mut entries: Vec<PostingEntry> = postings
            .iter()
            .filter_map(|(id, &tf)| {
                let len = self.docs.get(id)?.len;
                Some(PostingEntry::new(id.as_str(), tf, len))
            })
            .collect();
        drop(postings);
        entries.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        Some(PostingList { entries })
    }

    /// Whether a record id is indexed
    pub fn contains(&self, doc_id: &str) -> bool {
        self.docs.contains_key(doc_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_document() {
        let index = InvertedIndex::new();
        index.index_document("c1", "revenue grew strongly");

        assert_eq!(index.total_docs(), 1);
        assert_eq!(index.doc_freq("revenue"), 1);

        let postings = index.lookup("revenue").unwrap();
        assert_eq!(postings.entries, vec![PostingEntry::new("c1", 1, 3)]);
    }

    #[test]
    fn test_stopwords_not_indexed() {
        let index = InvertedIndex::new();
        index.index_document("doc1", "margin improved");
        index.index_document("doc2", "margin was there");

        assert_eq!(index.doc_freq("margin"), 2);
        assert_eq!(index.doc_freq("there"), 0);
        assert!(index.lookup("there").is_none());
    }

    #[test]
    fn test_term_frequency() {
        let index = InvertedIndex::new();
        index.index_document("c1", "cost cost cost margin");
        assert_eq!(index.lookup("cost").unwrap().entries[0].tf, 3);
        assert_eq!(index.lookup("margin").unwrap().entries[0].tf, 1);
    }

    #[test]
    fn test_lookup_ordered_by_id() {
        let index = InvertedIndex::new();
        for id in ["p3", "p1", "p2"] {
            index.index_document(id, "segment revenue");
        }
        let ids: Vec<_> = index
            .lookup("segment")
            .unwrap()
            .entries
            .into_iter()
            .map(|e| e.doc_id)
            .collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_reindex_replaces_terms() {
        let index = InvertedIndex::new();
        index.index_document("c1", "revenue growth");
        index.index_document("c1", "revenue decline");

        assert_eq!(index.total_docs(), 1);
        assert_eq!(index.doc_freq("revenue"), 1);
        assert!(index.lookup("growth").is_none());
        assert_eq!(index.doc_freq("decline"), 1);
        assert!((index.avg_doc_len() - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_remove_document() {
        let index = InvertedIndex::new();
        index.index_document("doc1", "headcount flat");
        index.index_document("doc2", "headcount rose");

        index.remove_document("doc1");

        assert_eq!(index.total_docs(), 1);
        assert_eq!(index.doc_freq("headcount"), 1);
        assert_eq!(index.doc_freq("flat"), 0);
        assert!(!index.contains("doc1"));
        assert!((index.avg_doc_len() - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let index = InvertedIndex::new();
        index.index_document("doc1", "revenue");
        index.remove_document("missing");
        assert_eq!(index.total_docs(), 1);
        assert_eq!(index.doc_freq("revenue"), 1);
    }

    #[test]
    fn test_clear() {
        let index = InvertedIndex::new();
        index.index_document("c1", "revenue margin");
        index.clear();
        assert_eq!(index.total_docs(), 0);
        assert!(index.lookup("revenue").is_none());
        assert_eq!(index.avg_doc_len(), 0.0);
    }

    #[test]
    fn test_rare_term_has_higher_idf() {
        let index = InvertedIndex::new();
        for i in 0..10 {
            let text = if i == 0 { "revenue dividend" } else { "revenue" };
            index.index_document(&format!("doc{}", i), text);
        }
        assert!(index.compute_idf("dividend") > index.compute_idf("revenue"));
        assert!(index.compute_idf("revenue") > 0.0);
    }

    #[test]
    fn test_avg_doc_len() {
        let index = InvertedIndex::new();
        index.index_document("doc1", "revenue margin");
        index.index_document("doc2", "revenue margin cost headcount");
        assert!((index.avg_doc_len() - 3.0).abs() < 0.01);
    }
}
