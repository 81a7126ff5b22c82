//! Search backends for Ragline
//!
//! This crate provides:
//! - SearchBackend trait: the capability the orchestrator fans out to
//! - LexicalBackend: inverted index + BM25 with field boosting
//! - VectorBackend: brute-force cosine similarity over embeddings
//! - Embedder trait with HashingEmbedder and IpcEmbedder
//! - Locale-aware tokenizer (UAX#29 words, CJK bigrams)
//!
//! # Usage
//!
//! ```
//! use ragline_core::{Query, Record};
//! use ragline_search::{LexicalBackend, SearchBackend};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let lexical = LexicalBackend::new();
//! lexical.index(&[Record::new("c1", "Revenue grew 12%")]).await.unwrap();
//! let hits = lexical.search(&Query::new("revenue", 5)).await.unwrap();
//! assert_eq!(hits[0].id, "c1");
//! # });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod distance;
pub mod embed;
pub mod error;
pub mod index;
pub mod lexical;
pub mod scorer;
pub mod tokenizer;
pub mod vector;

pub use backend::{rank_hits, SearchBackend};
pub use embed::{Embedder, HashingEmbedder, IpcEmbedder};
pub use error::{BackendError, EmbedError};
pub use index::{InvertedIndex, PostingEntry, PostingList};
pub use lexical::{LexicalBackend, LEXICAL_BACKEND};
pub use scorer::Bm25Scorer;
pub use tokenizer::{tokenize, tokenize_unique};
pub use vector::{VectorBackend, VECTOR_BACKEND};
