//! End-to-end pipeline tests
//!
//! Drive the `Ragline` facade over a small structured corpus: indexing,
//! orchestrated search, enrichment, caching and the adaptive loop.

mod common;

mod adaptive;
mod config;
mod search;
