//! Shared fixtures for the pipeline suite.

#![allow(dead_code)]

pub use ragline::{Query, Ragline, RaglineConfig, Record};
use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness writer.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// A two-page annual-report excerpt with headings, paragraphs and a table.
pub fn annual_report() -> Vec<Record> {
    vec![
        Record::new("s-fin", "Financial Results")
            .with_meta("chunk_type", "section")
            .with_meta("section_title", "Financial Results")
            .with_meta("page", 1)
            .with_meta("order", 0),
        Record::new("p-rev", "Revenue grew 12% to 4.2 billion, driven by subscription sales.")
            .with_meta("chunk_type", "paragraph")
            .with_meta("parent_section", "Financial Results")
            .with_meta("page", 1)
            .with_meta("order", 1),
        Record::new("p-margin", "Operating margin widened to 18% as hosting costs fell.")
            .with_meta("chunk_type", "paragraph")
            .with_meta("parent_section", "Financial Results")
            .with_meta("page", 1)
            .with_meta("order", 2),
        Record::new("t-seg", "Segment | Revenue\nCloud | 2.9\nLicenses | 1.3")
            .with_meta("chunk_type", "table")
            .with_meta("caption", "Table 1: Revenue by segment (billions)")
            .with_meta("page", 1)
            .with_meta("order", 3),
        Record::new("p-after", "Cloud remained the largest segment.")
            .with_meta("chunk_type", "paragraph")
            .with_meta("parent_section", "Financial Results")
            .with_meta("page", 1)
            .with_meta("order", 4),
        Record::new("s-people", "People")
            .with_meta("chunk_type", "section")
            .with_meta("section_title", "People")
            .with_meta("page", 2)
            .with_meta("order", 0),
        Record::new("p-head", "Headcount was flat at 5,400 employees.")
            .with_meta("chunk_type", "paragraph")
            .with_meta("parent_section", "People")
            .with_meta("page", 2)
            .with_meta("order", 1),
    ]
}

/// Facade over the default config with the report indexed.
pub async fn indexed() -> Ragline {
    init_tracing();
    let rag = Ragline::from_config(RaglineConfig::default()).unwrap();
    rag.index(&annual_report()).await.unwrap();
    rag
}
