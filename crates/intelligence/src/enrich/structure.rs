//! Structural side table over the full indexed corpus
//!
//! Records are grouped by their `page` metadata and ordered within a page
//! by `order` (then id). Records without a `page` are kept by id but have
//! no neighbours.
//!
//! Recognised metadata keys:
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `page` | Grouping key (any JSON scalar) |
//! | `chunk_type` | `section`, `table` or `paragraph` (default) |
//! | `order` | Position within the page |
//! | `section_title` | Heading text of a section chunk |
//! | `parent_section` | Title of the enclosing section |
//! | `caption` | Table caption |

use ragline_core::{Metadata, Record};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

// ============================================================================
// ChunkKind
// ============================================================================

/// Structural type of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Section heading
    Section,
    /// Table
    Table,
    /// Body paragraph (default for unknown types)
    Paragraph,
}

impl ChunkKind {
    /// Read `chunk_type` from metadata
    pub fn from_metadata(metadata: &Metadata) -> Self {
        match metadata.get("chunk_type").and_then(|v| v.as_str()) {
            Some(t) if t.eq_ignore_ascii_case("section") || t.eq_ignore_ascii_case("heading") => {
                ChunkKind::Section
            }
            Some(t) if t.eq_ignore_ascii_case("table") => ChunkKind::Table,
            _ => ChunkKind::Paragraph,
        }
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Section => "section",
            ChunkKind::Table => "table",
            ChunkKind::Paragraph => "paragraph",
        }
    }
}

// ============================================================================
// StructNode
// ============================================================================

/// One record as seen by the structure index
#[derive(Debug, Clone)]
pub struct StructNode {
    /// Record id
    pub id: String,
    /// Structural type
    pub kind: ChunkKind,
    /// Content
    pub content: String,
    /// `section_title` metadata
    pub section_title: Option<String>,
    /// `parent_section` metadata
    pub parent_section: Option<String>,
    /// `caption` metadata
    pub caption: Option<String>,
    order: Option<f64>,
    page: Option<String>,
}

fn meta_str(metadata: &Metadata, key: &str) -> Option<String> {
    metadata
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn page_key(metadata: &Metadata) -> Option<String> {
    match metadata.get("page")? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(
            n.as_f64()
                .map(|f| f.to_string())
                .unwrap_or_else(|| n.to_string()),
        ),
        other => Some(other.to_string()),
    }
}

impl StructNode {
    fn from_record(record: &Record) -> Self {
        StructNode {
            id: record.id.clone(),
            kind: ChunkKind::from_metadata(&record.metadata),
            content: record.content.clone(),
            section_title: meta_str(&record.metadata, "section_title"),
            parent_section: meta_str(&record.metadata, "parent_section"),
            caption: meta_str(&record.metadata, "caption"),
            order: record.metadata.get("order").and_then(|v| v.as_f64()),
            page: page_key(&record.metadata),
        }
    }

    /// Heading text of a section chunk: its title, else its content
    pub fn heading_text(&self) -> &str {
        self.section_title.as_deref().unwrap_or(&self.content)
    }
}

fn cmp_nodes(a: &StructNode, b: &StructNode) -> Ordering {
    match (a.order, b.order) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

// ============================================================================
// StructureIndex
// ============================================================================

/// Page-ordered view of the corpus for neighbour/parent/child lookups
#[derive(Debug, Default)]
pub struct StructureIndex {
    nodes: HashMap<String, StructNode>,
    /// page -> ids in document order
    pages: HashMap<String, Vec<String>>,
    /// id -> position in its page
    positions: HashMap<String, usize>,
}

impl StructureIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a full corpus
    pub fn build(records: &[Record]) -> Self {
        let mut index = Self::new();
        index.upsert(records);
        index
    }

    /// Add or replace records, then re-derive page order
    pub fn upsert(&mut self, records: &[Record]) {
        for record in records {
            self.nodes
                .insert(record.id.clone(), StructNode::from_record(record));
        }
        self.rebuild_pages();
    }

    fn rebuild_pages(&mut self) {
        let mut pages: HashMap<String, Vec<&StructNode>> = HashMap::new();
        for node in self.nodes.values() {
            if let Some(page) = &node.page {
                pages.entry(page.clone()).or_default().push(node);
            }
        }

        self.pages.clear();
        self.positions.clear();
        for (page, mut nodes) in pages {
            nodes.sort_by(|a, b| cmp_nodes(a, b));
            for (pos, node) in nodes.iter().enumerate() {
                self.positions.insert(node.id.clone(), pos);
            }
            self.pages
                .insert(page, nodes.into_iter().map(|n| n.id.clone()).collect());
        }
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.pages.clear();
        self.positions.clear();
    }

    /// Number of records known
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by id
    pub fn get(&self, id: &str) -> Option<&StructNode> {
        self.nodes.get(id)
    }

    fn page_of(&self, id: &str) -> Option<(&[String], usize)> {
        let node = self.nodes.get(id)?;
        let ids = self.pages.get(node.page.as_ref()?)?;
        let pos = *self.positions.get(id)?;
        Some((ids.as_slice(), pos))
    }

    /// Up to `n` paragraphs before `id` on its page, nearest last
    pub fn paragraphs_before(&self, id: &str, n: usize) -> Vec<&StructNode> {
        let Some((ids, pos)) = self.page_of(id) else {
            return Vec::new();
        };
        let mut out: Vec<&StructNode> = ids[..pos]
            .iter()
            .rev()
            .filter_map(|i| self.nodes.get(i))
            .filter(|n| n.kind == ChunkKind::Paragraph)
            .take(n)
            .collect();
        out.reverse();
        out
    }

    /// Up to `n` paragraphs after `id` on its page, nearest first
    pub fn paragraphs_after(&self, id: &str, n: usize) -> Vec<&StructNode> {
        let Some((ids, pos)) = self.page_of(id) else {
            return Vec::new();
        };
        ids[pos + 1..]
            .iter()
            .filter_map(|i| self.nodes.get(i))
            .filter(|n| n.kind == ChunkKind::Paragraph)
            .take(n)
            .collect()
    }

    /// Up to `n` paragraphs following a section heading, stopping at the
    /// next section on the same page
    pub fn child_paragraphs(&self, id: &str, n: usize) -> Vec<&StructNode> {
        let Some((ids, pos)) = self.page_of(id) else {
            return Vec::new();
        };
        ids[pos + 1..]
            .iter()
            .filter_map(|i| self.nodes.get(i))
            .take_while(|n| n.kind != ChunkKind::Section)
            .filter(|n| n.kind == ChunkKind::Paragraph)
            .take(n)
            .collect()
    }

    /// Heading text of the section enclosing `id`.
    ///
    /// Uses `parent_section` when present (resolved to a section chunk's
    /// title if one matches); otherwise the nearest preceding section on the
    /// same page. A section chunk is never its own parent.
    pub fn parent_heading(&self, id: &str) -> Option<String> {
        let node = self.nodes.get(id)?;

        if let Some(parent) = &node.parent_section {
            if node.section_title.as_deref() != Some(parent.as_str()) {
                return Some(parent.clone());
            }
        }

        if node.kind == ChunkKind::Section {
            return None;
        }
        let (ids, pos) = self.page_of(id)?;
        ids[..pos]
            .iter()
            .rev()
            .filter_map(|i| self.nodes.get(i))
            .find(|n| n.kind == ChunkKind::Section)
            .map(|n| n.heading_text().to_string())
    }
}
