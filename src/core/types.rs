use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Which markup shape a text fragment was harvested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Paragraph,
    Span,
    TableRow,
    Generic,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Paragraph => write!(f, "paragraph"),
            SourceKind::Span => write!(f, "span"),
            SourceKind::TableRow => write!(f, "table-row"),
            SourceKind::Generic => write!(f, "generic"),
        }
    }
}

/// One classification unit for the token taggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub raw_text: String,
    pub cleaned_tokens: Vec<String>,
    pub source_kind: SourceKind,
}

impl TextFragment {
    pub fn joined(&self) -> String {
        self.cleaned_tokens.join(" ")
    }
}

/// A statement table squared off into a header and equally wide rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReconstructedTable {
    pub fn width(&self) -> usize {
        self.header.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() || self.rows.is_empty()
    }

    pub fn is_rectangular(&self) -> bool {
        self.rows.iter().all(|row| row.len() == self.header.len())
    }
}

/// One line of the raw row dump: the joined row text plus `{value: provisionalLabel}` cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow(pub String, pub Vec<BTreeMap<String, String>>);

impl RawRow {
    pub fn context(&self) -> &str {
        &self.0
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.1.iter().flat_map(|cell| cell.keys().map(String::as_str))
    }
}

/// A data cell of a statement table together with the words that explain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualCell {
    pub composite_key: String,
    pub source_value: String,
    pub statement_name: String,
    pub column_name: String,
}

/// A piece of literal document text and the label it should carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagAssignment {
    pub matched_text: String,
    pub tag_label: String,
}

impl TagAssignment {
    pub fn new(matched_text: impl Into<String>, tag_label: impl Into<String>) -> Self {
        Self {
            matched_text: matched_text.into(),
            tag_label: tag_label.into(),
        }
    }
}

/// Keeps the first assignment for every matched text and drops one-character matches.
pub fn dedup_assignments(assignments: Vec<TagAssignment>) -> Vec<TagAssignment> {
    let mut seen = HashSet::new();
    assignments
        .into_iter()
        .filter(|a| a.matched_text.chars().count() > 1)
        .filter(|a| seen.insert(a.matched_text.clone()))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub predicted: usize,
    pub applied: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub cover: SectionSummary,
    pub tables: SectionSummary,
    pub notes: SectionSummary,
    pub unsegmentable: bool,
    pub tables_detected: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TOTAL TAGS: cover {}/{}, tables {}/{}, notes {}/{}",
            self.cover.applied,
            self.cover.predicted,
            self.tables.applied,
            self.tables.predicted,
            self.notes.applied,
            self.notes.predicted
        )
    }
}
