//! Structured records for recoverable parse anomalies.
//!
//! Nothing in the parsers fails on malformed input. Instead each assumption
//! made along the way is pushed onto a [`Diagnostics`] collector, which keeps
//! the record for the caller and mirrors it to the `tracing` stream.

use serde::{Deserialize, Serialize};

/// Kind of anomaly encountered while parsing or patching.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    MissingTitle,
    MissingRequirements,
    MissingGrade,
    MissingComments,
    OrphanRequirement,
    EmptyComments,
    UnparsedCommentLine,
    UnterminatedCode,
    HeaderLine,
    DroppedLine,
    RubricRow,
    UnterminatedQuote,
    MissingTarget,
    DataLoss,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiagnosticKind::MissingTitle => "missing-title",
            DiagnosticKind::MissingRequirements => "missing-requirements",
            DiagnosticKind::MissingGrade => "missing-grade",
            DiagnosticKind::MissingComments => "missing-comments",
            DiagnosticKind::OrphanRequirement => "orphan-requirement",
            DiagnosticKind::EmptyComments => "empty-comments",
            DiagnosticKind::UnparsedCommentLine => "unparsed-comment-line",
            DiagnosticKind::UnterminatedCode => "unterminated-code",
            DiagnosticKind::HeaderLine => "header-line",
            DiagnosticKind::DroppedLine => "dropped-line",
            DiagnosticKind::RubricRow => "rubric-row",
            DiagnosticKind::UnterminatedQuote => "unterminated-quote",
            DiagnosticKind::MissingTarget => "missing-target",
            DiagnosticKind::DataLoss => "data-loss",
        };
        f.write_str(name)
    }
}

/// A single anomaly and the assumption made to recover from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Ordered collector of diagnostics for one operation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an anomaly. The record is also logged at `warn` level.
    pub fn push(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(kind = %kind, "{message}");
        self.items.push(Diagnostic { kind, message });
    }

    pub fn has(&self, kind: DiagnosticKind) -> bool {
        self.items.iter().any(|d| d.kind == kind)
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.items.iter().filter(|d| d.kind == kind).count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
