//! Grade-O-Matic core: grade sheet parsing, canonical rendering, rubric
//! storage and retroactive comment replacement for CS1 lab grading.

use serde::{Deserialize, Serialize};

pub mod comment;
pub mod criterion;
pub mod diagnostics;
pub mod editor;
pub mod error;
pub mod gradesheet;
pub mod requirement;
pub mod retro;
pub mod rubric;
pub mod text;

pub use comment::Comment;
pub use criterion::{parse_criterion, Criterion};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use editor::EditSession;
pub use error::{GomError, Result};
pub use gradesheet::GradeSheet;
pub use requirement::Requirement;
pub use retro::{
    Confirm, DocumentStore, FsStore, RetroItem, RetroOutcome, RetroReport, RetroRequest,
};
pub use rubric::Rubric;

/// Widths and indents of a rendered grade sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub line_width: usize,
    /// Added to the bullet position of every parsed comment.
    pub comment_indent: usize,
    pub requirement_indent: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            line_width: comment::DEFAULT_LINE_WIDTH,
            comment_indent: 3,
            requirement_indent: requirement::DEFAULT_REQUIREMENT_INDENT,
        }
    }
}

/// Delimited rubric file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RubricFormat {
    pub delimiter: char,
    pub quote: char,
}

impl Default for RubricFormat {
    fn default() -> Self {
        Self {
            delimiter: ';',
            quote: '"',
        }
    }
}

/// Where grade sheets live and when a retroactive rewrite is allowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetroRules {
    pub gradesheet_filename: String,
    /// A rewrite is kept only if the new rendering is longer than this share
    /// of the old one.
    pub min_retained_ratio: f64,
    /// Glob patterns for entries of the grading directory that are not
    /// student directories.
    pub ignore_dirs: Vec<String>,
}

impl Default for RetroRules {
    fn default() -> Self {
        Self {
            gradesheet_filename: "GradeSheet.txt".into(),
            min_retained_ratio: 0.5,
            ignore_dirs: vec![
                "autotest".into(),
                "eph1".into(),
                "eph2".into(),
                "testing".into(),
                "README.md".into(),
                "result.html".into(),
                ".git".into(),
                ".gitignore".into(),
            ],
        }
    }
}

/// Top-level configuration, usually read from `gom.yml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub layout: Layout,
    pub rubric: RubricFormat,
    pub retro: RetroRules,
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
