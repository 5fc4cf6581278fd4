//! Rubric criteria and the single-line parser shared by the rubric and the
//! grade-sheet comment parser.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::text::{file_extension, is_function_name, standardize};

/// Characters that mark a bullet or severity when found in the first three
/// non-space characters of a line.
pub const COMMENT_BULLETS: &str = ".*+-~?())@";

/// A rubric entry: either a section header or a severity/filename/text triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Criterion {
    Header {
        text: String,
    },
    Item {
        severity: String,
        filename: String,
        text: String,
    },
}

impl Criterion {
    pub fn header(text: impl Into<String>) -> Self {
        Criterion::Header { text: text.into() }
    }

    pub fn item(
        severity: impl Into<String>,
        filename: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Criterion::Item {
            severity: severity.into(),
            filename: filename.into(),
            text: text.into(),
        }
    }

    /// Build from already-split fields. One field is a header, two fields are
    /// severity and text with an empty filename, three fields are used as-is.
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Option<Self> {
        match fields {
            [header] => Some(Criterion::header(header.as_ref())),
            [severity, text] => Some(Criterion::item(severity.as_ref(), "", text.as_ref())),
            [severity, filename, text] => Some(Criterion::item(
                severity.as_ref(),
                filename.as_ref(),
                text.as_ref(),
            )),
            _ => None,
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self, Criterion::Header { .. })
    }

    /// The text part: the header itself, or the criterion body.
    pub fn text(&self) -> &str {
        match self {
            Criterion::Header { text } => text,
            Criterion::Item { text, .. } => text,
        }
    }

    /// Fields in file order, one for headers and three for items.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Criterion::Header { text } => vec![text.as_str()],
            Criterion::Item {
                severity,
                filename,
                text,
            } => vec![severity.as_str(), filename.as_str(), text.as_str()],
        }
    }

    /// Join the fields with `delimiter`.
    pub fn to_delimited(&self, delimiter: char) -> String {
        let mut buf = [0u8; 4];
        self.fields().join(delimiter.encode_utf8(&mut buf))
    }
}

/// Renders the criterion the way it is appended to a grade sheet:
/// `severity filename: text`.
impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Header { text } => f.write_str(text),
            Criterion::Item {
                severity,
                filename,
                text,
            } => {
                let mut parts: Vec<String> = Vec::with_capacity(3);
                if !severity.is_empty() {
                    parts.push(severity.clone());
                }
                if !filename.is_empty() {
                    parts.push(format!("{filename}:"));
                }
                parts.push(text.clone());
                f.write_str(&parts.join(" "))
            }
        }
    }
}

/// Whether the first three non-space characters contain a bullet character.
pub fn has_bullet_prefix(line: &str) -> bool {
    line.trim_start()
        .chars()
        .take(3)
        .any(|c| COMMENT_BULLETS.contains(c))
}

/// Whether the first word is a marker on its own, such as `-`, `++`, `1.` or
/// `(2)`. Words like `(see` or `e.g.` only contain bullet characters.
pub fn starts_with_marker(line: &str) -> bool {
    line.split_whitespace().next().is_some_and(|token| {
        token
            .chars()
            .all(|c| c.is_ascii_digit() || COMMENT_BULLETS.contains(c))
            && token.chars().any(|c| COMMENT_BULLETS.contains(c))
    })
}

/// Split one line into its severity, filename and text.
///
/// A line without an interior space is a header; headers of three characters
/// or fewer are noise and yield `None`. Otherwise the leading run of
/// non-space characters is the severity when it carries a bullet, and the
/// first following word is the filename when it looks like a file or
/// function name.
pub fn parse_criterion(line: &str, diags: &mut Diagnostics) -> Option<Criterion> {
    let sline = line.trim_end();

    if !sline.trim().contains(' ') {
        diags.push(
            DiagnosticKind::HeaderLine,
            format!("interpreting `{sline}` as a header"),
        );
        return (sline.chars().count() > 3).then(|| Criterion::header(sline));
    }

    let lead = sline.len() - sline.trim_start().len();
    // An interior space exists, so one follows the leading whitespace.
    let first_space = sline[lead..].find(' ').map_or(sline.len(), |p| lead + p);

    let mut severity = String::new();
    let mut start = 0usize;
    if has_bullet_prefix(sline) {
        severity = sline[..first_space].trim_end().to_string();
        start = (first_space + 1).min(sline.len());
    }

    let body = &sline[start..];
    let mut filename = String::new();
    let mut text = body.to_string();
    if let Some(first_term) = body.split_whitespace().next() {
        let end = if let Some(ext) = file_extension(first_term) {
            body.find(ext).map(|p| p + ext.len())
        } else if is_function_name(first_term) {
            body.find(first_term).map(|p| p + first_term.len())
        } else {
            None
        };
        if let Some(end) = end {
            filename = body[..end].trim().to_string();
            text = body[end..].trim().to_string();
        }
    }

    if let Some(rest) = text.strip_prefix(':') {
        text = rest.trim_start().to_string();
    } else if let Some(stripped) = filename.strip_suffix(':') {
        filename = stripped.to_string();
    }

    Some(Criterion::Item {
        severity,
        filename,
        text: standardize(&text),
    })
}
