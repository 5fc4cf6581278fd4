//! Grader comments: a severity/filename/text node that owns its nested
//! sub-comments, or a verbatim code block.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::criterion::{has_bullet_prefix, parse_criterion, Criterion};
use crate::diagnostics::Diagnostics;
use crate::text::{
    file_extension, format_comment, format_function_name, is_function_name, match_percent,
    standardize,
};

/// Opens and closes a verbatim code block.
pub const COMMENT_CODE: char = '`';

/// Severity marker for a header-style comment, rendered after a blank line.
pub const COMMENT_HEADER: &str = "**";

/// Line width of a rendered grade sheet.
pub const DEFAULT_LINE_WIDTH: usize = 75;

/// Two comment texts are loosely equal above this token overlap.
pub const LOOSE_MATCH_THRESHOLD: f64 = 0.8;

const TRAILING_PUNCTUATION: &[char] = &[',', '.', ':', ';', '!', '?'];

/// Byte offset of the code marker in `line`.
pub fn code_location(line: &str) -> Option<usize> {
    line.find(COMMENT_CODE)
}

/// Spaces before the bullet of a bulleted line. `None` when the line is too
/// short or carries no bullet.
pub fn bullet_indent(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    if line.chars().count() > 3 && has_bullet_prefix(trimmed) {
        Some(line.len() - line.trim_start().len())
    } else {
        None
    }
}

/// A grader comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    severity: String,
    filename: String,
    text: String,
    is_code: bool,
    indent: usize,
    subcomments: Vec<Comment>,
}

impl Comment {
    /// Parse one (possibly multi-line) comment. Code comments keep `line`
    /// verbatim; everything else is split into severity, filename and text.
    pub fn new(line: &str, is_code: bool, indent: usize, diags: &mut Diagnostics) -> Self {
        let mut comment = Comment {
            severity: String::new(),
            filename: String::new(),
            text: String::new(),
            is_code,
            indent,
            subcomments: Vec::new(),
        };
        if is_code {
            comment.text = line.to_string();
        } else {
            let (severity, filename, text) = split_comment(line, diags);
            comment.severity = severity;
            comment.set_filename(&filename);
            comment.set_text(&text);
        }
        comment
    }

    /// Parse a comment typed by hand, inferring the code flag from the code
    /// marker and the indent from the bullet position.
    pub fn from_line(line: &str) -> Self {
        let is_code = code_location(line).is_some();
        let indent = bullet_indent(line).unwrap_or(0);
        Comment::new(line, is_code, indent, &mut Diagnostics::new())
    }

    pub fn severity(&self) -> &str {
        &self.severity
    }

    pub fn set_severity(&mut self, severity: impl Into<String>) {
        self.severity = severity.into();
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Function names are normalised with [`format_function_name`]; file
    /// names are kept as given.
    pub fn set_filename(&mut self, filename: &str) {
        self.filename = if !filename.is_empty()
            && file_extension(filename).is_none()
            && is_function_name(filename)
        {
            format_function_name(filename)
        } else {
            filename.to_string()
        };
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Code text is stored verbatim, other text is whitespace-standardised.
    pub fn set_text(&mut self, text: &str) {
        self.text = if self.is_code {
            text.to_string()
        } else {
            standardize(text)
        };
    }

    pub fn is_code(&self) -> bool {
        self.is_code
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn set_indent(&mut self, indent: usize) {
        self.indent = indent;
    }

    pub fn is_header(&self) -> bool {
        self.severity.contains(COMMENT_HEADER)
    }

    pub fn subcomments(&self) -> &[Comment] {
        &self.subcomments
    }

    pub fn subcomments_mut(&mut self) -> &mut Vec<Comment> {
        &mut self.subcomments
    }

    pub fn set_subcomments(&mut self, subcomments: Vec<Comment>) {
        self.subcomments = subcomments;
    }

    pub fn add_subcomment(&mut self, comment: Comment) {
        self.subcomments.push(comment);
    }

    /// Remove and return the sub-comment at `index`, if it exists.
    pub fn pop_subcomment(&mut self, index: usize) -> Option<Comment> {
        (index < self.subcomments.len()).then(|| self.subcomments.remove(index))
    }

    pub fn pop_last_subcomment(&mut self) -> Option<Comment> {
        self.subcomments.pop()
    }

    /// Re-parse severity, filename and text from `line`, keeping indent and
    /// sub-comments.
    pub fn set_from_line(&mut self, line: &str, diags: &mut Diagnostics) {
        self.is_code = code_location(line).is_some();
        if self.is_code {
            self.severity.clear();
            self.filename.clear();
            self.text = line.to_string();
            return;
        }
        let (severity, filename, text) = split_comment(line, diags);
        self.severity = severity;
        self.set_filename(&filename);
        self.set_text(&text);
    }

    /// Render within `line_width` columns, sub-comments on the lines below.
    pub fn render(&self, line_width: usize) -> String {
        if self.is_code {
            return self.text.clone();
        }

        let mut line = String::new();
        if !self.severity.is_empty() {
            line.push_str(&self.severity);
            line.push(' ');
        }
        if !self.filename.is_empty() {
            line.push_str(&self.filename);
            line.push_str(": ");
        }
        line.push_str(&self.text);

        let mut out = format_comment(&line, line_width.saturating_sub(self.indent), self.indent);
        if self.is_header() {
            out = format!("\n{}", out.trim_start());
        }
        for sub in &self.subcomments {
            out.push('\n');
            out.push_str(&sub.render(line_width));
        }
        out
    }

    /// Character length of the default rendering, sub-comments included.
    pub fn rendered_len(&self) -> usize {
        self.to_string().chars().count()
    }

    /// Word-overlap comparison of the texts, ignoring severity, filename and
    /// whitespace.
    pub fn loose_eq(&self, other: &Comment) -> bool {
        self.loose_eq_text(&other.text)
    }

    pub fn loose_eq_text(&self, text: &str) -> bool {
        match_percent(text, &self.text) > LOOSE_MATCH_THRESHOLD
    }

    /// Exact comparison against a rubric criterion. A header matches a
    /// comment with no severity or filename and the same text.
    pub fn matches_criterion(&self, criterion: &Criterion) -> bool {
        match criterion {
            Criterion::Header { text } => {
                self.severity.is_empty() && self.filename.is_empty() && self.text == *text
            }
            Criterion::Item {
                severity,
                filename,
                text,
            } => self.severity == *severity && self.filename == *filename && self.text == *text,
        }
    }
}

impl PartialEq for Comment {
    fn eq(&self, other: &Self) -> bool {
        self.severity == other.severity
            && self.filename == other.filename
            && self.text == other.text
    }
}

impl fmt::Display for Comment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(DEFAULT_LINE_WIDTH))
    }
}

/// Split a comment line into severity, filename and text.
///
/// Lines carrying the code marker are returned whole as text. When a
/// severity is present but no leading filename, the first three words of the
/// text are searched for a file or function name.
pub fn split_comment(line: &str, diags: &mut Diagnostics) -> (String, String, String) {
    if code_location(line).is_some() {
        return (String::new(), String::new(), line.to_string());
    }

    let (severity, mut filename, text) = match parse_criterion(line, diags) {
        None => return (String::new(), String::new(), line.trim().to_string()),
        Some(Criterion::Header { text }) => return (String::new(), String::new(), text),
        Some(Criterion::Item {
            severity,
            filename,
            text,
        }) => (severity, filename, text),
    };

    if !severity.is_empty() && filename.is_empty() {
        for term in text.split_whitespace().take(3) {
            let term = term.trim_end_matches(TRAILING_PUNCTUATION);
            if file_extension(term).is_some() {
                filename = term.to_string();
            } else if is_function_name(term) {
                filename = format_function_name(term);
            }
        }
    }
    (severity, filename, text)
}
