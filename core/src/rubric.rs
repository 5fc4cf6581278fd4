//! Rubric store: an ordered list of criteria and section headers, read from
//! and written to a delimiter-separated file.
//!
//! The file format follows spreadsheet exports. A quote opens a quoted cell
//! only at the start of a cell, a doubled quote inside a quoted cell is a
//! literal quote, and quoted cells may span lines. Hand-edited rubrics also
//! use a looser convention for multi-line criteria: an unquoted criterion
//! cell with a stray quote continues on the following rows until a row
//! containing the closing quote. Quoted cells are taken verbatim, so a saved
//! rubric always reads back unchanged.

use std::{fmt, fs, io, path::Path};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::comment::COMMENT_CODE;
use crate::criterion::{parse_criterion, Criterion};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{GomError, Result};
use crate::RubricFormat;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Ordered rubric criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Rubric {
    criteria: Vec<Criterion>,
}

impl Rubric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a rubric from criterion lines, skipping lines too short to be a
    /// header.
    pub fn from_lines<S: AsRef<str>>(lines: &[S], diags: &mut Diagnostics) -> Self {
        let mut rubric = Rubric::new();
        for line in lines {
            rubric.add_line(line.as_ref(), diags);
        }
        rubric
    }

    /// Parse a delimited rubric file's contents.
    pub fn from_delimited(text: &str, format: &RubricFormat, diags: &mut Diagnostics) -> Self {
        let rows = read_rows(text, format, diags);
        Rubric {
            criteria: assemble_criteria(rows, format.quote, diags),
        }
    }

    /// Load a rubric file. A missing file is [`GomError::RubricNotFound`].
    pub fn load(path: &Path, format: &RubricFormat, diags: &mut Diagnostics) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => GomError::RubricNotFound(path.to_path_buf()),
            _ => GomError::io(path, e),
        })?;
        let rubric = Rubric::from_delimited(&text, format, diags);
        tracing::info!(path = %path.display(), criteria = rubric.len(), "loaded rubric");
        Ok(rubric)
    }

    /// Overwrite `path` with this rubric.
    pub fn save(&self, path: &Path, format: &RubricFormat) -> Result<()> {
        fs::write(path, self.write_delimited(format)).map_err(|e| GomError::io(path, e))
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn add_criterion(&mut self, criterion: Criterion) {
        self.criteria.push(criterion);
    }

    /// Parse and append one criterion line. Returns whether anything was added.
    pub fn add_line(&mut self, line: &str, diags: &mut Diagnostics) -> bool {
        match parse_criterion(line, diags) {
            Some(criterion) => {
                self.criteria.push(criterion);
                true
            }
            None => false,
        }
    }

    /// Append already-split fields: one field is a header, two fields get an
    /// empty filename, three are used as-is.
    pub fn add_fields<S: AsRef<str>>(&mut self, fields: &[S], diags: &mut Diagnostics) -> bool {
        match Criterion::from_fields(fields) {
            Some(criterion) => {
                self.criteria.push(criterion);
                true
            }
            None => {
                let shown: Vec<&str> = fields.iter().map(|f| f.as_ref()).collect();
                diags.push(
                    DiagnosticKind::RubricRow,
                    format!("ignoring criterion with {} fields: {shown:?}", fields.len()),
                );
                false
            }
        }
    }

    pub fn extend<I: IntoIterator<Item = Criterion>>(&mut self, criteria: I) {
        self.criteria.extend(criteria);
    }

    /// Criteria joined by `delimiter`, one per line, without quoting.
    pub fn to_delimited(&self, delimiter: char) -> String {
        self.criteria
            .iter()
            .map(|c| c.to_delimited(delimiter))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// File contents with cells quoted where the format requires it.
    pub fn write_delimited(&self, format: &RubricFormat) -> String {
        let mut out = String::new();
        for criterion in &self.criteria {
            for (i, field) in criterion.fields().into_iter().enumerate() {
                if i > 0 {
                    out.push(format.delimiter);
                }
                write_cell(&mut out, field, format);
            }
            out.push('\n');
        }
        out
    }
}

/// Tab-separated, for display.
impl fmt::Display for Rubric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_delimited('\t'))
    }
}

impl<'a> IntoIterator for &'a Rubric {
    type Item = &'a Criterion;
    type IntoIter = std::slice::Iter<'a, Criterion>;

    fn into_iter(self) -> Self::IntoIter {
        self.criteria.iter()
    }
}

/// Lab number in a rubric path: the last run of digits, e.g. `01` for
/// `rubrics/rubric01.csv`.
pub fn lab_number_from_path(path: &Path) -> Option<String> {
    let path = path.to_string_lossy();
    DIGITS
        .find_iter(&path)
        .last()
        .map(|m| m.as_str().to_string())
}

fn write_cell(out: &mut String, field: &str, format: &RubricFormat) {
    let needs_quotes = field.contains(format.delimiter)
        || field.contains(format.quote)
        || field.contains('\n')
        || field.contains('\r')
        || field != field.trim();
    if !needs_quotes {
        out.push_str(field);
        return;
    }
    out.push(format.quote);
    for ch in field.chars() {
        if ch == format.quote {
            out.push(format.quote);
        }
        out.push(ch);
    }
    out.push(format.quote);
}

/// One cell of a delimited row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Cell {
    text: String,
    /// Read with spreadsheet quoting.
    quoted: bool,
}

impl Cell {
    /// Quoted cells are kept as written; others go through `trim`.
    fn trimmed<'a>(&'a self, trim: fn(&'a str) -> &'a str) -> &'a str {
        if self.quoted {
            &self.text
        } else {
            trim(&self.text)
        }
    }

    fn has_stray(&self, quote: char) -> bool {
        !self.quoted && self.text.contains(quote)
    }
}

fn take_cell(text: &mut String, quoted: &mut bool) -> Cell {
    Cell {
        text: std::mem::take(text),
        quoted: std::mem::take(quoted),
    }
}

/// Split file contents into rows of cells. Blank lines produce no row.
fn read_rows(text: &str, format: &RubricFormat, diags: &mut Diagnostics) -> Vec<Vec<Cell>> {
    let (delimiter, quote) = (format.delimiter, format.quote);
    let mut rows = Vec::new();
    let mut row: Vec<Cell> = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut cell_start = true;
    let mut touched = false;

    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == quote {
                if chars.peek() == Some(&quote) {
                    cell.push(quote);
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                cell.push(ch);
            }
            continue;
        }
        match ch {
            '\r' => {}
            '\n' => {
                if touched {
                    row.push(take_cell(&mut cell, &mut quoted));
                    rows.push(std::mem::take(&mut row));
                }
                cell_start = true;
                touched = false;
            }
            _ if ch == delimiter => {
                row.push(take_cell(&mut cell, &mut quoted));
                cell_start = true;
                touched = true;
            }
            _ if ch == quote && cell_start => {
                in_quotes = true;
                quoted = true;
                cell_start = false;
                touched = true;
            }
            _ => {
                cell.push(ch);
                cell_start = false;
                touched = true;
            }
        }
    }
    if in_quotes {
        diags.push(
            DiagnosticKind::UnterminatedQuote,
            "quoted rubric cell runs to the end of the file",
        );
    }
    if touched {
        row.push(Cell { text: cell, quoted });
        rows.push(row);
    }
    rows
}

struct OpenCriterion {
    severity: String,
    filename: String,
    text: String,
}

impl OpenCriterion {
    fn close(self, quote: char) -> Criterion {
        Criterion::item(self.severity, self.filename, self.text.replace(quote, ""))
    }
}

/// Turn rows into criteria, joining multi-line criteria.
fn assemble_criteria(rows: Vec<Vec<Cell>>, quote: char, diags: &mut Diagnostics) -> Vec<Criterion> {
    let mut criteria = Vec::new();
    let mut open: Option<OpenCriterion> = None;

    for row in rows {
        if row.len() == 3 && row[2].has_stray(quote) {
            if let Some(prev) = open.take() {
                diags.push(
                    DiagnosticKind::UnterminatedQuote,
                    format!("criterion `{}` is never closed", prev.text),
                );
                criteria.push(prev.close(quote));
            }
            let text = if row[2].text.contains(COMMENT_CODE) {
                row[2].text.clone()
            } else {
                row[2].text.trim_start().to_string()
            };
            let started = OpenCriterion {
                severity: row[0].trimmed(str::trim_end).to_string(),
                filename: row[1].trimmed(str::trim_start).to_string(),
                text,
            };
            if started.text.matches(quote).count() >= 2 {
                criteria.push(started.close(quote));
            } else {
                open = Some(started);
            }
        } else if let Some(mut current) = open.take() {
            let line = row
                .iter()
                .map(|cell| cell.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            current.text.push('\n');
            current.text.push_str(&line);
            if row.iter().any(|cell| cell.has_stray(quote)) {
                criteria.push(current.close(quote));
            } else {
                open = Some(current);
            }
        } else {
            match row.as_slice() {
                [severity, filename, text] => criteria.push(Criterion::item(
                    severity.trimmed(str::trim_end),
                    filename.trimmed(str::trim_start),
                    text.trimmed(str::trim),
                )),
                [severity, text] => criteria.push(Criterion::item(
                    severity.trimmed(str::trim_end),
                    "",
                    text.trimmed(str::trim),
                )),
                [header] if !header.text.trim().is_empty() => {
                    criteria.push(Criterion::header(header.text.as_str()))
                }
                [_] => {}
                _ => {
                    let texts: Vec<&str> = row.iter().map(|cell| cell.text.as_str()).collect();
                    diags.push(
                        DiagnosticKind::RubricRow,
                        format!("ignoring rubric row with {} cells: {texts:?}", row.len()),
                    )
                }
            }
        }
    }

    if let Some(prev) = open {
        diags.push(
            DiagnosticKind::UnterminatedQuote,
            format!("criterion `{}` runs to the end of the file", prev.text),
        );
        criteria.push(prev.close(quote));
    }
    criteria
}
