//! Grade sheet documents.
//!
//! A grade sheet is a loosely structured text file with four sections in a
//! fixed order: a title line, the lab requirements, the grade line and the
//! grader comments. Parsing never fails. Missing section headers are
//! synthesised in place, unexpected lines are dropped, and every assumption
//! is recorded in the caller's [`Diagnostics`].

use std::{collections::HashSet, fmt, fs, path::Path};

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::comment::{bullet_indent, code_location, Comment, COMMENT_CODE};
use crate::criterion::{has_bullet_prefix, starts_with_marker};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{GomError, Result};
use crate::requirement::Requirement;
use crate::text::{is_code_reference, leading_whitespace, split_sentences, PROSE_DELIMITERS};
use crate::Layout;

pub const TITLE_TEXT: &str = "GRADE SHEET FOR CS1 LAB";
/// Title variant without the space in "GRADE SHEET".
pub const TITLE_TEXT_COMPACT: &str = "GRADESHEET FOR CS1 LAB";
pub const REQUIREMENTS_TEXT: &str = "Requirements of this lab";
pub const GRADE_TEXT: &str = "Grade";
/// Grade line prefix, with the spacing the value is written after.
pub const GRADE_LINE: &str = "Grade:   ";
pub const COMMENTS_TEXT: &str = "Comments from Graders";

/// Width of the lab number slot after the title. Lab numbers of three or
/// more digits do not fit.
pub const LAB_NUMBER_WIDTH: usize = 2;

const TITLE_ANCHOR: &str = "GRADE";

static SECTION_MARKERS: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostFirst)
        .build([REQUIREMENTS_TEXT, GRADE_TEXT, COMMENTS_TEXT])
});

static POSITIVE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "good",
        "great",
        "nice",
        "neat",
        "awesome",
        "wonderful",
        "correct",
    ]
    .into_iter()
    .collect()
});

static SUMMARY_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["summary", "overall", "otherwise", "conclusion"]
        .into_iter()
        .collect()
});

/// Section headers located by pattern index in [`SECTION_MARKERS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Requirements = 0,
    Grade = 1,
    Comments = 2,
}

/// A parsed grade sheet.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GradeSheet {
    lab_number: String,
    description: String,
    requirements: Vec<Requirement>,
    grade: String,
    comments: Vec<Comment>,
}

impl GradeSheet {
    pub fn new(
        lab_number: impl Into<String>,
        description: impl Into<String>,
        requirements: Vec<Requirement>,
        grade: impl Into<String>,
        comments: Vec<Comment>,
    ) -> Self {
        GradeSheet {
            lab_number: lab_number.into(),
            description: description.into(),
            requirements,
            grade: grade.into(),
            comments,
        }
    }

    /// Parse a whole grade sheet.
    pub fn parse(text: &str, layout: &Layout, diags: &mut Diagnostics) -> Self {
        let mut text = text.replace("\r\n", "\n");

        let (title_start, lab_number, description) = match text.find(TITLE_ANCHOR) {
            Some(start) => {
                let title = &text[start..line_end(&text, start)];
                (start, lab_number(title), lab_description(title))
            }
            None => {
                diags.push(
                    DiagnosticKind::MissingTitle,
                    format!("no `{TITLE_TEXT}` title found, adding one"),
                );
                text.insert_str(0, &format!("{TITLE_TEXT}\n"));
                (0, String::new(), String::new())
            }
        };
        let title_end = line_end(&text, title_start);

        let requirements_start = match find_section(&text, Section::Requirements, 0) {
            Some(start) => start,
            None => {
                diags.push(
                    DiagnosticKind::MissingRequirements,
                    format!("no `{REQUIREMENTS_TEXT}:` header found, adding one after the title"),
                );
                text.insert_str(title_end, &format!("\n{REQUIREMENTS_TEXT}:"));
                title_end + 1
            }
        };
        let requirements_end = line_end(&text, requirements_start);

        let grade_start = match find_section(&text, Section::Grade, requirements_end) {
            Some(start) => start,
            None => {
                diags.push(
                    DiagnosticKind::MissingGrade,
                    format!("no `{GRADE_TEXT}:` line found, adding an empty one"),
                );
                match find_section(&text, Section::Comments, requirements_end) {
                    Some(comments) => {
                        text.insert_str(comments, &format!("{GRADE_LINE}\n"));
                        comments
                    }
                    None => {
                        if !text.ends_with('\n') {
                            text.push('\n');
                        }
                        let start = text.len();
                        text.push_str(GRADE_LINE);
                        start
                    }
                }
            }
        };
        let grade_end = line_end(&text, grade_start);

        let comments_start = match find_section(&text, Section::Comments, grade_end) {
            Some(start) => start,
            None => {
                diags.push(
                    DiagnosticKind::MissingComments,
                    format!("no `{COMMENTS_TEXT}:` header found, adding one after the grade"),
                );
                text.insert_str(grade_end, &format!("\n{COMMENTS_TEXT}:"));
                grade_end + 1
            }
        };

        let requirements_text = text[requirements_end..grade_start]
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");

        GradeSheet {
            lab_number,
            description,
            requirements: parse_requirements(&requirements_text, diags),
            grade: grade_value(&text[grade_start..grade_end]),
            comments: parse_comments(text[comments_start..].trim(), layout.comment_indent, diags),
        }
    }

    pub fn read_file(path: &Path, layout: &Layout, diags: &mut Diagnostics) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| GomError::io(path, e))?;
        Ok(GradeSheet::parse(&text, layout, diags))
    }

    /// Overwrite `path` with the rendered grade sheet.
    pub fn write_file(&self, path: &Path, layout: &Layout) -> Result<()> {
        fs::write(path, self.render(layout)).map_err(|e| GomError::io(path, e))
    }

    pub fn lab_number(&self) -> &str {
        &self.lab_number
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn requirements_mut(&mut self) -> &mut Vec<Requirement> {
        &mut self.requirements
    }

    pub fn grade(&self) -> &str {
        &self.grade
    }

    pub fn set_grade(&mut self, grade: impl Into<String>) {
        self.grade = grade.into();
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn comments_mut(&mut self) -> &mut Vec<Comment> {
        &mut self.comments
    }

    pub fn set_comments(&mut self, comments: Vec<Comment>) {
        self.comments = comments;
    }

    /// Replace `old` with `new` among the top-level comments.
    ///
    /// Every comment with the same severity whose text contains the old text
    /// has that substring swapped for the new text. A comment keeps its own
    /// filename unless `old` names that same file. Only when nothing matches
    /// that way is the first loosely equal comment replaced as a whole.
    pub fn replace_comment(&mut self, old: &str, new: &str) -> bool {
        let old = Comment::from_line(old);
        let new = Comment::from_line(new);
        let mut replaced = false;

        if !old.text().is_empty() {
            for comment in self.comments.iter_mut() {
                if comment.is_code() != old.is_code()
                    || comment.severity() != old.severity()
                    || !comment.text().contains(old.text())
                {
                    continue;
                }
                let text = comment.text().replace(old.text(), new.text());
                comment.set_severity(new.severity());
                if !old.filename().is_empty() && comment.filename() == old.filename() {
                    comment.set_filename(new.filename());
                }
                comment.set_text(&text);
                replaced = true;
            }
        }
        if replaced {
            return true;
        }

        if let Some(comment) = self.comments.iter_mut().find(|c| c.loose_eq(&old)) {
            let indent = comment.indent();
            *comment = new;
            comment.set_indent(indent);
            return true;
        }
        false
    }

    pub fn sort_comments(&mut self) {
        self.comments = sort_comments(std::mem::take(&mut self.comments));
    }

    pub fn render_title(&self) -> String {
        let mut title = TITLE_TEXT.to_string();
        for part in [&self.lab_number, &self.description] {
            if !part.is_empty() {
                title.push(' ');
                title.push_str(part);
            }
        }
        title
    }

    /// One line per requirement or sub-requirement, each newline-terminated.
    pub fn render_requirements(&self, layout: &Layout) -> String {
        self.requirements
            .iter()
            .map(|r| format!("{}\n", r.render(layout.requirement_indent)))
            .collect()
    }

    pub fn render_grade(&self) -> String {
        format!("{GRADE_LINE}{}", self.grade)
    }

    pub fn render_comments(&self, layout: &Layout) -> String {
        self.comments
            .iter()
            .map(|c| c.render(layout.line_width))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn render(&self, layout: &Layout) -> String {
        format!(
            "{}\n\n{REQUIREMENTS_TEXT}:\n{}\n{}\n\n{COMMENTS_TEXT}:\n{}\n",
            self.render_title(),
            self.render_requirements(layout),
            self.render_grade(),
            self.render_comments(layout),
        )
    }
}

impl fmt::Display for GradeSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&Layout::default()))
    }
}

fn line_end(text: &str, from: usize) -> usize {
    text[from..].find('\n').map_or(text.len(), |i| from + i)
}

/// First section marker of `section` at or after `from` that starts its line.
fn find_section(text: &str, section: Section, from: usize) -> Option<usize> {
    SECTION_MARKERS
        .find_iter(&text[from..])
        .map(|m| (from + m.start(), m.pattern()))
        .find(|&(start, pattern)| {
            let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
            pattern == section as usize && text[line_start..start].trim().is_empty()
        })
        .map(|(start, _)| start)
}

/// `line` without a case-insensitive `prefix`, if it starts with one.
fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &line[prefix.len()..])
}

fn title_remainder(title: &str) -> &str {
    let title = title.trim_start();
    match title
        .strip_prefix(TITLE_TEXT)
        .or_else(|| title.strip_prefix(TITLE_TEXT_COMPACT))
    {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => "",
    }
}

/// Lab number from a title line: the two characters after the title text.
pub fn lab_number(title: &str) -> String {
    let slot: String = title_remainder(title).chars().take(LAB_NUMBER_WIDTH).collect();
    slot.trim().to_string()
}

/// Lab description from a title line: everything after the lab number slot.
pub fn lab_description(title: &str) -> String {
    let rest: String = title_remainder(title).chars().skip(LAB_NUMBER_WIDTH).collect();
    rest.trim().to_string()
}

/// Grade value from a grade line.
pub fn grade_value(line: &str) -> String {
    let line = line.trim();
    let value = strip_prefix_ignore_case(line, GRADE_TEXT).unwrap_or(line);
    value.replace(':', "").trim().to_string()
}

pub fn is_requirements_line(line: &str) -> bool {
    line.contains(REQUIREMENTS_TEXT)
}

/// Whether the line starts with a digit.
pub fn is_requirement(line: &str) -> bool {
    line.trim_start()
        .chars()
        .next()
        .is_some_and(|c| c.is_numeric())
}

pub fn is_grade_line(line: &str) -> bool {
    line.starts_with(GRADE_TEXT)
}

/// Whether the line is the comments header and nothing else.
pub fn is_comments_line(line: &str) -> bool {
    line.to_ascii_lowercase()
        .contains(&COMMENTS_TEXT.to_ascii_lowercase())
        && line.chars().count() <= COMMENTS_TEXT.len() + 4
}

pub fn starts_with_bullet(line: &str) -> bool {
    has_bullet_prefix(line)
}

/// Parse the requirements section. Lines at the shallowest indent start a
/// requirement and deeper lines belong to the one above them.
pub fn parse_requirements(text: &str, diags: &mut Diagnostics) -> Vec<Requirement> {
    let base_indent = text
        .lines()
        .filter(|line| line.trim().chars().count() >= 3)
        .map(leading_whitespace)
        .min();

    let mut requirements = Vec::new();
    let mut current: Option<Requirement> = None;
    for raw in text.lines() {
        let line = raw.trim();
        if line.chars().count() < 3 {
            if !line.is_empty() {
                diags.push(
                    DiagnosticKind::DroppedLine,
                    format!("dropping short requirements line `{line}`"),
                );
            }
            continue;
        }
        if Some(leading_whitespace(raw)) == base_indent {
            requirements.extend(current.take());
            current = Some(Requirement::new(line));
        } else if let Some(req) = current.as_mut() {
            req.add_subrequirement(line);
        } else {
            diags.push(
                DiagnosticKind::OrphanRequirement,
                format!("dropping `{line}`: it comes before any requirement"),
            );
        }
    }
    requirements.extend(current);
    requirements
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No bullet seen yet; lines collect into free prose.
    Prose,
    /// Inside a bulleted comment; plain lines continue it.
    Bulleted,
    /// Inside a code block; lines are kept verbatim until the closing marker.
    Code,
}

struct CommentsParser<'d> {
    comment_indent: usize,
    state: State,
    seen_bullet: bool,
    buffer: String,
    prose: String,
    comments: Vec<Comment>,
    diags: &'d mut Diagnostics,
}

impl<'d> CommentsParser<'d> {
    fn new(comment_indent: usize, diags: &'d mut Diagnostics) -> Self {
        CommentsParser {
            comment_indent,
            state: State::Prose,
            seen_bullet: false,
            buffer: String::new(),
            prose: String::new(),
            comments: Vec::new(),
            diags,
        }
    }

    fn after_code(&self) -> State {
        if self.seen_bullet {
            State::Bulleted
        } else {
            State::Prose
        }
    }

    fn line(&mut self, line: &str) {
        if self.state == State::Code {
            self.buffer.push('\n');
            self.buffer.push_str(line.trim_end());
            if code_location(line).is_some() {
                self.flush();
                self.state = self.after_code();
            }
            return;
        }

        let has_code = code_location(line).is_some();
        if !has_code && line.chars().count() < 4 {
            return;
        }

        // Wrapped lines continue a bulleted comment unless they open with a
        // standalone marker.
        let opens_bullet = if self.state == State::Bulleted {
            starts_with_marker(line)
        } else {
            has_bullet_prefix(line)
        };
        if has_code || opens_bullet {
            self.flush();
            self.buffer = line.trim_end().to_string();
            if has_code {
                let markers = line.matches(COMMENT_CODE).count();
                if markers % 2 == 0 {
                    self.flush();
                    self.state = self.after_code();
                } else {
                    self.state = State::Code;
                }
            } else {
                self.seen_bullet = true;
                self.state = State::Bulleted;
            }
        } else if self.state == State::Bulleted {
            if self.buffer.is_empty() {
                self.diags.push(
                    DiagnosticKind::UnparsedCommentLine,
                    format!("`{}` follows a code block without a bullet", line.trim()),
                );
                self.buffer = line.trim().to_string();
            } else {
                self.buffer.push(' ');
                self.buffer.push_str(line.trim());
            }
        } else {
            self.prose.push_str(line.trim());
            self.prose.push(' ');
        }
    }

    /// Turn the buffer into a comment. Indented comments and code blocks
    /// nest under the previous top-level comment when there is one.
    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.buffer);
        let is_code = code_location(&text).is_some();
        let bullet = bullet_indent(&text);
        let indent = bullet.map_or(self.comment_indent.saturating_sub(1), |b| {
            b + self.comment_indent
        });
        let comment = Comment::new(&text, is_code, indent, self.diags);
        match self.comments.last_mut() {
            Some(parent) if is_code || bullet.is_some_and(|b| b > 0) => {
                parent.add_subcomment(comment)
            }
            _ => self.comments.push(comment),
        }
    }

    fn finish(mut self) -> Vec<Comment> {
        if self.state == State::Code {
            self.diags.push(
                DiagnosticKind::UnterminatedCode,
                "code block is never closed, keeping it as written",
            );
        }
        self.flush();

        let mut all = Vec::new();
        for sentence in split_sentences(&self.prose, PROSE_DELIMITERS) {
            if sentence.chars().count() <= 3 {
                continue;
            }
            let line = format!("{} {}", prose_severity(&sentence), sentence);
            all.push(Comment::new(&line, false, self.comment_indent, self.diags));
        }
        all.append(&mut self.comments);
        all
    }
}

/// Guess a severity for an unbulleted sentence from its wording.
fn prose_severity(sentence: &str) -> char {
    let lowered = sentence.to_lowercase();
    let words: HashSet<&str> = lowered.split_whitespace().collect();
    if lowered.contains("but ") {
        '~'
    } else if !lowered.contains("not") && words.iter().any(|w| POSITIVE_WORDS.contains(w)) {
        '+'
    } else {
        // Negative wording and unknown wording both read as criticism.
        '-'
    }
}

/// Parse the comments section, starting at (or just after) its header.
pub fn parse_comments(text: &str, comment_indent: usize, diags: &mut Diagnostics) -> Vec<Comment> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if let Some(first) = lines.first().copied() {
        if is_comments_line(first) {
            lines.remove(0);
        } else if let Some(rest) = strip_prefix_ignore_case(first, COMMENTS_TEXT) {
            lines[0] = rest.strip_prefix(':').unwrap_or(rest).trim();
        }
    }

    let mut parser = CommentsParser::new(comment_indent, diags);
    for line in lines {
        parser.line(line);
    }
    let comments = parser.finish();
    if comments.is_empty() {
        diags.push(DiagnosticKind::EmptyComments, "comments section has no comments");
    }
    comments
}

/// Sort key: the filename, else the first file or function name in the text,
/// else the text itself.
pub fn comments_key(comment: &Comment) -> String {
    if !comment.filename().is_empty() {
        return comment.filename().to_string();
    }
    comment
        .text()
        .split_whitespace()
        .find(|term| is_code_reference(term))
        .unwrap_or(comment.text())
        .to_string()
}

fn is_summary(comment: &Comment) -> bool {
    let cleaned: String = comment
        .text()
        .chars()
        .filter(|c| !",.:;!?-".contains(*c))
        .collect::<String>()
        .to_lowercase();
    cleaned
        .split_whitespace()
        .take(3)
        .any(|w| SUMMARY_WORDS.contains(w))
}

/// Order comments for reading: comments without a filename by
/// [`comments_key`], then comments with a filename by filename, then summary
/// comments in their original order.
pub fn sort_comments(comments: Vec<Comment>) -> Vec<Comment> {
    let mut general = Vec::new();
    let mut by_file = Vec::new();
    let mut summary = Vec::new();
    for comment in comments {
        if is_summary(&comment) {
            summary.push(comment);
        } else if !comment.filename().is_empty() {
            by_file.push(comment);
        } else {
            general.push(comment);
        }
    }
    general.sort_by_cached_key(comments_key);
    by_file.sort_by(|a, b| a.filename().cmp(b.filename()));

    general.extend(by_file);
    general.extend(summary);
    general
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_section_lines() {
        assert!(is_requirements_line("Requirements of this lab:"));
        assert!(!is_requirements_line("requirements"));

        assert!(is_requirement("    2) Uses a while loop."));
        assert!(is_requirement("1. Uses a for loop."));
        assert!(!is_requirement("   * Computes correctly"));

        assert!(is_grade_line("Grade:   B+"));
        assert!(!is_grade_line("GRADE SHEET FOR CS1 LAB 2"));
        assert!(!is_grade_line("   Grade: A"));

        assert!(is_comments_line("Comments from Graders:"));
        assert!(is_comments_line("COMMENTS FROM GRADERS"));
        assert!(!is_comments_line("Comments from Graders: Good job! Code passes"));

        assert!(starts_with_bullet("- Missing docstrings"));
        assert!(starts_with_bullet("   -- nested"));
        assert!(!starts_with_bullet("Plain sentence"));
    }

    #[test]
    fn grade_value_strips_the_label() {
        assert_eq!(grade_value("Grade:   B+"), "B+");
        assert_eq!(grade_value("grade: A-"), "A-");
        assert_eq!(grade_value("Grade:"), "");
    }
}
