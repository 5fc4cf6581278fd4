//! Whole-text edits a grader makes while writing a grade sheet: appending
//! rubric comments, undo/redo, reflowing and sorting the comments section,
//! and swapping bullet characters.
//!
//! These work on the raw text rather than a parsed [`GradeSheet`] so that
//! anything a grader typed outside the comments section is left untouched.
//!
//! [`GradeSheet`]: crate::GradeSheet

use crate::comment::{code_location, COMMENT_HEADER};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::gradesheet::{parse_comments, sort_comments, COMMENTS_TEXT, GRADE_TEXT};
use crate::text::format_comment;
use crate::{Comment, Layout};

/// Bullet every requirement line is reset to.
pub const DEFAULT_REQUIREMENT_BULLET: char = '*';

/// Characters of a rendered comment used to find it again in the text.
const UNDO_PROBE_CHARS: usize = 20;

/// Byte offset just past the last comments header (and its colon).
fn comments_body_start(text: &str) -> Option<usize> {
    let start = text.rfind(COMMENTS_TEXT)?;
    let end = start + COMMENTS_TEXT.len();
    Some(if text[end..].starts_with(':') { end + 1 } else { end })
}

fn render_all(comments: &[Comment], layout: &Layout) -> String {
    comments
        .iter()
        .map(|c| c.render(layout.line_width))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append `comment` on a new line, wrapped unless it is code.
pub fn append_comment(text: &str, comment: &str, layout: &Layout) -> String {
    let formatted = if code_location(comment).is_some() {
        comment.to_string()
    } else {
        format_comment(comment, layout.line_width, layout.comment_indent)
    };
    format!("{text}\n{formatted}")
}

/// Re-render the comments section in canonical form.
///
/// A missing comments header is put back after the grade line, or at the end
/// when there is no grade line either.
pub fn prettify(text: &str, layout: &Layout, diags: &mut Diagnostics) -> String {
    let mut text = text.to_string();
    let header = match text.find(COMMENTS_TEXT) {
        Some(at) => at,
        None => {
            diags.push(
                DiagnosticKind::MissingComments,
                format!("no `{COMMENTS_TEXT}:` header found, adding one after the grade"),
            );
            let insert_at = text
                .find(GRADE_TEXT)
                .map(|grade| text[grade..].find('\n').map_or(text.len(), |i| grade + i))
                .unwrap_or(text.len());
            text.insert_str(insert_at, &format!("\n\n{COMMENTS_TEXT}:\n"));
            insert_at + 2
        }
    };

    let mut body_start = header + COMMENTS_TEXT.len();
    if text[body_start..].starts_with(':') {
        body_start += 1;
    }
    let mut head = text[..body_start].to_string();
    if !head.ends_with('\n') {
        head.push('\n');
    }
    let comments = parse_comments(&text[body_start..], layout.comment_indent, diags);
    head + &render_all(&comments, layout)
}

/// Sort the comments section with [`sort_comments`].
pub fn sort_section(text: &str, layout: &Layout, diags: &mut Diagnostics) -> String {
    let Some(body_start) = comments_body_start(text) else {
        diags.push(
            DiagnosticKind::MissingComments,
            "no comments header found, nothing to sort",
        );
        return text.to_string();
    };
    let comments = parse_comments(&text[body_start..], layout.comment_indent, diags);
    format!(
        "{}\n{}",
        &text[..body_start],
        render_all(&sort_comments(comments), layout)
    )
}

fn split_at_comments(text: &str) -> (&str, &str) {
    match text.rfind(COMMENTS_TEXT) {
        Some(at) => text.split_at(at),
        None => (text, ""),
    }
}

/// Swap the first character of `line` for `to` when `pick` accepts it.
fn swap_leading(line: &str, pick: impl Fn(char) -> bool, to: char) -> String {
    let body = line.trim_start();
    match body.chars().next() {
        Some(first) if pick(first) => {
            let indent = &line[..line.len() - body.len()];
            format!("{indent}{to}{}", &body[first.len_utf8()..])
        }
        _ => line.to_string(),
    }
}

fn map_lines(section: &str, f: impl Fn(&str) -> String) -> String {
    section.split('\n').map(f).collect::<Vec<_>>().join("\n")
}

/// In the comments section, change any leading bullet found in `bullets` to
/// `to`. Header comments keep their marker.
pub fn replace_comment_bullets(text: &str, to: char, bullets: &str) -> String {
    let (head, comments) = split_at_comments(text);
    let replaced = map_lines(comments, |line| {
        if line.contains(COMMENT_HEADER) {
            line.to_string()
        } else {
            swap_leading(line, |c| bullets.contains(c), to)
        }
    });
    format!("{head}{replaced}")
}

/// Above the comments section, change the leading `bullet` of each line to `to`.
pub fn replace_requirement_bullet(text: &str, to: char, bullet: char) -> String {
    let (head, comments) = split_at_comments(text);
    let replaced = map_lines(head, |line| swap_leading(line, |c| c == bullet, to));
    format!("{replaced}{comments}")
}

/// Above the comments section, reset any leading bullet found in `bullets`
/// back to [`DEFAULT_REQUIREMENT_BULLET`].
pub fn reset_requirement_bullets(text: &str, bullets: &str) -> String {
    let (head, comments) = split_at_comments(text);
    let replaced = map_lines(head, |line| {
        swap_leading(line, |c| bullets.contains(c), DEFAULT_REQUIREMENT_BULLET)
    });
    format!("{replaced}{comments}")
}

/// A grade sheet being written, with a redo stack for removed comments.
#[derive(Debug, Clone, Default)]
pub struct EditSession {
    text: String,
    redo: Vec<String>,
    layout: Layout,
}

impl EditSession {
    pub fn new(text: impl Into<String>, layout: Layout) -> Self {
        EditSession {
            text: text.into(),
            redo: Vec::new(),
            layout,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn append(&mut self, comment: &str) {
        self.text = append_comment(&self.text, comment, &self.layout);
    }

    /// Remove the last comment (or the last sub-comment of the last comment)
    /// and keep it for [`EditSession::redo`]. Returns the removed comment.
    pub fn undo_last_comment(&mut self, diags: &mut Diagnostics) -> Option<String> {
        let body_start = comments_body_start(&self.text)?;
        let body = self.text[body_start..].trim_end();
        if body.chars().count() <= 5 {
            return None;
        }

        let mut comments = parse_comments(body, self.layout.comment_indent, diags);
        let nested = comments
            .last()
            .is_some_and(|parent| !parent.subcomments().is_empty());
        let last = if nested {
            comments.last_mut().and_then(|parent| parent.pop_last_subcomment())
        } else {
            comments.pop()
        }?;

        let rendered = last.render(self.layout.line_width);
        let location = [rendered.trim_start(), last.text()]
            .into_iter()
            .map(|probe| probe.chars().take(UNDO_PROBE_CHARS).collect::<String>())
            .filter(|probe| !probe.is_empty())
            .find_map(|probe| self.text.rfind(&probe))?;
        if location < body_start {
            return None;
        }
        let cut = self.text[..location].rfind('\n').unwrap_or(0);
        self.text.truncate(cut);
        tracing::debug!(comment = %rendered, "removed last comment");
        self.redo.push(rendered.clone());
        Some(rendered)
    }

    /// Append the most recently undone comment again.
    pub fn redo(&mut self) -> bool {
        match self.redo.pop() {
            Some(comment) => {
                self.append(&comment);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "GRADE SHEET FOR CS1 LAB 2 (\"Day of the Week\")\n\nRequirements of this lab:\n   * Computes correctly\n   * Uses conditionals\n\nGrade:   B\n\nComments from Graders:\n";

    #[test]
    fn appended_comments_are_wrapped() {
        let out = append_comment(
            SHEET,
            "- Too many comments also makes code difficult to navigate and read, try to keep them short",
            &Layout::default(),
        );
        assert!(out.ends_with(
            "\n- Too many comments also makes code difficult to navigate and read, try to\n   keep them short"
        ));
        let code = append_comment("x", "`\n  a  =  1\n`", &Layout::default());
        assert_eq!(code, "x\n`\n  a  =  1\n`");
    }

    #[test]
    fn prettify_reflows_comments_only() {
        let messy = format!("{SHEET}-      Good start,   but some issues\n   with negative days\n");
        let out = prettify(&messy, &Layout::default(), &mut Diagnostics::new());
        assert!(out.starts_with(SHEET));
        assert!(out.ends_with("- Good start, but some issues with negative days"));
    }

    #[test]
    fn prettify_restores_missing_comments_header() {
        let mut diags = Diagnostics::new();
        let out = prettify(
            "GRADE SHEET FOR CS1 LAB 2\n\nGrade:   A\n",
            &Layout::default(),
            &mut diags,
        );
        assert_eq!(out, "GRADE SHEET FOR CS1 LAB 2\n\nGrade:   A\n\nComments from Graders:\n");
        assert!(diags.has(DiagnosticKind::MissingComments));
    }

    #[test]
    fn sorts_comment_section() {
        let text = format!("{SHEET}+ Overall, great job!\n- zeta.py: Fix it\n~ intro.py: Close\n- Missing docstrings");
        let out = sort_section(&text, &Layout::default(), &mut Diagnostics::new());
        let comments = &out[out.find("Graders:").map(|i| i + 8).unwrap_or(0)..];
        assert_eq!(
            comments,
            "\n- Missing docstrings\n~ intro.py: Close\n- zeta.py: Fix it\n+ Overall, great job!"
        );
    }

    #[test]
    fn bullets_are_swapped_per_section() {
        let text = format!("{SHEET}- Needs work\n** Header\n   ~ minor");
        let out = replace_comment_bullets(&text, '+', "-~");
        assert!(out.ends_with("+ Needs work\n** Header\n   + minor"));
        assert!(out.contains("   * Computes correctly"));

        let reqs = replace_requirement_bullet(&text, '+', '*');
        assert!(reqs.contains("   + Computes correctly\n   + Uses conditionals"));
        assert!(reqs.ends_with("- Needs work\n** Header\n   ~ minor"));

        let reset = reset_requirement_bullets(&reqs, "+-~");
        assert!(reset.contains("   * Computes correctly\n   * Uses conditionals"));
    }

    #[test]
    fn undo_and_redo_last_comment() {
        let mut session = EditSession::new(SHEET.trim_end(), Layout::default());
        session.append("+ Nice use of helper functions");
        session.append("- day_of_week(): Returns the wrong day for negative offsets");
        let before_last = {
            let mut s = EditSession::new(SHEET.trim_end(), Layout::default());
            s.append("+ Nice use of helper functions");
            s.into_text()
        };

        let removed = session.undo_last_comment(&mut Diagnostics::new());
        assert_eq!(
            removed.as_deref(),
            Some("- day_of_week(): Returns the wrong day for negative offsets")
        );
        assert_eq!(session.text(), before_last);
        assert!(session.can_redo());

        assert!(session.redo());
        assert!(session.text().ends_with("- day_of_week(): Returns the wrong day for negative offsets"));
        assert!(!session.redo());
    }

    #[test]
    fn undo_pops_subcomment_first() {
        let mut session = EditSession::new(
            format!("{SHEET}- Some issues:\n   -- dayOfWeek is off by one"),
            Layout::default(),
        );
        let removed = session.undo_last_comment(&mut Diagnostics::new());
        assert_eq!(removed.as_deref(), Some("   -- dayOfWeek is off by one"));
        assert!(session.text().ends_with("- Some issues:"));
    }

    #[test]
    fn undo_without_comments_is_a_no_op() {
        let mut session = EditSession::new(SHEET, Layout::default());
        assert!(session.undo_last_comment(&mut Diagnostics::new()).is_none());
        assert_eq!(session.text(), SHEET);
    }
}
