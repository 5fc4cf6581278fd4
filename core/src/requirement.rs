use std::fmt;

use serde::{Deserialize, Serialize};

/// Indent of a requirement line in a rendered grade sheet.
pub const DEFAULT_REQUIREMENT_INDENT: usize = 3;

/// Extra indent of sub-requirements relative to their requirement.
pub const SUBREQUIREMENT_OFFSET: usize = 2;

/// One numbered or bulleted requirement and the lines nested under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    line: String,
    subrequirements: Vec<String>,
}

impl Requirement {
    pub fn new(line: &str) -> Self {
        Requirement {
            line: line.trim().to_string(),
            subrequirements: Vec::new(),
        }
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn set_line(&mut self, line: &str) {
        self.line = line.trim().to_string();
    }

    /// The leading number or status marker, e.g. `2.` or `+`.
    pub fn marker(&self) -> String {
        split_requirement(&self.line).0
    }

    pub fn text(&self) -> String {
        split_requirement(&self.line).1
    }

    pub fn subrequirements(&self) -> &[String] {
        &self.subrequirements
    }

    pub fn set_subrequirements(&mut self, subrequirements: Vec<String>) {
        self.subrequirements = subrequirements;
    }

    pub fn add_subrequirement(&mut self, line: &str) {
        self.subrequirements.push(line.to_string());
    }

    /// Remove the first sub-requirement equal to `line`.
    pub fn remove_subrequirement(&mut self, line: &str) -> bool {
        match self.subrequirements.iter().position(|s| s == line) {
            Some(idx) => {
                self.subrequirements.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Render with `indent` spaces before the requirement and
    /// `indent + 2` before each sub-requirement.
    pub fn render(&self, indent: usize) -> String {
        let mut lines = Vec::with_capacity(self.subrequirements.len() + 1);
        lines.push(format!("{}{}", " ".repeat(indent), self.line));
        let sub_indent = " ".repeat(indent + SUBREQUIREMENT_OFFSET);
        for sub in &self.subrequirements {
            lines.push(format!("{sub_indent}{sub}"));
        }
        lines.join("\n")
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(DEFAULT_REQUIREMENT_INDENT))
    }
}

/// Split a requirement line into its marker and text. A line without a
/// space has no marker.
pub fn split_requirement(line: &str) -> (String, String) {
    let line = line.trim();
    match line.split_once(' ') {
        Some((marker, text)) => (marker.trim().to_string(), text.trim().to_string()),
        None => (String::new(), line.to_string()),
    }
}
