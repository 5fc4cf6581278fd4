//! Retroactive replace: push an edited rubric comment into grade sheets that
//! were already written.
//!
//! Targets are student directories, each holding one grade sheet. The batch
//! runs only after the caller confirms it, and each file is written on its
//! own. A failure part way through leaves earlier writes in place.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use walkdir::WalkDir;

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{GomError, Result};
use crate::gradesheet::GradeSheet;
use crate::rubric::lab_number_from_path;
use crate::Config;

/// Reads and writes grade sheets by path.
pub trait DocumentStore {
    /// The document text, or `None` when there is no such document.
    fn read(&self, path: &Path) -> Result<Option<String>>;

    fn write(&mut self, path: &Path, text: &str) -> Result<()>;
}

/// Grade sheets on the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStore;

impl DocumentStore for FsStore {
    fn read(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GomError::io(path, e)),
        }
    }

    fn write(&mut self, path: &Path, text: &str) -> Result<()> {
        fs::write(path, text).map_err(|e| GomError::io(path, e))
    }
}

/// Asks the user to approve a batch before anything is written.
pub trait Confirm {
    fn confirm(&mut self, message: &str) -> bool;
}

impl<F: FnMut(&str) -> bool> Confirm for F {
    fn confirm(&mut self, message: &str) -> bool {
        self(message)
    }
}

/// One retroactive replace over an ordered list of student directories.
#[derive(Debug, Clone)]
pub struct RetroRequest {
    pub old: String,
    pub new: String,
    pub targets: Vec<PathBuf>,
}

impl RetroRequest {
    pub fn new(old: impl Into<String>, new: impl Into<String>, targets: Vec<PathBuf>) -> Self {
        RetroRequest {
            old: old.into(),
            new: new.into(),
            targets,
        }
    }

    /// The question put to the user. Names both texts and the target range.
    pub fn confirmation_message(&self) -> String {
        let name = |path: Option<&PathBuf>| {
            path.map(|p| display_name(p)).unwrap_or_default()
        };
        format!(
            "Replace:\n{}\nWith:\n{}\nIn: {} to {} ({} directories)",
            self.old,
            self.new,
            name(self.targets.first()),
            name(self.targets.last()),
            self.targets.len(),
        )
    }
}

/// What happened to one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RetroOutcome {
    /// Rewritten. Lengths are rendered characters before and after.
    Replaced { before: usize, after: usize },
    /// Nothing in the grade sheet matched.
    NoMatch,
    /// A match was found but the rewrite shrank the sheet too far to keep.
    DataLoss { before: usize, after: usize },
    /// The directory has no grade sheet.
    Missing,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetroItem {
    pub target: PathBuf,
    pub outcome: RetroOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetroReport {
    /// False when the user declined; nothing was touched.
    pub confirmed: bool,
    pub items: Vec<RetroItem>,
    pub diagnostics: Diagnostics,
}

impl RetroReport {
    pub fn replaced(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, RetroOutcome::Replaced { .. }))
            .count()
    }

    pub fn written(&self) -> impl Iterator<Item = &Path> {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, RetroOutcome::Replaced { .. }))
            .map(|item| item.target.as_path())
    }
}

/// Run a retroactive replace.
///
/// Each target's grade sheet is parsed, patched with
/// [`GradeSheet::replace_comment`] and written back only when something was
/// replaced and the new rendering keeps more than
/// [`RetroRules::min_retained_ratio`] of the old length.
///
/// [`RetroRules::min_retained_ratio`]: crate::RetroRules::min_retained_ratio
pub fn run(
    request: &RetroRequest,
    config: &Config,
    store: &mut impl DocumentStore,
    confirm: &mut impl Confirm,
) -> Result<RetroReport> {
    if request.targets.is_empty() {
        return Err(GomError::NoTargets);
    }
    let mut report = RetroReport::default();
    if !confirm.confirm(&request.confirmation_message()) {
        tracing::info!("retroactive replace declined");
        return Ok(report);
    }
    report.confirmed = true;

    for target in &request.targets {
        let path = target.join(&config.retro.gradesheet_filename);
        let outcome = replace_in(&path, request, config, store, &mut report.diagnostics)?;
        tracing::debug!(target = %target.display(), ?outcome, "retroactive replace");
        report.items.push(RetroItem {
            target: target.clone(),
            outcome,
        });
    }
    tracing::info!(
        replaced = report.replaced(),
        targets = report.items.len(),
        "retroactive replace finished"
    );
    Ok(report)
}

fn replace_in(
    path: &Path,
    request: &RetroRequest,
    config: &Config,
    store: &mut impl DocumentStore,
    diags: &mut Diagnostics,
) -> Result<RetroOutcome> {
    let Some(text) = store.read(path)? else {
        diags.push(
            DiagnosticKind::MissingTarget,
            format!("{} not found, skipping", path.display()),
        );
        return Ok(RetroOutcome::Missing);
    };

    // Parse anomalies in old sheets are expected and only logged.
    let mut sheet = GradeSheet::parse(&text, &config.layout, &mut Diagnostics::new());
    let before = sheet.render(&config.layout).chars().count();
    if !sheet.replace_comment(&request.old, &request.new) {
        return Ok(RetroOutcome::NoMatch);
    }
    let rendered = sheet.render(&config.layout);
    let after = rendered.chars().count();

    if (after as f64) <= before as f64 * config.retro.min_retained_ratio {
        diags.push(
            DiagnosticKind::DataLoss,
            format!(
                "not writing {}: it would shrink from {before} to {after} characters",
                path.display()
            ),
        );
        return Ok(RetroOutcome::DataLoss { before, after });
    }
    store.write(path, &rendered)?;
    Ok(RetroOutcome::Replaced { before, after })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn build_glob_set(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => tracing::warn!(pattern, error = %e, "ignoring invalid pattern"),
        }
    }
    builder.build().ok()
}

/// Student directories directly under `root`, sorted by name. Entries whose
/// name matches one of the `ignore` globs are skipped.
pub fn student_dirs(root: &Path, ignore: &[String]) -> Result<Vec<PathBuf>> {
    let ignore = build_glob_set(ignore);
    let mut dirs = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            GomError::io(path, e.into())
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if ignore
            .as_ref()
            .is_some_and(|set| set.is_match(entry.file_name()))
        {
            continue;
        }
        dirs.push(entry.into_path());
    }
    Ok(dirs)
}

/// The inclusive run of `dirs` from `start` to `end`, matched by directory
/// name. A missing bound means the first or last directory.
pub fn select_range<'a>(
    dirs: &'a [PathBuf],
    start: Option<&str>,
    end: Option<&str>,
) -> Result<&'a [PathBuf]> {
    if dirs.is_empty() {
        return Err(GomError::NoTargets);
    }
    let find = |name: &str| dirs.iter().position(|d| display_name(d) == name);
    let first = match start.filter(|s| !s.is_empty()) {
        Some(name) => find(name).ok_or_else(|| GomError::StartNotFound(name.to_string()))?,
        None => 0,
    };
    let last = match end.filter(|s| !s.is_empty()) {
        Some(name) => find(name).ok_or_else(|| GomError::EndNotFound(name.to_string()))?,
        None => dirs.len() - 1,
    };
    if last < first {
        return Err(GomError::EndBeforeStart {
            start: display_name(&dirs[first]),
            end: display_name(&dirs[last]),
        });
    }
    Ok(&dirs[first..=last])
}

/// The lab directory a rubric belongs to, e.g. `root/lab3` for `lab3.csv`.
pub fn lab_dir(root: &Path, rubric_path: &Path) -> Option<PathBuf> {
    lab_number_from_path(rubric_path).map(|num| root.join(format!("lab{num}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    struct MemStore {
        docs: HashMap<PathBuf, String>,
        writes: Vec<PathBuf>,
    }

    impl DocumentStore for MemStore {
        fn read(&self, path: &Path) -> Result<Option<String>> {
            Ok(self.docs.get(path).cloned())
        }

        fn write(&mut self, path: &Path, text: &str) -> Result<()> {
            self.writes.push(path.to_path_buf());
            self.docs.insert(path.to_path_buf(), text.to_string());
            Ok(())
        }
    }

    fn sheet(comments: &str) -> String {
        format!(
            "GRADE SHEET FOR CS1 LAB 2\n\nRequirements of this lab:\n   * Computes correctly\n\nGrade:   B\n\nComments from Graders:\n{comments}\n"
        )
    }

    fn dirs(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| Path::new("/grading/lab2").join(n)).collect()
    }

    #[test]
    fn selects_inclusive_ranges() {
        let all = dirs(&["alice", "bob", "carol", "dave"]);
        assert_eq!(select_range(&all, Some("bob"), Some("carol")).map(<[_]>::len).ok(), Some(2));
        assert_eq!(select_range(&all, None, None).map(<[_]>::len).ok(), Some(4));
        assert_eq!(select_range(&all, Some(""), Some("bob")).map(<[_]>::len).ok(), Some(2));
        assert_eq!(select_range(&all, Some("carol"), Some("carol")).map(<[_]>::len).ok(), Some(1));
    }

    #[test]
    fn rejects_bad_ranges() {
        let all = dirs(&["alice", "bob", "carol"]);
        assert!(matches!(
            select_range(&all, Some("zed"), None),
            Err(GomError::StartNotFound(name)) if name == "zed"
        ));
        assert!(matches!(
            select_range(&all, None, Some("zed")),
            Err(GomError::EndNotFound(_))
        ));
        assert!(matches!(
            select_range(&all, Some("carol"), Some("alice")),
            Err(GomError::EndBeforeStart { .. })
        ));
        assert!(matches!(select_range(&[], None, None), Err(GomError::NoTargets)));
    }

    #[test]
    fn confirmation_names_texts_and_range() {
        let request = RetroRequest::new("- Old text", "- New text", dirs(&["alice", "bob", "carol"]));
        let message = request.confirmation_message();
        assert!(message.contains("- Old text"));
        assert!(message.contains("- New text"));
        assert!(message.contains("alice to carol"));
    }

    #[test]
    fn declining_touches_nothing() {
        let targets = dirs(&["alice"]);
        let mut store = MemStore::default();
        store.docs.insert(
            targets[0].join("GradeSheet.txt"),
            sheet("- Missing docstrings on helpers"),
        );
        let request = RetroRequest::new("- Missing docstrings", "- Add docstrings", targets);
        let report = run(&request, &Config::default(), &mut store, &mut |_: &str| false)
            .expect("run");
        assert!(!report.confirmed);
        assert!(report.items.is_empty());
        assert!(store.writes.is_empty());
    }

    #[test]
    fn replaces_across_targets_and_skips_missing() {
        let targets = dirs(&["alice", "bob", "carol"]);
        let mut store = MemStore::default();
        store.docs.insert(
            targets[0].join("GradeSheet.txt"),
            sheet("- Missing docstrings on helpers\n+ Nice loops"),
        );
        store.docs.insert(targets[2].join("GradeSheet.txt"), sheet("+ Great job!"));
        let request = RetroRequest::new(
            "- Missing docstrings",
            "- Add a docstring to every function",
            targets.clone(),
        );

        let mut asked = Vec::new();
        let report = run(&request, &Config::default(), &mut store, &mut |m: &str| {
            asked.push(m.to_string());
            true
        })
        .expect("run");

        assert_eq!(asked.len(), 1);
        assert!(report.confirmed);
        let outcomes: Vec<_> = report.items.iter().map(|i| i.outcome).collect();
        assert!(matches!(outcomes[0], RetroOutcome::Replaced { .. }));
        assert_eq!(outcomes[1], RetroOutcome::Missing);
        assert_eq!(outcomes[2], RetroOutcome::NoMatch);
        assert!(report.diagnostics.has(DiagnosticKind::MissingTarget));
        assert_eq!(store.writes, vec![targets[0].join("GradeSheet.txt")]);
        assert!(store.docs[&targets[0].join("GradeSheet.txt")]
            .contains("- Add a docstring to every function on helpers"));
        assert_eq!(report.written().count(), 1);
    }

    #[test]
    fn refuses_to_write_a_shrunken_sheet() {
        let long = "- dayOfWeek mixes up the modular arithmetic for negative offsets and the helper that is supposed to normalise them is never called from anywhere in the program";
        let targets = dirs(&["alice"]);
        let mut store = MemStore::default();
        store.docs.insert(targets[0].join("GradeSheet.txt"), sheet(long));
        let request = RetroRequest::new(long, "- x", targets);
        let mut config = Config::default();
        config.retro.min_retained_ratio = 0.9;

        let report = run(&request, &config, &mut store, &mut |_: &str| true).expect("run");
        assert!(matches!(report.items[0].outcome, RetroOutcome::DataLoss { .. }));
        assert!(report.diagnostics.has(DiagnosticKind::DataLoss));
        assert!(store.writes.is_empty());
    }

    #[test]
    fn default_guard_refuses_exactly_half() {
        // The sheet around the comment renders to 114 characters. Each comment
        // below wraps onto two lines.
        let half = "- dayOfWeek mixes up the modular arithmetic for negative offsets and the helper that is supposed to normalise them is";
        let just_over = "- dayOfWeek mixes up the modular arithmetic for negative offsets and the helper that is supposed to normalise things";
        let config = Config::default();

        for (old, written) in [(half, false), (just_over, true)] {
            let targets = dirs(&["alice"]);
            let path = targets[0].join("GradeSheet.txt");
            let mut store = MemStore::default();
            store.docs.insert(path.clone(), sheet(old));
            let request = RetroRequest::new(old, "- x", targets);

            let report = run(&request, &config, &mut store, &mut |_: &str| true).expect("run");
            match report.items[0].outcome {
                RetroOutcome::DataLoss { before, after } => {
                    assert!(!written);
                    assert_eq!((before, after), (234, 117));
                }
                RetroOutcome::Replaced { before, after } => {
                    assert!(written);
                    assert_eq!((before, after), (233, 117));
                }
                other => panic!("unexpected outcome {other:?}"),
            }
            assert_eq!(store.writes.len(), usize::from(written));
        }
    }

    #[test]
    fn empty_target_list_is_an_error() {
        let request = RetroRequest::new("- a", "- b", Vec::new());
        let err = run(&request, &Config::default(), &mut MemStore::default(), &mut |_: &str| true)
            .unwrap_err();
        assert!(matches!(err, GomError::NoTargets));
    }

    #[test]
    fn lab_dir_follows_rubric_number() {
        assert_eq!(
            lab_dir(Path::new("/grading"), Path::new("rubrics/lab3.csv")),
            Some(PathBuf::from("/grading/lab3"))
        );
    }
}
