use std::fs;
use std::path::{Path, PathBuf};

use gom_core::retro::{run, select_range, student_dirs};
use gom_core::{Config, DiagnosticKind, FsStore, RetroOutcome, RetroRequest};

struct TempDir {
    path: PathBuf,
}

impl TempDir {
    fn new(prefix: &str) -> Self {
        let mut dir = std::env::temp_dir();
        let unique = format!(
            "{prefix}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        dir.push(unique);
        fs::create_dir_all(&dir).expect("create temp dir");
        Self { path: dir }
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(path, contents).expect("write file");
}

fn sheet(comments: &str) -> String {
    format!(
        "GRADE SHEET FOR CS1 LAB 3 (\"Loops\")\n\nRequirements of this lab:\n   1. Uses a for loop.\n   2. Uses a while loop.\n\nGrade:   B\n\nComments from Graders:\n{comments}\n"
    )
}

fn names(dirs: &[PathBuf]) -> Vec<String> {
    dirs.iter()
        .filter_map(|d| d.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}

/// A lab directory with four students, one without a grade sheet, plus the
/// usual non-student entries.
fn lab_dir(tmp: &TempDir) -> PathBuf {
    let lab = tmp.path.join("lab3");
    write_file(
        &lab.join("alice/GradeSheet.txt"),
        &sheet("- loops.py: Missing docstrings on helpers\n+ Nice use of range"),
    );
    write_file(
        &lab.join("bob/GradeSheet.txt"),
        &sheet("- loops.py: Missing docstrings in main"),
    );
    fs::create_dir_all(lab.join("carol")).expect("create carol");
    write_file(&lab.join("dave/GradeSheet.txt"), &sheet("+ Great job!"));
    write_file(&lab.join("autotest/run.sh"), "#!/bin/sh\n");
    fs::create_dir_all(lab.join(".git")).expect("create .git");
    write_file(&lab.join("README.md"), "# lab 3\n");
    lab
}

#[test]
fn lists_student_directories_in_order() {
    let tmp = TempDir::new("gom-retro-dirs");
    let lab = lab_dir(&tmp);
    let dirs = student_dirs(&lab, &Config::default().retro.ignore_dirs).expect("list dirs");
    assert_eq!(names(&dirs), ["alice", "bob", "carol", "dave"]);

    let custom = student_dirs(&lab, &["a*".to_string(), "[".to_string()]).expect("list dirs");
    assert_eq!(names(&custom), [".git", "bob", "carol", "dave"]);
}

#[test]
fn replaces_within_the_selected_range() {
    let tmp = TempDir::new("gom-retro-run");
    let lab = lab_dir(&tmp);
    let config = Config::default();
    let dirs = student_dirs(&lab, &config.retro.ignore_dirs).expect("list dirs");
    let targets = select_range(&dirs, Some("alice"), Some("carol"))
        .expect("range")
        .to_vec();
    let request = RetroRequest::new(
        "- loops.py: Missing docstrings",
        "- loops.py: Add a docstring",
        targets,
    );

    let mut prompts = 0;
    let report = run(&request, &config, &mut FsStore, &mut |message: &str| {
        prompts += 1;
        message.contains("alice to carol")
    })
    .expect("run");

    assert_eq!(prompts, 1);
    assert!(report.confirmed);
    let outcomes: Vec<_> = report.items.iter().map(|i| i.outcome).collect();
    assert!(matches!(outcomes[0], RetroOutcome::Replaced { .. }));
    assert!(matches!(outcomes[1], RetroOutcome::Replaced { .. }));
    assert_eq!(outcomes[2], RetroOutcome::Missing);
    assert!(report.diagnostics.has(DiagnosticKind::MissingTarget));

    let alice = fs::read_to_string(lab.join("alice/GradeSheet.txt")).expect("read alice");
    assert!(alice.contains("- loops.py: Add a docstring on helpers\n+ Nice use of range\n"));
    let bob = fs::read_to_string(lab.join("bob/GradeSheet.txt")).expect("read bob");
    assert!(bob.contains("- loops.py: Add a docstring in main"));

    // Outside the range.
    let dave = fs::read_to_string(lab.join("dave/GradeSheet.txt")).expect("read dave");
    assert_eq!(dave, sheet("+ Great job!"));
}

#[test]
fn declined_batch_writes_nothing() {
    let tmp = TempDir::new("gom-retro-declined");
    let lab = lab_dir(&tmp);
    let before = fs::read_to_string(lab.join("alice/GradeSheet.txt")).expect("read alice");
    let request = RetroRequest::new(
        "- loops.py: Missing docstrings",
        "- loops.py: Add a docstring",
        vec![lab.join("alice"), lab.join("bob")],
    );

    let report = run(&request, &Config::default(), &mut FsStore, &mut |_: &str| false)
        .expect("run");
    assert!(!report.confirmed);
    assert_eq!(
        fs::read_to_string(lab.join("alice/GradeSheet.txt")).expect("read alice"),
        before
    );
}
