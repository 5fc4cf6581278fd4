use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use console::{style, Term};
use gom_core::{
    editor, retro, text::format_comment, Config, Diagnostics, EditSession, FsStore, GradeSheet,
    RetroOutcome, RetroReport, RetroRequest, Rubric,
};
use serde::Serialize;
use serde_yaml::Value as YamlValue;

/// Grade-O-Matic command-line entry point.
#[derive(Debug, Parser)]
#[command(name = "gom", about = "Parse, tidy and patch CS1 grade sheets.")]
struct Args {
    /// Path to config file (YAML). Defaults to gom.yml if present.
    #[arg(long, default_value = "gom.yml", global = true)]
    config: PathBuf,

    /// Emit JSON output for automation.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    json: bool,

    /// Log more (-v warn, -vv info, -vvv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a grade sheet and print it in canonical form.
    Parse {
        file: PathBuf,
    },
    /// Re-render the comments section of a grade sheet.
    Prettify {
        file: PathBuf,
        /// Overwrite the file instead of printing.
        #[arg(long, action = ArgAction::SetTrue)]
        write: bool,
    },
    /// Sort the comments section of a grade sheet.
    Sort {
        file: PathBuf,
        #[arg(long, action = ArgAction::SetTrue)]
        write: bool,
    },
    /// Append a comment to a grade sheet.
    Append {
        file: PathBuf,
        comment: String,
    },
    /// Remove the last comment (or sub-comment) of a grade sheet.
    Undo {
        file: PathBuf,
    },
    /// Swap bullet characters in a grade sheet.
    Bullets {
        file: PathBuf,
        /// Change comment bullets found in FROM to this character.
        #[arg(long, value_name = "CHAR")]
        comments: Option<char>,
        /// Change requirement bullets equal to --requirement-bullet to this character.
        #[arg(long, value_name = "CHAR")]
        requirements: Option<char>,
        #[arg(long, value_name = "CHAR", default_value_t = '*')]
        requirement_bullet: char,
        /// Reset requirement bullets found in FROM back to `*`.
        #[arg(long, action = ArgAction::SetTrue)]
        reset: bool,
        #[arg(long, value_name = "FROM", default_value = "+-~?")]
        from: String,
    },
    /// Wrap a single comment to the configured width.
    Wrap {
        text: String,
        #[arg(long)]
        width: Option<usize>,
        #[arg(long)]
        indent: Option<usize>,
    },
    /// Load a rubric file and print its criteria.
    Rubric {
        file: PathBuf,
        /// Write the rubric back out in canonical delimited form.
        #[arg(long, value_name = "PATH")]
        save: Option<PathBuf>,
    },
    /// Replace a comment in every grade sheet of a range of student directories.
    Replace {
        /// Grading directory holding one directory per student.
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        old: String,
        #[arg(long)]
        new: String,
        /// First student directory (inclusive). Defaults to the first one.
        #[arg(long)]
        start: Option<String>,
        /// Last student directory (inclusive). Defaults to the last one.
        #[arg(long)]
        end: Option<String>,
        /// Skip the confirmation prompt.
        #[arg(long, action = ArgAction::SetTrue)]
        yes: bool,
    },
}

#[derive(Debug, Serialize)]
struct ParseOutput<'a> {
    path: String,
    sheet: &'a GradeSheet,
    diagnostics: &'a Diagnostics,
}

#[derive(Debug, Serialize)]
struct TextOutput<'a> {
    path: String,
    text: &'a str,
    diagnostics: &'a Diagnostics,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let (cfg, config_root) = load_config(&args.config)?;

    match args.command {
        Command::Parse { ref file } => run_parse(file, &cfg, &config_root, args.json),
        Command::Prettify { ref file, write } => {
            run_edit(file, write, &config_root, args.json, |text, diags| {
                editor::prettify(text, &cfg.layout, diags)
            })
        }
        Command::Sort { ref file, write } => {
            run_edit(file, write, &config_root, args.json, |text, diags| {
                editor::sort_section(text, &cfg.layout, diags)
            })
        }
        Command::Append { ref file, ref comment } => {
            let mut session = EditSession::new(read_text(file)?, cfg.layout.clone());
            session.append(comment);
            write_text(file, session.text())
        }
        Command::Undo { ref file } => run_undo(file, &cfg, args.json),
        Command::Bullets {
            ref file,
            comments,
            requirements,
            requirement_bullet,
            reset,
            ref from,
        } => {
            let mut text = read_text(file)?;
            if let Some(to) = comments {
                text = editor::replace_comment_bullets(&text, to, from);
            }
            if let Some(to) = requirements {
                text = editor::replace_requirement_bullet(&text, to, requirement_bullet);
            }
            if reset {
                text = editor::reset_requirement_bullets(&text, from);
            }
            write_text(file, &text)
        }
        Command::Wrap {
            ref text,
            width,
            indent,
        } => {
            let wrapped = format_comment(
                text,
                width.unwrap_or(cfg.layout.line_width),
                indent.unwrap_or(cfg.layout.comment_indent),
            );
            if args.json {
                println!("{}", serde_json::to_string_pretty(&wrapped)?);
            } else {
                println!("{wrapped}");
            }
            Ok(())
        }
        Command::Rubric { ref file, ref save } => {
            run_rubric(file, save.as_deref(), &cfg, args.json)
        }
        Command::Replace {
            ref root,
            ref old,
            ref new,
            ref start,
            ref end,
            yes,
        } => run_replace(
            root,
            RetroRequest::new(old.as_str(), new.as_str(), Vec::new()),
            start.as_deref(),
            end.as_deref(),
            yes,
            &cfg,
            &config_root,
            args.json,
        ),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &PathBuf) -> anyhow::Result<(Config, PathBuf)> {
    if path.exists() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let value: YamlValue = serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse YAML {}", path.display()))?;
        let cfg: Config = serde_yaml::from_value(value)
            .with_context(|| format!("Invalid config structure in {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded config");
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => env::current_dir()?,
        };
        Ok((cfg, dir))
    } else {
        Ok((Config::default(), env::current_dir()?))
    }
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write_text(path: &Path, text: &str) -> anyhow::Result<()> {
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

fn relative(path: &Path, root: &Path) -> String {
    let rel = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
    rel.to_string_lossy().replace('\\', "/")
}

fn print_diagnostics(diags: &Diagnostics) {
    for diag in diags {
        eprintln!("  [{}] {}", style(diag.kind).yellow(), diag.message);
    }
}

fn run_parse(file: &Path, cfg: &Config, root: &Path, json: bool) -> anyhow::Result<()> {
    let mut diags = Diagnostics::new();
    let sheet = GradeSheet::read_file(file, &cfg.layout, &mut diags)
        .with_context(|| format!("Failed to parse {}", file.display()))?;
    if json {
        let output = ParseOutput {
            path: relative(file, root),
            sheet: &sheet,
            diagnostics: &diags,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }
    print!("{}", sheet.render(&cfg.layout));
    if !diags.is_empty() {
        eprintln!("{}", style(format!("{} diagnostics", diags.len())).bold());
        print_diagnostics(&diags);
    }
    Ok(())
}

fn run_edit(
    file: &Path,
    write: bool,
    root: &Path,
    json: bool,
    edit: impl FnOnce(&str, &mut Diagnostics) -> String,
) -> anyhow::Result<()> {
    let mut diags = Diagnostics::new();
    let text = edit(&read_text(file)?, &mut diags);
    if write {
        write_text(file, &text)?;
    }
    if json {
        let output = TextOutput {
            path: relative(file, root),
            text: &text,
            diagnostics: &diags,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !write {
        println!("{text}");
    } else {
        println!("{} {}", style("updated").green(), relative(file, root));
        print_diagnostics(&diags);
    }
    Ok(())
}

fn run_undo(file: &Path, cfg: &Config, json: bool) -> anyhow::Result<()> {
    let mut session = EditSession::new(read_text(file)?, cfg.layout.clone());
    let removed = session.undo_last_comment(&mut Diagnostics::new());
    if removed.is_some() {
        write_text(file, session.text())?;
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&removed)?);
    } else {
        match removed {
            Some(comment) => println!("{}\n{comment}", style("removed:").bold()),
            None => println!("{}", style("no comment to remove").dim()),
        }
    }
    Ok(())
}

fn run_rubric(file: &Path, save: Option<&Path>, cfg: &Config, json: bool) -> anyhow::Result<()> {
    let mut diags = Diagnostics::new();
    let rubric = Rubric::load(file, &cfg.rubric, &mut diags)
        .with_context(|| format!("Failed to load rubric {}", file.display()))?;
    if let Some(out) = save {
        rubric
            .save(out, &cfg.rubric)
            .with_context(|| format!("Failed to save rubric {}", out.display()))?;
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&rubric)?);
    } else {
        print!("{rubric}");
        print_diagnostics(&diags);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_replace(
    root: &Path,
    mut request: RetroRequest,
    start: Option<&str>,
    end: Option<&str>,
    yes: bool,
    cfg: &Config,
    config_root: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let dirs = retro::student_dirs(root, &cfg.retro.ignore_dirs)
        .with_context(|| format!("Failed to list {}", root.display()))?;
    request.targets = retro::select_range(&dirs, start, end)?.to_vec();

    let term = Term::stdout();
    let mut confirm = |message: &str| {
        if yes {
            return true;
        }
        term.write_line(message)
            .and_then(|_| term.write_str(&format!("{} ", style("Proceed? [y/N]").bold())))
            .and_then(|_| term.read_line())
            .map(|answer| matches!(answer.trim(), "y" | "Y" | "yes"))
            .unwrap_or(false)
    };
    let report = retro::run(&request, cfg, &mut FsStore, &mut confirm)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if !report.confirmed {
        bail!("replace cancelled, no grade sheets were changed");
    }
    print_retro_report(&report, config_root);
    Ok(())
}

fn print_retro_report(report: &RetroReport, root: &Path) {
    for item in &report.items {
        let target = relative(&item.target, root);
        match item.outcome {
            RetroOutcome::Replaced { before, after } => println!(
                "  {} {target} ({before} -> {after} chars)",
                style("replaced").green()
            ),
            RetroOutcome::NoMatch => println!("  {} {target}", style("no match").dim()),
            RetroOutcome::DataLoss { before, after } => println!(
                "  {} {target} (would shrink {before} -> {after} chars)",
                style("skipped").red()
            ),
            RetroOutcome::Missing => println!("  {} {target}", style("missing").yellow()),
        }
    }
    println!(
        "\n{} of {} grade sheets updated",
        report.replaced(),
        report.items.len()
    );
}
