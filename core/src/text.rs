//! Text utilities shared by the rubric and grade-sheet parsers: word wrapping,
//! whitespace standardisation, token similarity and file/function name
//! detection.

use std::collections::HashSet;

/// Substrings that mark a term as a file name.
pub const EXTENSIONS: &[&str] = &[".py", ".txt", ".java"];

/// Delimiters used when splitting free prose into sentences.
pub const PROSE_DELIMITERS: &str = ".?!;";

/// Delimiters used by [`split_sentences`] callers that do not specify their own.
pub const DEFAULT_DELIMITERS: &str = ".;!?";

/// Widths below this do not wrap sensibly.
pub const MIN_RELIABLE_WIDTH: usize = 15;

/// Collapse every run of whitespace into a single space and trim both ends.
pub fn standardize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Number of leading whitespace characters.
pub fn leading_whitespace(text: &str) -> usize {
    text.chars().take_while(|c| c.is_whitespace()).count()
}

/// Reflow `line` into lines no wider than `max_chars`, prefixing every
/// continuation line with `indent` spaces.
///
/// Leading whitespace of the first line is kept; everything else is collapsed
/// to single spaces first, so wrapping already-wrapped text is stable. Words
/// are never split: a word longer than the remaining budget stays on an
/// over-long line.
pub fn format_comment(line: &str, max_chars: usize, indent: usize) -> String {
    if max_chars < MIN_RELIABLE_WIDTH {
        tracing::warn!(max_chars, "line width is too small to wrap reliably");
    }

    let mut chars: Vec<char> = std::iter::repeat(' ')
        .take(leading_whitespace(line))
        .collect();
    chars.extend(standardize(line).chars());

    let budget = max_chars as isize - indent as isize;
    let mut lines: Vec<String> = Vec::new();
    let mut start = 0usize;
    let mut last_space = 0usize;
    for (i, ch) in chars.iter().enumerate() {
        if ch.is_whitespace() {
            last_space = i;
        }
        let used = i as isize - (start + indent) as isize;
        if used >= budget && last_space > start {
            lines.push(chars[start..last_space].iter().collect());
            start = last_space + 1;
        }
    }
    lines.push(chars[start..].iter().collect());

    let separator = format!("\n{}", " ".repeat(indent));
    lines.join(&separator)
}

/// Share of tokens two strings have in common, in `0.0..=1.0`.
///
/// Compares lowercase word sets; when either side has no space the comparison
/// falls back to sets of characters. The score is `2 * |A ∩ B| / (|A| + |B|)`.
pub fn match_percent(a: &str, b: &str) -> f64 {
    let (left, right) = if !a.contains(' ') || !b.contains(' ') {
        (char_tokens(a), char_tokens(b))
    } else {
        (word_tokens(a), word_tokens(b))
    };
    let total = left.len() + right.len();
    if total == 0 {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    (shared * 2) as f64 / total as f64
}

fn word_tokens(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

fn char_tokens(text: &str) -> HashSet<String> {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_lowercase().to_string())
        .collect()
}

/// The first known extension contained in `term`, if any.
pub fn file_extension(term: &str) -> Option<&'static str> {
    if term.contains(' ') {
        tracing::debug!(term, "file extension lookup on a term with spaces");
    }
    EXTENSIONS.iter().copied().find(|ext| term.contains(ext))
}

/// Whether `term` looks like a function name: parentheses in order, or an
/// underscore. Terms containing spaces never qualify.
pub fn is_function_name(term: &str) -> bool {
    if term.contains(' ') {
        return false;
    }
    if let (Some(open), Some(close)) = (term.find('('), term.find(')')) {
        if open < close {
            return true;
        }
    }
    term.contains('_')
}

/// Whether `term` is a file name or function name.
pub fn is_code_reference(term: &str) -> bool {
    file_extension(term).is_some() || is_function_name(term)
}

/// Normalise a function reference to `snake_case()` form.
///
/// Spaces become underscores, camel humps become `_` + lowercase, and a
/// trailing `()` is added unless the name already ends with `)`. Names wrapped
/// entirely in parentheses are unwrapped. A leading `Class.` qualifier keeps
/// its case.
pub fn format_function_name(name: &str) -> String {
    let name = name.replace(' ', "_");
    let mut out = String::with_capacity(name.len() + 4);
    let mut rest = name.as_str();
    if let Some(dot) = name.find('.') {
        if name.chars().next().is_some_and(char::is_uppercase) {
            out.push_str(&name[..=dot]);
            rest = &name[dot + 1..];
        }
    }
    for ch in rest.chars() {
        if ch.is_uppercase() {
            out.push('_');
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }

    if out.is_empty() {
        return out;
    }
    if !out.ends_with(')') {
        out.push_str("()");
    } else if out.starts_with('(') {
        out = format!("{}()", &out[1..out.len() - 1]);
    }
    out
}

/// Split `line` after every delimiter character, keeping the delimiter at the
/// end of its segment.
///
/// A delimiter does not split when the token starting at it (up to the next
/// whitespace) is a file or function name, so `TestResults.txt!` and
/// `AutoComplete._init_()?` stay whole.
pub fn split_sentences(line: &str, delimiters: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut segments = Vec::new();
    let mut start = 0usize;
    for (i, ch) in chars.iter().enumerate() {
        if !delimiters.contains(*ch) {
            continue;
        }
        let end = chars[i..]
            .iter()
            .position(|c| c.is_whitespace())
            .map_or(chars.len(), |offset| i + offset);
        let token: String = chars[i..end].iter().collect();
        if is_code_reference(&token) {
            continue;
        }
        segments.push(chars[start..=i].iter().collect());
        start = i + 1;
    }
    if start < chars.len() {
        segments.push(chars[start..].iter().collect());
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardize_collapses_all_whitespace() {
        assert_eq!(
            standardize("   Here is \t a lot\nof   random       whitespace.   "),
            "Here is a lot of random whitespace."
        );
    }

    #[test]
    fn wraps_to_small_widths() {
        assert_eq!(
            format_comment(
                "Really good job on this lab, particularly in-line comments!",
                15,
                3
            ),
            "Really good job\n   on this lab,\n   particularly\n   in-line\n   comments!"
        );
    }

    #[test]
    fn rewrapping_does_not_stack_newlines() {
        let wrapped = format_comment(
            "~ Too many comments also makes code difficult to navigate/read! Try to\n   just get at the bare minimum of functionality/explanation.",
            75,
            3,
        );
        assert_eq!(
            wrapped,
            "~ Too many comments also makes code difficult to navigate/read! Try to just\n   get at the bare minimum of functionality/explanation."
        );
        assert_eq!(format_comment(&wrapped, 75, 3), wrapped);
    }

    #[test]
    fn wrapping_is_idempotent_with_leading_indent() {
        let text = "   -- dayOfWeek doesn't return all days of the week and the helper that computes the offset is never called";
        let once = format_comment(text, 69, 6);
        let twice = format_comment(&once, 69, 6);
        assert_eq!(once, twice);
        assert!(once.starts_with("   -- dayOfWeek"));
        assert!(once.lines().all(|l| l.chars().count() <= 69));
    }

    #[test]
    fn long_words_are_not_split() {
        let out = format_comment("see averyveryverylongidentifier_name here", 15, 3);
        assert!(out.contains("averyveryverylongidentifier_name"));
    }

    #[test]
    fn match_percent_uses_words_or_letters() {
        assert_eq!(match_percent("A single comment.", "A single comment."), 1.0);
        assert_eq!(
            match_percent("A single comment.", "This very different thing to say."),
            0.0
        );
        let close = match_percent("A single comment.", "A different comment.");
        assert!((close - 0.67).abs() < 0.01);
        let longer = match_percent(
            "This is a longer comment about code and what you should and should not do.",
            "Here's a longer comment about what you should not do.",
        );
        assert!((longer - 0.78).abs() < 0.01);
        assert_eq!(match_percent("AC._match_words", "AutoComplete._match_words()"), 0.8);
        assert_eq!(match_percent("ABCDEFG", "abcdefg"), 1.0);
    }

    #[test]
    fn detects_file_extensions() {
        assert_eq!(file_extension("whatever.py"), Some(".py"));
        assert_eq!(file_extension("hello.txt"), Some(".txt"));
        assert_eq!(file_extension("why.javaDoWeIncludeThis"), Some(".java"));
        assert_eq!(file_extension("read_names()"), None);
    }

    #[test]
    fn detects_function_names() {
        assert!(!is_function_name("whatever.py"));
        assert!(is_function_name("read_names"));
        assert!(is_function_name("frequency()"));
        assert!(is_function_name("(probablyNotGreat)"));
        assert!(!is_function_name("(not good either)"));
        assert!(!is_function_name(")backwards("));
    }

    #[test]
    fn normalises_function_names() {
        assert_eq!(format_function_name("read_names"), "read_names()");
        assert_eq!(format_function_name("frequency()"), "frequency()");
        assert_eq!(format_function_name("deCamelCase"), "de_camel_case()");
        assert_eq!(format_function_name("deCamelCase()"), "de_camel_case()");
        assert_eq!(format_function_name("(probablyNotGreat)"), "probably_not_great()");
        assert_eq!(format_function_name("(not good either)"), "not_good_either()");
        assert_eq!(format_function_name("use_with_caution(arg)"), "use_with_caution(arg)");
        assert_eq!(format_function_name("use case(i dunno)"), "use_case(i_dunno)");
        assert_eq!(
            format_function_name("AutoComplete.match_words"),
            "AutoComplete.match_words()"
        );
        assert_eq!(format_function_name("AC.match_words"), "AC.match_words()");
        assert_eq!(format_function_name(""), "");
    }

    #[test]
    fn splits_sentences_keeping_delimiters() {
        assert_eq!(
            split_sentences(
                "This is the first sentence. This is the second! And the third!",
                DEFAULT_DELIMITERS
            ),
            vec![
                "This is the first sentence.",
                " This is the second!",
                " And the third!"
            ]
        );
        assert_eq!(split_sentences("One. Two! Three?", DEFAULT_DELIMITERS).len(), 3);
        assert_eq!(
            split_sentences("No punctuation", DEFAULT_DELIMITERS),
            vec!["No punctuation"]
        );
        assert!(split_sentences("", DEFAULT_DELIMITERS).is_empty());
    }

    #[test]
    fn does_not_split_inside_code_references() {
        for text in [
            "Try not to split on TestResults.txt!",
            "Do not split python.py in two.",
            "How should .remove() be split?",
            "What about AutoComplete._init_()?",
            "Look at helper.py",
        ] {
            assert_eq!(split_sentences(text, PROSE_DELIMITERS), vec![text], "{text}");
        }
    }
}
