//! Plain-text normalisation of extracted PDF pages.
//!
//! Pure and synchronous. Output has single spaces, no page-number footers,
//! paragraphs on one line each, and paragraphs separated by one blank line.

use std::sync::LazyLock;

use regex::Regex;

static FOOTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:\d+|page \d+(?: of \d+)?|- ?\d+ ?-)$").expect("valid footer regex")
});

/// Normalise a single block of text.
pub fn normalize(text: &str) -> String {
    normalize_pages(&[text])
}

/// Normalise a document given as page texts. Page boundaries become paragraph
/// breaks.
pub fn normalize_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for page in pages {
        lines.extend(clean_lines(page.as_ref()));
        lines.push(String::new());
    }
    unwrap_paragraphs(&lines)
}

/// Steps 1-3: line endings, whitespace, control characters, footers.
fn clean_lines(page: &str) -> impl Iterator<Item = String> + '_ {
    page.split(['\n', '\r'])
        .map(|raw| {
            let cleaned: String = raw
                .chars()
                .filter_map(|c| match c {
                    '\u{a0}' | '\t' => Some(' '),
                    c if c.is_control() => None,
                    c => Some(c),
                })
                .collect();
            cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
        })
        .filter(|line| !FOOTER_RE.is_match(line))
}

/// Join the lines of each paragraph and separate paragraphs with one blank
/// line. Blank runs collapse; leading and trailing blanks vanish.
fn unwrap_paragraphs(lines: &[String]) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in lines {
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        if current.is_empty() {
            current.push_str(line);
        } else if joins_hyphenated(&current, line) {
            current.pop();
            current.push_str(line);
        } else {
            current.push(' ');
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs.join("\n\n")
}

/// `applic-` + `ant` is one word; `self-` + `Employed` is not merged.
fn joins_hyphenated(current: &str, next: &str) -> bool {
    let mut tail = current.chars().rev();
    tail.next() == Some('-')
        && tail.next().is_some_and(char::is_alphabetic)
        && next.chars().next().is_some_and(char::is_lowercase)
}
