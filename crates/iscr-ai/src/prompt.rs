//! Prompt template and input budgeting.

use std::borrow::Cow;
use std::fmt::Write;

use iscr_core::Outcome;

use crate::taxonomy::Taxonomy;

/// Rough characters-per-token ratio for English prose.
pub const CHARS_PER_TOKEN: usize = 4;

/// Longest rationale kept in the output table, in characters.
pub const MAX_RATIONALE_CHARS: usize = 300;

/// Marker placed where the middle of an over-long document was cut.
pub const ELISION: &str = "\n[...]\n";

pub fn system_prompt(taxonomy: &Taxonomy) -> String {
    let outcomes = Outcome::ALL
        .iter()
        .map(Outcome::as_str)
        .collect::<Vec<_>>()
        .join("|");

    let mut prompt = String::from(
        "You classify Industrial Security Clearance Review (ISCR) hearing decisions. \
         Read the decision and reply with exactly one JSON object and nothing else:\n",
    );
    let _ = writeln!(
        prompt,
        "{{\"outcome\": \"{outcomes}\", \"guideline_flags\": [\"<guideline name>\", ...], \
         \"rationale_summary\": \"<at most {MAX_RATIONALE_CHARS} characters>\"}}"
    );
    prompt.push_str(
        "\noutcome: Granted if the clearance is granted or continued, Denied if an \
         initial application is denied, Revoked if an existing clearance is revoked, \
         Unknown if the text does not state a result.\n\
         guideline_flags: every adjudicative guideline the decision discusses, using \
         these names exactly:\n",
    );
    for g in taxonomy.guidelines() {
        let _ = writeln!(prompt, "- {} (Guideline {})", g.name, g.letter);
    }
    prompt.push_str(
        "\nrationale_summary: one or two sentences on why the judge decided as they did.\n\
         Use only these three keys.",
    );
    prompt
}

pub fn user_prompt(case_id: &str, text: &str) -> String {
    format!("Case {case_id}\n\n{text}")
}

/// Follow-up sent after a reply that failed validation.
pub fn corrective_prompt(problem: &str) -> String {
    format!(
        "Your previous reply was rejected: {problem}. Reply again with only the JSON \
         object, using exactly the keys outcome, guideline_flags and rationale_summary."
    )
}

/// Fit `text` into roughly `max_tokens` tokens, keeping the head and the tail
/// of the document. The outcome is usually stated near the end and the
/// allegations near the start.
pub fn truncate_to_budget(text: &str, max_tokens: usize) -> Cow<'_, str> {
    let budget = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    let total = text.chars().count();
    if total <= budget {
        return Cow::Borrowed(text);
    }

    let keep = budget.saturating_sub(ELISION.chars().count());
    let head_chars = keep / 2;
    let tail_chars = keep - head_chars;

    let head_end = text
        .char_indices()
        .nth(head_chars)
        .map_or(text.len(), |(i, _)| i);
    let tail_start = text
        .char_indices()
        .nth(total - tail_chars)
        .map_or(text.len(), |(i, _)| i);

    Cow::Owned(format!(
        "{}{ELISION}{}",
        text[..head_end].trim_end(),
        text[tail_start..].trim_start()
    ))
}

/// First `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
