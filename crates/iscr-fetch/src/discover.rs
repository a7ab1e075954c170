//! Listing-page parsing: year links on the archive root, case document links on
//! a year page.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use iscr_core::DiscoveredCase;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(20\d{2})\b").expect("valid year regex"));
static YEAR_IN_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(20\d{2})").expect("valid href year regex"));

/// A year's listing page on the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearLink {
    pub year: i32,
    pub url: String,
}

/// Anchors in document order as `(text, href)`, both trimmed.
fn anchors(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim().to_string();
            let text = a
                .text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            Some((text, href))
        })
        .collect()
}

fn is_navigable(href: &str) -> bool {
    !href.is_empty() && !href.starts_with('#') && !href.to_ascii_lowercase().starts_with("javascript:")
}

/// Year links on the archive root page, newest first.
///
/// A link counts if its text contains a `20xx` year, or failing that its href
/// does. When several links carry the same year, one whose href mentions
/// `ISCR` wins.
pub fn parse_year_links(html: &str, base: &Url) -> Vec<YearLink> {
    // year -> (priority, url)
    let mut best: BTreeMap<i32, (u8, String)> = BTreeMap::new();

    for (text, href) in anchors(html) {
        if !is_navigable(&href) {
            continue;
        }
        let year = YEAR_RE
            .captures(&text)
            .or_else(|| YEAR_IN_HREF_RE.captures(&href))
            .and_then(|c| c[1].parse::<i32>().ok());
        let Some(year) = year else { continue };
        let Ok(url) = base.join(&href) else { continue };

        let priority = u8::from(href.to_ascii_lowercase().contains("iscr"));
        match best.get(&year) {
            Some((existing, _)) if *existing >= priority => {}
            _ => {
                best.insert(year, (priority, url.to_string()));
            }
        }
    }

    best.into_iter()
        .rev()
        .map(|(year, (_, url))| YearLink { year, url })
        .collect()
}

/// Whether an anchor points at a case document.
fn is_document_link(text: &str, href: &str) -> bool {
    let href_lower = href.to_ascii_lowercase();
    let text_lower = text.to_ascii_lowercase();
    href_lower.ends_with(".pdf")
        || text_lower.ends_with(".pdf")
        || (href.contains("FileId") && text_lower.contains(".pdf"))
}

/// Keep `[A-Za-z0-9._-]`, replacing anything else with `_`.
fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

fn strip_pdf_suffix(name: &str) -> &str {
    let Some(split) = name.len().checked_sub(4) else {
        return name;
    };
    match (name.get(..split), name.get(split..)) {
        (Some(stem), Some(suffix)) if suffix.eq_ignore_ascii_case(".pdf") => stem,
        _ => name,
    }
}

/// Case identifier for a document link: the file stem of the URL's last path
/// segment, or of the anchor text when the URL is an opaque `FileId` handle.
pub fn case_id_for(url: &Url, text: &str) -> Option<String> {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    let stem = if segment.to_ascii_lowercase().ends_with(".pdf") {
        strip_pdf_suffix(segment)
    } else {
        let text = text.rsplit(['/', '\\']).next().unwrap_or(text).trim();
        strip_pdf_suffix(text)
    };

    let id = sanitize_id(stem);
    (!id.is_empty()).then_some(id)
}

/// Case documents linked from a year page, sorted by URL.
///
/// Duplicate URLs collapse to one case. Distinct URLs that yield the same
/// identifier get `_2`, `_3`, ... suffixes in URL order, so the mapping is the
/// same on every run over the same listing. Across listings that grow, the run
/// manifest keeps each URL bound to the id it was first given.
pub fn parse_case_links(html: &str, page_url: &Url) -> Vec<DiscoveredCase> {
    let mut by_url: BTreeMap<String, String> = BTreeMap::new();

    for (text, href) in anchors(html) {
        if !is_navigable(&href) || !is_document_link(&text, &href) {
            continue;
        }
        let Ok(url) = page_url.join(&href) else { continue };
        let Some(id) = case_id_for(&url, &text) else { continue };
        by_url.entry(url.to_string()).or_insert(id);
    }

    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut cases = Vec::with_capacity(by_url.len());
    for (url, id) in by_url {
        let count = seen.entry(id.clone()).or_insert(0);
        *count += 1;
        let mut candidate = if *count == 1 {
            id.clone()
        } else {
            format!("{id}_{count}")
        };
        while used.contains(&candidate) {
            *count += 1;
            candidate = format!("{id}_{count}");
        }
        used.insert(candidate.clone());
        cases.push(DiscoveredCase::new(candidate, url));
    }
    cases
}
