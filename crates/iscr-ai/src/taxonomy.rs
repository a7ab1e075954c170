//! Adjudicative guideline taxonomy used for `guideline_flags`.
//!
//! Defaults to the thirteen SEAD-4 guidelines. The list is data: a file with
//! one `Letter|Name` per line replaces it.

use std::path::Path;

use crate::ClassificationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guideline {
    pub letter: char,
    pub name: String,
}

const SEAD4: [(char, &str); 13] = [
    ('A', "Allegiance to the United States"),
    ('B', "Foreign Influence"),
    ('C', "Foreign Preference"),
    ('D', "Sexual Behavior"),
    ('E', "Personal Conduct"),
    ('F', "Financial Considerations"),
    ('G', "Alcohol Consumption"),
    ('H', "Drug Involvement and Substance Misuse"),
    ('I', "Psychological Conditions"),
    ('J', "Criminal Conduct"),
    ('K', "Handling Protected Information"),
    ('L', "Outside Activities"),
    ('M', "Use of Information Technology"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxonomy {
    guidelines: Vec<Guideline>,
}

impl Taxonomy {
    pub fn sead4() -> Self {
        Self {
            guidelines: SEAD4
                .iter()
                .map(|(letter, name)| Guideline {
                    letter: *letter,
                    name: (*name).to_string(),
                })
                .collect(),
        }
    }

    /// Parse `Letter|Name` lines. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut guidelines: Vec<Guideline> = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((letter, name)) = line.split_once('|') else {
                return Err(format!("line {}: expected `Letter|Name`", n + 1));
            };
            let mut chars = letter.trim().chars();
            let (Some(letter), None) = (chars.next(), chars.next()) else {
                return Err(format!("line {}: guideline letter must be one character", n + 1));
            };
            let letter = letter.to_ascii_uppercase();
            let name = name.trim();
            if name.is_empty() {
                return Err(format!("line {}: empty guideline name", n + 1));
            }
            if guidelines.iter().any(|g| g.letter == letter) {
                return Err(format!("line {}: duplicate guideline {letter}", n + 1));
            }
            guidelines.push(Guideline {
                letter,
                name: name.to_string(),
            });
        }
        if guidelines.is_empty() {
            return Err("no guidelines defined".into());
        }
        Ok(Self { guidelines })
    }

    pub fn from_file(path: &Path) -> Result<Self, ClassificationError> {
        let taxonomy_error = |detail: String| ClassificationError::Taxonomy {
            path: path.to_path_buf(),
            detail,
        };
        let text = std::fs::read_to_string(path).map_err(|e| taxonomy_error(e.to_string()))?;
        Self::parse(&text).map_err(taxonomy_error)
    }

    pub fn guidelines(&self) -> &[Guideline] {
        &self.guidelines
    }

    /// Canonical name for a flag given as a letter (`F`, `Guideline F`,
    /// `F: ...`) or a name, case-insensitively.
    pub fn resolve(&self, flag: &str) -> Option<&str> {
        let flag = flag.trim();
        let bare = strip_prefix_ci(flag, "guideline").map_or(flag, str::trim_start);

        for candidate in [flag, bare] {
            if let Some(g) = self
                .guidelines
                .iter()
                .find(|g| g.name.eq_ignore_ascii_case(candidate))
            {
                return Some(&g.name);
            }
        }

        let mut chars = bare.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let rest = chars.as_str();
        let lettered = rest.is_empty()
            || (rest.starts_with([':', '.', ')', '-', ' '])
                && self.name_matches(letter, rest.trim_start_matches([':', '.', ')', '-', ' '])));
        if !lettered {
            return None;
        }
        self.guidelines
            .iter()
            .find(|g| g.letter == letter)
            .map(|g| g.name.as_str())
    }

    /// After a letter, the remainder must be empty or that guideline's name.
    fn name_matches(&self, letter: char, rest: &str) -> bool {
        rest.is_empty()
            || self
                .guidelines
                .iter()
                .any(|g| g.letter == letter && g.name.eq_ignore_ascii_case(rest.trim()))
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}
