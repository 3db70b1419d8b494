//! Canonicalization of the free text typed into dispatch sheets.

use std::collections::HashMap;

use chrono::NaiveDate;
use log::debug;
use regex::Regex;

use crate::config::*;

// A branch rule with its pattern compiled and its needles lowercased.
#[derive(Debug, Clone)]
enum CompiledBranchRule {
    Pattern(Regex, String),
    Both(String, String, String),
    Contains(String, String),
}

/// Route text split into its canonical code and the special-route marker.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NormalizedRoute {
    pub route: String,
    pub is_special: bool,
}

/// The text normalizer. Built once from read-only tables, then shared by reference.
#[derive(Debug, Clone)]
pub struct Normalizer {
    tables: NormalizerTables,
    branch_rules: Vec<CompiledBranchRule>,
    letters_re: Regex,
    special_suffix_re: Regex,
    date_res: [Regex; 2],
    vt_punct_re: Regex,
    spaces_re: Regex,
    electric_res: Vec<Regex>,
    bus_re: Regex,
    route_split_re: Regex,
    hyphens_re: Regex,
    label_branch_paren_re: Regex,
    label_branch_word_re: Regex,
    lat_to_cyr: HashMap<char, char>,
    cyr_to_lat: HashMap<char, char>,
}

fn compile(pattern: &str) -> Result<Regex, ReconError> {
    Regex::new(pattern).map_err(|e| ReconError::InvalidTables(format!("{}: {}", pattern, e)))
}

impl Normalizer {
    pub fn new(tables: &NormalizerTables) -> Result<Normalizer, ReconError> {
        let marker = tables.special_route_marker.trim().to_lowercase();
        if marker.is_empty() {
            return Err(ReconError::InvalidTables(
                "the special route marker is empty".to_string(),
            ));
        }

        let mut branch_rules: Vec<CompiledBranchRule> = Vec::new();
        for rule in tables.branch_rules.iter() {
            let compiled = match rule {
                BranchRule::Pattern { pattern, code } => {
                    CompiledBranchRule::Pattern(compile(pattern)?, code.clone())
                }
                BranchRule::Both {
                    first,
                    second,
                    code,
                } => CompiledBranchRule::Both(first.to_lowercase(), second.to_lowercase(), code.clone()),
                BranchRule::Contains { needle, code } => {
                    CompiledBranchRule::Contains(needle.to_lowercase(), code.clone())
                }
            };
            branch_rules.push(compiled);
        }

        let lat_to_cyr: HashMap<char, char> = tables.lookalikes.iter().cloned().collect();
        // Several latin letters may share a cyrillic look-alike: the last one listed wins.
        let mut cyr_to_lat: HashMap<char, char> = HashMap::new();
        for (lat, cyr) in tables.lookalikes.iter() {
            cyr_to_lat.insert(*cyr, *lat);
        }

        Ok(Normalizer {
            tables: tables.clone(),
            branch_rules,
            letters_re: compile(r"\p{L}+")?,
            special_suffix_re: compile(&format!(
                r"(?i)\s*/\s*{}(?:\s*-\s*[\w\-]+)?",
                regex::escape(&marker)
            ))?,
            date_res: [
                compile(r"\d{2}\.\d{2}\.\d{4}")?,
                compile(r"\d{2}-\d{2}-\d{4}")?,
            ],
            vt_punct_re: compile(r"[^\w\s\-]")?,
            spaces_re: compile(r"\s+")?,
            electric_res: vec![
                compile(r"элект\w*бус")?,
                compile(r"электр\w*[\s\-]*авто?бус")?,
                compile(r"\bэл\b\s*авто?бус")?,
                compile(r"\bэлектроавто?бус\b")?,
            ],
            bus_re: compile(r"\bавто?бус\b")?,
            route_split_re: compile(r"[^0-9A-Za-zА-Яа-яЁё\-]+")?,
            hyphens_re: compile(r"-+")?,
            label_branch_paren_re: compile(r"([А-ЯЁA-Z]{2,})\s*\(")?,
            label_branch_word_re: compile(r"\b([А-ЯЁA-Z]{2,})\b")?,
            lat_to_cyr,
            cyr_to_lat,
        })
    }

    pub fn with_default_tables() -> Result<Normalizer, ReconError> {
        Normalizer::new(&NormalizerTables::default())
    }

    pub fn tables(&self) -> &NormalizerTables {
        &self.tables
    }

    /// Classifies a branch or depot name into a branch code.
    ///
    /// The result is not guaranteed to be an allowed code: when no rule applies,
    /// the text up to the first parenthesis is returned as is. Use
    /// [Normalizer::is_allowed_branch] to validate it.
    pub fn normalize_branch(&self, text: &str) -> String {
        let trimmed = text.trim();
        let lower = trimmed.to_lowercase();
        if lower.is_empty() || lower == "nan" || lower == "none" {
            return "".to_string();
        }

        for rule in self.branch_rules.iter() {
            let hit = match rule {
                CompiledBranchRule::Pattern(re, code) => re.is_match(&lower).then_some(code),
                CompiledBranchRule::Both(first, second, code) => {
                    (lower.contains(first.as_str()) && lower.contains(second.as_str())).then_some(code)
                }
                CompiledBranchRule::Contains(needle, code) => {
                    lower.contains(needle.as_str()).then_some(code)
                }
            };
            if let Some(code) = hit {
                return code.clone();
            }
        }

        let tokens: Vec<&str> = self.letters_re.find_iter(&lower).map(|m| m.as_str()).collect();
        for (abbr, code) in self.tables.branch_abbreviations.iter() {
            if tokens.contains(&abbr.as_str()) {
                return code.clone();
            }
        }

        let head = match trimmed.find('(') {
            Some(idx) => trimmed[..idx].trim(),
            None => trimmed,
        };
        if head.is_empty() {
            trimmed.to_string()
        } else {
            head.to_string()
        }
    }

    pub fn is_allowed_branch(&self, code: &str) -> bool {
        self.tables.allowed_branches.iter().any(|b| b == code)
    }

    /// Branch as written inside keys: the code behind the key marker.
    pub fn branch_key_token(&self, code: &str) -> String {
        if code.starts_with(self.tables.branch_key_marker.as_str()) {
            return code.to_string();
        }
        format!("{}{}", self.tables.branch_key_marker, code)
    }

    /// Removes every special-route suffix. Idempotent.
    pub fn strip_special_suffix(&self, text: &str) -> (String, bool) {
        let mut current = text.trim().to_string();
        let mut found = false;
        // Removing one suffix may expose another one: repeat until nothing matches.
        while self.special_suffix_re.is_match(&current) {
            found = true;
            current = self
                .special_suffix_re
                .replace_all(&current, "")
                .trim()
                .to_string();
        }
        (current, found)
    }

    pub fn normalize_route(&self, text: &str) -> NormalizedRoute {
        let cleaned = text.trim().replace('_', "").to_lowercase();
        let (route, is_special) = self.strip_special_suffix(&cleaned);
        NormalizedRoute { route, is_special }
    }

    pub fn normalize_vehicle_type(&self, text: &str) -> Option<VehicleType> {
        let lower = text.to_lowercase().replace('\u{a0}', " ");
        let no_punct = self.vt_punct_re.replace_all(&lower, " ");
        let s = self.spaces_re.replace_all(&no_punct, " ").trim().to_string();
        if s.is_empty() {
            return None;
        }
        // Trams and trolleybuses first: their names would otherwise reach the bus patterns.
        let res = if s.contains("трамва") {
            Some(VehicleType::Tram)
        } else if s.contains("тролл") {
            Some(VehicleType::Trolleybus)
        } else if self.electric_res.iter().any(|re| re.is_match(&s)) {
            Some(VehicleType::ElectricBus)
        } else if self.bus_re.is_match(&s) {
            Some(VehicleType::Bus)
        } else {
            None
        };
        debug!("normalize_vehicle_type: {:?} -> {:?}", text, res);
        res
    }

    /// Finds a `DD.MM.YYYY` or `DD-MM-YYYY` date in the text.
    ///
    /// Valid dates are rendered as `DD.MM.YYYY`. Invalid ones are kept as matched.
    pub fn extract_date(&self, text: &str) -> Option<String> {
        for re in self.date_res.iter() {
            if let Some(m) = re.find(text) {
                let s = m.as_str().replace('-', ".");
                return match NaiveDate::parse_from_str(&s, "%d.%m.%Y") {
                    Ok(d) => Some(d.format("%d.%m.%Y").to_string()),
                    Err(_) => Some(s),
                };
            }
        }
        None
    }

    /// Tokens of the text that may be a route number, with their look-alike variants.
    pub fn route_candidates(&self, text: &str) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        for token in self.route_split_re.split(text.trim()) {
            let token = token.trim();
            if token.is_empty() || !token.chars().any(|c| c.is_ascii_digit()) {
                continue;
            }
            let upper = token.to_uppercase();
            let clean = self
                .hyphens_re
                .replace_all(&upper, "-")
                .trim_matches('-')
                .to_string();
            let to_cyr: String = clean
                .chars()
                .map(|c| *self.lat_to_cyr.get(&c).unwrap_or(&c))
                .collect();
            let to_lat: String = clean
                .chars()
                .map(|c| *self.cyr_to_lat.get(&c).unwrap_or(&c))
                .collect();
            candidates.push(clean);
            candidates.push(to_cyr);
            candidates.push(to_lat);
        }
        let mut res: Vec<String> = Vec::new();
        for c in candidates {
            if !c.is_empty() && !res.contains(&c) {
                res.push(c);
            }
        }
        res
    }

    /// The branch named in a reference label, as a key token.
    pub fn label_branch(&self, label: &str) -> Option<String> {
        let raw = self
            .label_branch_paren_re
            .captures(label)
            .and_then(|c| c.get(1))
            .or_else(|| {
                self.label_branch_word_re
                    .captures_iter(label)
                    .last()
                    .and_then(|c| c.get(1))
            })
            .map(|m| m.as_str())?;
        Some(self.branch_key_token(raw))
    }

    /// The transport marker of a reference label: `(авт` or `(эл`.
    pub fn label_transport(&self, label: &str) -> Option<VehicleType> {
        let low = label.to_lowercase();
        if low.contains("(авт") || low.contains(" авт") {
            Some(VehicleType::Bus)
        } else if low.contains("(эл") || low.contains(" эл") {
            Some(VehicleType::ElectricBus)
        } else {
            None
        }
    }
}

/// Parses a number out of a human-typed cell. Never fails: unparsable input is zero.
///
/// Spaces (including non-breaking ones) are thousands separators and a comma
/// is a decimal point.
pub fn normalize_number(text: &str) -> f64 {
    let s: String = text
        .chars()
        .filter(|c| *c != '\u{a0}' && *c != ' ')
        .map(|c| if c == ',' { '.' } else { c })
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    match s.as_str() {
        "" | "-" | "." => 0.0,
        _ => s.parse::<f64>().unwrap_or(0.0),
    }
}

/// A blank cell stays unknown, anything else goes through [normalize_number].
pub fn optional_number(text: Option<&str>) -> Option<f64> {
    match text.map(|s| s.trim()) {
        None | Some("") => None,
        Some(s) => Some(normalize_number(s)),
    }
}

/// Key text coming from another sheet: non-breaking spaces and runs of
/// whitespace become one space, edges are trimmed.
pub fn normalize_key_text(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Reads the special-route column. `None` when the cell says nothing conclusive.
pub fn parse_special_flag(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "ктр" | "true" | "да" | "1" | "правда" | "yes" => Some(true),
        "не ктр" | "false" | "нет" | "0" | "ложь" | "no" => Some(false),
        _ => None,
    }
}

pub fn is_truthy(text: &str) -> bool {
    matches!(
        text.trim().to_uppercase().as_str(),
        "TRUE" | "ПРАВДА" | "1"
    )
}
