//! Search and scoring over the in-memory entry list.
//!
//! Plain linear scans: field-weighted text matching for free queries, a
//! tiered precision ranking for URL lookups, and the hygiene scans
//! (weak passwords, duplicates). Works on `EntryRecord` slices so the
//! vault can run it against a snapshot without holding the write lock.

use std::collections::HashMap;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use url::Url;

use crate::models::{EntryRecord, ScoredEntry, WeakEntry};

/// Field weights: title dominates, then url/username/tags, notes last.
const WEIGHT_TITLE: f64 = 3.0;
const WEIGHT_URL: f64 = 2.5;
const WEIGHT_USERNAME: f64 = 2.0;
const WEIGHT_TAGS: f64 = 2.0;
const WEIGHT_NOTES: f64 = 1.0;
const SCORE_CAP: f64 = 10.0;

/// URL tiers; fixed descending scores so precision always wins.
const URL_EXACT: f64 = 10.0;
const URL_DOMAIN: f64 = 8.0;
const URL_SUBDOMAIN: f64 = 6.0;
const URL_TOKEN_OVERLAP: f64 = 4.0;
const URL_PARTIAL_TOKEN: f64 = 2.0;

const COMMON_PASSWORDS: [&str; 10] = [
    "password", "123456", "qwerty", "abc123", "password123", "admin", "letmein", "welcome",
    "monkey", "dragon",
];

const KEYBOARD_PATTERNS: [&str; 8] = [
    "qwerty", "asdf", "zxcv", "123456", "098765", "qwertyuiop", "asdfghjkl", "zxcvbnm",
];

/// Fields a text search may run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Title,
    Username,
    Url,
    Notes,
    Tags,
}

impl SearchField {
    fn weight(self) -> f64 {
        match self {
            SearchField::Title => WEIGHT_TITLE,
            SearchField::Url => WEIGHT_URL,
            SearchField::Username => WEIGHT_USERNAME,
            SearchField::Tags => WEIGHT_TAGS,
            SearchField::Notes => WEIGHT_NOTES,
        }
    }

    const ALL: [SearchField; 5] = [
        SearchField::Title,
        SearchField::Username,
        SearchField::Url,
        SearchField::Notes,
        SearchField::Tags,
    ];
}

/// Options for `search`.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Restrict matching to these fields; all of them when empty.
    pub fields: Vec<SearchField>,
    pub case_sensitive: bool,
    /// Whole-field equality instead of substring/fuzzy matching.
    pub exact: bool,
    /// Filter: every listed tag must be present.
    pub tags: Vec<String>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            case_sensitive: false,
            exact: false,
            tags: Vec::new(),
            limit: None,
        }
    }
}

/// Score entries against a free-text query and return them best-first.
/// Ties are broken by most recent modification.
pub fn search(entries: &[EntryRecord], query: &str, opts: &SearchOptions) -> Vec<ScoredEntry> {
    let matcher = SkimMatcherV2::default();
    let fields: &[SearchField] = if opts.fields.is_empty() {
        &SearchField::ALL
    } else {
        &opts.fields
    };

    let mut results: Vec<ScoredEntry> = entries
        .iter()
        .filter(|e| has_all_tags(e, &opts.tags))
        .filter_map(|entry| {
            let score = if query.is_empty() {
                1.0
            } else {
                relevance(entry, query, fields, opts, &matcher)
            };
            (score > 0.0).then(|| ScoredEntry {
                entry: entry.clone(),
                relevance: score.min(SCORE_CAP),
            })
        })
        .collect();

    sort_scored(&mut results);
    if let Some(limit) = opts.limit {
        results.truncate(limit);
    }
    results
}

fn has_all_tags(entry: &EntryRecord, required: &[String]) -> bool {
    required.iter().all(|tag| {
        entry
            .tags
            .iter()
            .any(|have| have.eq_ignore_ascii_case(tag))
    })
}

fn relevance(
    entry: &EntryRecord,
    query: &str,
    fields: &[SearchField],
    opts: &SearchOptions,
    matcher: &SkimMatcherV2,
) -> f64 {
    let mut total = 0.0;
    for &field in fields {
        let value = field_value(entry, field);
        total += field_score(&value, query, field.weight(), opts, matcher);
    }
    total
}

fn field_value(entry: &EntryRecord, field: SearchField) -> String {
    match field {
        SearchField::Title => entry.title.clone(),
        SearchField::Username => entry.username.clone(),
        SearchField::Url => entry.url.clone(),
        SearchField::Notes => entry.notes.clone(),
        SearchField::Tags => entry.tags.join(" "),
    }
}

fn field_score(
    value: &str,
    query: &str,
    weight: f64,
    opts: &SearchOptions,
    matcher: &SkimMatcherV2,
) -> f64 {
    if value.is_empty() {
        return 0.0;
    }
    let (value_cmp, query_cmp) = if opts.case_sensitive {
        (value.to_string(), query.to_string())
    } else {
        (value.to_lowercase(), query.to_lowercase())
    };

    if opts.exact {
        return if value_cmp == query_cmp { weight } else { 0.0 };
    }

    if value_cmp.contains(&query_cmp) {
        // Matches at the start of the field count more.
        let mut score = if value_cmp.starts_with(&query_cmp) {
            weight
        } else {
            weight * 0.7
        };
        // Whole-word bonus.
        let padded = format!(" {value_cmp} ");
        if padded.contains(&format!(" {query_cmp} ")) {
            score *= 1.2;
        }
        return score;
    }

    // Fuzzy fallback, heavily discounted against substring hits.
    match matcher.fuzzy_match(&value_cmp, &query_cmp) {
        Some(s) if s > 0 => weight * 0.3,
        _ => 0.0,
    }
}

fn sort_scored(results: &mut [ScoredEntry]) {
    results.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.entry.modified.cmp(&a.entry.modified))
    });
}

/// Tiered URL lookup: exact URL > exact domain > subdomain > token
/// overlap > partial token. The lower tiers require `fuzzy`.
pub fn search_by_url(entries: &[EntryRecord], raw_url: &str, fuzzy: bool) -> Vec<ScoredEntry> {
    let query_url = normalize_url(raw_url);
    let query_domain = host_of(raw_url);

    let mut results: Vec<ScoredEntry> = entries
        .iter()
        .filter(|e| !e.url.trim().is_empty())
        .filter_map(|entry| {
            let score = url_relevance(&entry.url, &query_url, query_domain.as_deref(), fuzzy);
            (score > 0.0).then(|| ScoredEntry {
                entry: entry.clone(),
                relevance: score,
            })
        })
        .collect();

    sort_scored(&mut results);
    results
}

fn url_relevance(entry_url: &str, query_url: &str, query_domain: Option<&str>, fuzzy: bool) -> f64 {
    if normalize_url(entry_url) == *query_url {
        return URL_EXACT;
    }
    let (Some(entry_domain), Some(query_domain)) = (host_of(entry_url), query_domain) else {
        return 0.0;
    };

    if entry_domain == query_domain {
        return URL_DOMAIN;
    }
    if !fuzzy {
        return 0.0;
    }

    // gist.github.com vs github.com, either direction.
    if entry_domain.ends_with(&format!(".{query_domain}"))
        || query_domain.ends_with(&format!(".{entry_domain}"))
    {
        return URL_SUBDOMAIN;
    }

    let entry_tokens: Vec<&str> = entry_domain.split('.').collect();
    let query_tokens: Vec<&str> = query_domain.split('.').collect();
    let common = query_tokens
        .iter()
        .filter(|t| entry_tokens.contains(t))
        .count();
    if common >= 2 {
        return URL_TOKEN_OVERLAP;
    }
    if query_tokens
        .iter()
        .any(|t| t.len() > 3 && entry_domain.contains(t))
    {
        return URL_PARTIAL_TOKEN;
    }
    0.0
}

fn normalize_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_lowercase()
}

fn host_of(raw: &str) -> Option<String> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    Url::parse(&candidate)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// Entries whose passwords fail basic hygiene, with per-entry reasons.
pub fn find_weak_passwords(
    entries: &[EntryRecord],
    min_length: usize,
    require_complexity: bool,
) -> Vec<WeakEntry> {
    entries
        .iter()
        .filter_map(|entry| {
            let password = entry.password.as_deref().unwrap_or_default();
            if password.is_empty() {
                return None;
            }
            let mut reasons = Vec::new();
            if password.chars().count() < min_length {
                reasons.push(format!("shorter than {min_length} characters"));
            }
            if require_complexity && class_count(password) < 3 {
                reasons.push("low character-class diversity".to_string());
            }
            let lower = password.to_lowercase();
            if COMMON_PASSWORDS.contains(&lower.as_str()) {
                reasons.push("common password".to_string());
            }
            if KEYBOARD_PATTERNS.iter().any(|p| lower.contains(p)) {
                reasons.push("keyboard pattern".to_string());
            }
            (!reasons.is_empty()).then(|| WeakEntry {
                id: entry.id.clone(),
                title: entry.title.clone(),
                group: entry.group.clone(),
                reasons,
            })
        })
        .collect()
}

fn class_count(password: &str) -> usize {
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_alphanumeric());
    [has_upper, has_lower, has_digit, has_symbol]
        .iter()
        .filter(|&&b| b)
        .count()
}

/// Group entries sharing a normalized title/username/url signature.
/// Only groups with more than one member are returned.
pub fn find_duplicates(entries: &[EntryRecord]) -> Vec<Vec<EntryRecord>> {
    let mut buckets: HashMap<String, Vec<EntryRecord>> = HashMap::new();
    for entry in entries {
        let signature = format!(
            "title:{}|user:{}|url:{}",
            entry.title.trim().to_lowercase(),
            entry.username.trim().to_lowercase(),
            normalize_url(&entry.url),
        );
        buckets
            .entry(signature)
            .or_default()
            .push(entry.clone().redacted());
    }
    let mut groups: Vec<Vec<EntryRecord>> = buckets
        .into_values()
        .filter(|group| group.len() > 1)
        .collect();
    groups.sort_by(|a, b| b.len().cmp(&a.len()));
    groups
}
