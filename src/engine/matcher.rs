//! Name-based entity lookup shared by handlers and queries
//!
//! Three tiers, first hit wins:
//! 1. exact case-insensitive equality, checked across every candidate first
//! 2. containment in either direction
//! 3. containment after stripping `-`, `_` and spaces
//!
//! Tiers 2 and 3 are tried together per candidate, in candidate order.

use crate::core::types::{EntityKind, Record};
use serde_json::Value;

/// Which tier produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    Exact,
    Contains,
    Normalized,
}

/// A candidate that matched a search term
#[derive(Debug, Clone, Copy)]
pub struct NameMatch<'a> {
    pub record: &'a Record,
    pub tier: MatchTier,
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .collect()
}

fn contains_either(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

/// Compare one term against one name, skipping the exact tier
fn fuzzy_tier(term: &str, name: &str) -> Option<MatchTier> {
    let term_lower = term.to_lowercase();
    let name_lower = name.to_lowercase();
    if contains_either(&term_lower, &name_lower) {
        return Some(MatchTier::Contains);
    }
    if contains_either(&normalize(term), &normalize(name)) {
        return Some(MatchTier::Normalized);
    }
    None
}

fn names<'a>(record: &'a Record, fields: &'a [&'a str]) -> impl Iterator<Item = &'a str> + 'a {
    fields
        .iter()
        .filter_map(move |field| record.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// Find the best candidate for `term` comparing the given name fields
pub fn match_by_fields<'a>(
    candidates: &'a [Record],
    fields: &[&str],
    term: &str,
) -> Option<NameMatch<'a>> {
    let term = term.trim();
    if term.is_empty() {
        return None;
    }
    let term_lower = term.to_lowercase();

    let exact = candidates.iter().find(|record| {
        names(record, fields).any(|name| name.to_lowercase() == term_lower)
    });
    if let Some(record) = exact {
        return Some(NameMatch {
            record,
            tier: MatchTier::Exact,
        });
    }

    candidates.iter().find_map(|record| {
        names(record, fields)
            .filter_map(|name| fuzzy_tier(term, name))
            .min()
            .map(|tier| NameMatch { record, tier })
    })
}

/// Find an entity of `kind` by its natural name fields
pub fn find_by_name<'a>(candidates: &'a [Record], kind: EntityKind, term: &str) -> Option<NameMatch<'a>> {
    let found = match_by_fields(candidates, kind.name_fields(), term);
    if let Some(found) = &found {
        tracing::debug!(
            "{} '{}' matched '{}' ({:?})",
            kind.label(),
            term,
            kind.display_name(found.record),
            found.tier
        );
    }
    found
}

/// Case-insensitive equality only, used where fuzzy matches would be wrong
pub fn find_exact<'a>(candidates: &'a [Record], field: &str, term: &str) -> Option<&'a Record> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return None;
    }
    candidates.iter().find(|record| {
        record
            .get(field)
            .and_then(Value::as_str)
            .map(|name| name.trim().to_lowercase() == term)
            .unwrap_or(false)
    })
}

/// Case-insensitive substring filter used by bulk deletes
pub fn filter_by_pattern<'a>(candidates: &'a [Record], field: &str, pattern: &str) -> Vec<&'a Record> {
    let pattern = pattern.trim().to_lowercase();
    if pattern.is_empty() {
        return Vec::new();
    }
    candidates
        .iter()
        .filter(|record| {
            record
                .get(field)
                .and_then(Value::as_str)
                .map(|name| name.to_lowercase().contains(&pattern))
                .unwrap_or(false)
        })
        .collect()
}
