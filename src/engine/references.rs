//! Reference resolution - rewrites `$name` / `$name.field` tokens in operation data
//!
//! The table lives for exactly one batch. Only operations that already ran
//! can be referenced; anything else resolves to `null`.

use crate::core::types::Record;
use ahash::AHashMap;
use serde_json::Value;

/// Field used when a token names no field (`$p1` means `$p1.id`)
pub const IMPLICIT_FIELD: &str = "id";

/// A parsed `$name[.field]` token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub name: &'a str,
    pub field: &'a str,
}

/// Parse a reference token; `None` for anything that is not a `$` string
pub fn parse_token(text: &str) -> Option<Token<'_>> {
    let rest = text.strip_prefix('$')?;
    Some(match rest.split_once('.') {
        Some((name, field)) => Token { name, field },
        None => Token {
            name: rest,
            field: IMPLICIT_FIELD,
        },
    })
}

/// Name of the reference a value points at, if it is a token
pub fn token_name(value: &Value) -> Option<&str> {
    value.as_str().and_then(parse_token).map(|token| token.name)
}

/// Snapshots of entities created earlier in the batch, by reference name
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: AHashMap<String, Value>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind (or rebind) a name to an entity snapshot
    pub fn bind(&mut self, name: impl Into<String>, snapshot: Value) {
        let name = name.into();
        if self.entries.insert(name.clone(), snapshot).is_some() {
            tracing::debug!("Reference '{}' rebound", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value a single token stands for; `null` when the name or field is unknown
    pub fn lookup(&self, token: Token<'_>) -> Value {
        self.entries
            .get(token.name)
            .and_then(|snapshot| snapshot.get(token.field))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Resolve one top-level value
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value.as_str().and_then(parse_token) {
            Some(token) => {
                let resolved = self.lookup(token);
                if resolved.is_null() {
                    tracing::debug!("Reference {} resolved to null", value);
                }
                resolved
            }
            None => value.clone(),
        }
    }
}

/// Substitute every top-level token in `data`
///
/// Nested arrays and objects are literals and pass through untouched.
pub fn resolve_data(data: &Record, table: &ReferenceTable) -> Record {
    data.iter()
        .map(|(key, value)| (key.clone(), table.resolve_value(value)))
        .collect()
}
