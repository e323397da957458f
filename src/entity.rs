//! Entity classification of sender addresses.
//!
//! An entity is a named counterparty (e.g. a supplier) recognized by a list
//! of address patterns. Patterns come in two forms:
//!
//! - a literal address: `billing@acme.com`
//! - a wildcard domain: `*@acme.com` (matches the domain and its subdomains)
//!
//! Pattern order is a user-visible tie-break rule: the FIRST matching pattern
//! wins, so the list is never re-sorted here.

use serde::{Deserialize, Serialize};

/// A user-managed entity with its ordered pattern list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    /// Raw pattern strings, in user-defined order.
    pub patterns: Vec<String>,
}

/// A parsed address pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Case-insensitive full-address equality.
    Literal(String),
    /// `*@domain` — matches `user@domain` and `user@sub.domain`.
    Domain(String),
}

impl Pattern {
    /// Parse a raw pattern string. `*@domain` becomes [`Pattern::Domain`],
    /// anything else a lowercase [`Pattern::Literal`].
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().to_lowercase();
        match trimmed.strip_prefix("*@") {
            Some(domain) if !domain.is_empty() => Pattern::Domain(domain.to_string()),
            _ => Pattern::Literal(trimmed),
        }
    }

    /// Whether `address` (already lowercased) matches this pattern.
    fn matches(&self, address: &str) -> bool {
        match self {
            Pattern::Literal(lit) => address == lit,
            Pattern::Domain(domain) => {
                address.ends_with(&format!("@{domain}"))
                    || address.ends_with(&format!(".{domain}"))
            }
        }
    }
}

/// Extract the bare sender address from a `From:` header value.
///
/// Prefers the bracketed form when present:
/// - `"Acme Billing <billing@acme.com>"` → `billing@acme.com`
/// - `"billing@acme.com"` → `billing@acme.com`
///
/// The result is trimmed and lowercased; matching is case-insensitive anyway,
/// but normalizing here keeps downstream comparisons simple.
pub fn sender_address(from_header: &str) -> String {
    let trimmed = from_header.trim();
    if let Some(start) = trimmed.rfind('<') {
        if let Some(end) = trimmed.rfind('>') {
            if end > start {
                return trimmed[start + 1..end].trim().to_lowercase();
            }
        }
    }
    trimmed.to_lowercase()
}

/// Flatten entities into an ordered `(entity name, pattern)` table.
///
/// Entity order and per-entity pattern order are both preserved.
pub fn pattern_table(entities: &[Entity]) -> Vec<(String, Pattern)> {
    let mut table = Vec::new();
    for entity in entities {
        for raw in &entity.patterns {
            table.push((entity.name.clone(), Pattern::parse(raw)));
        }
    }
    table
}

/// Return the first entity whose pattern matches the sender address.
///
/// `address` is expected in the normalized form produced by
/// [`sender_address`]. Returns `None` when nothing matches — callers render
/// that as the `"Unknown"` entity downstream.
pub fn match_entity<'a>(address: &str, patterns: &'a [(String, Pattern)]) -> Option<&'a str> {
    let address = address.to_lowercase();
    patterns
        .iter()
        .find(|(_, pattern)| pattern.matches(&address))
        .map(|(name, _)| name.as_str())
}
