//! PII detection and redaction.
//!
//! Every pattern runs against the text already masked by the patterns before
//! it, so the order of [`PATTERNS`] decides which type claims a span. Emails go
//! first so their digits are never read as numbers, and card numbers go before
//! tax ids, phones and identity numbers so a card can't be split by a shorter
//! numeric pattern and leak a fragment.
//!
//! Dotted identity numbers (`10.000.001`) are not matched. Widening the
//! identity pattern to cover them needs a requirements review because it
//! over-redacts amounts and dates.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::PiiLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    IdentityNumber,
    TaxId,
    CardNumber,
    Phone,
    Email,
    Other,
}

impl PiiType {
    pub const ALL: [PiiType; 6] = [
        PiiType::IdentityNumber,
        PiiType::TaxId,
        PiiType::CardNumber,
        PiiType::Phone,
        PiiType::Email,
        PiiType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PiiType::IdentityNumber => "identity_number",
            PiiType::TaxId => "tax_id",
            PiiType::CardNumber => "card_number",
            PiiType::Phone => "phone",
            PiiType::Email => "email",
            PiiType::Other => "other",
        }
    }

    /// Replacement token. Contains no digits and no `@`, so no pattern can
    /// match it again.
    pub fn placeholder(&self) -> &'static str {
        match self {
            PiiType::IdentityNumber => "[IDENTITY_NUMBER]",
            PiiType::TaxId => "[TAX_ID]",
            PiiType::CardNumber => "[CARD_NUMBER]",
            PiiType::Phone => "[PHONE]",
            PiiType::Email => "[EMAIL]",
            PiiType::Other => "[OTHER_PII]",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "identity_number" | "dni" => Some(PiiType::IdentityNumber),
            "tax_id" | "cuit" => Some(PiiType::TaxId),
            "card_number" | "card" => Some(PiiType::CardNumber),
            "phone" => Some(PiiType::Phone),
            "email" => Some(PiiType::Email),
            "other" => Some(PiiType::Other),
            _ => None,
        }
    }
}

struct PiiPattern {
    kind: PiiType,
    regex: Regex,
}

fn pattern(kind: PiiType, source: &str) -> PiiPattern {
    PiiPattern {
        kind,
        regex: Regex::new(source).expect("valid regex"),
    }
}

static PATTERNS: Lazy<Vec<PiiPattern>> = Lazy::new(|| {
    vec![
        pattern(
            PiiType::Email,
            r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
        ),
        // 22-digit bank account numbers.
        pattern(PiiType::Other, r"\b\d{22}\b"),
        // Grouped cards use one separator throughout, so a card never spans
        // a phone and the number next to it.
        pattern(
            PiiType::CardNumber,
            r"\b(?:\d{4}(?: \d{4}){3}|\d{4}(?:-\d{4}){3}|\d{13,19})\b",
        ),
        pattern(PiiType::TaxId, r"\b\d{2}-?\d{8}-?\d\b"),
        // Grouped numbers, or ten bare digits (area code plus subscriber).
        pattern(
            PiiType::Phone,
            r"(?:\+\d{1,3}[ -]?)?(?:(?:\(\d{2,4}\)|\b\d{2,4})[ -]\d{3,4}[ -]\d{4}|\b\d{10})\b",
        ),
        pattern(PiiType::IdentityNumber, r"\b\d{7,8}\b"),
    ]
});

/// Pattern types in evaluation order.
pub fn evaluation_order() -> Vec<PiiType> {
    PATTERNS.iter().map(|p| p.kind).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiiScan {
    pub redacted: String,
    pub matches: BTreeMap<PiiType, usize>,
}

impl PiiScan {
    pub fn found(&self, kind: PiiType) -> bool {
        self.matches.get(&kind).copied().unwrap_or(0) > 0
    }

    pub fn distinct_types(&self) -> usize {
        self.matches.values().filter(|count| **count > 0).count()
    }
}

pub fn scan(text: &str) -> PiiScan {
    let mut working = text.to_string();
    let mut matches = BTreeMap::new();
    for pattern in PATTERNS.iter() {
        let count = pattern.regex.find_iter(&working).count();
        if count == 0 {
            continue;
        }
        matches.insert(pattern.kind, count);
        working = pattern
            .regex
            .replace_all(&working, pattern.kind.placeholder())
            .into_owned();
    }
    PiiScan {
        redacted: working,
        matches,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PiiClassification {
    pub has_pii: bool,
    pub by_type: BTreeMap<PiiType, bool>,
    pub sensitivity: PiiLevel,
}

/// One identifier type is `medium`; a card number or two distinct types is
/// `high`.
pub fn classify(text: &str) -> PiiClassification {
    let scan = scan(text);
    let by_type = PiiType::ALL
        .iter()
        .map(|kind| (*kind, scan.found(*kind)))
        .collect();
    let sensitivity = if scan.found(PiiType::CardNumber) || scan.distinct_types() >= 2 {
        PiiLevel::High
    } else if scan.distinct_types() == 1 {
        PiiLevel::Medium
    } else {
        PiiLevel::None
    };
    PiiClassification {
        has_pii: scan.distinct_types() > 0,
        by_type,
        sensitivity,
    }
}

pub fn redact(text: &str) -> String {
    scan(text).redacted
}
