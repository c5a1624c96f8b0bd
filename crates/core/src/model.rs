use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Coarse PII level produced by the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PiiLevel {
    #[default]
    None,
    Medium,
    High,
}

static LEVELS: [PiiLevel; 3] = [PiiLevel::None, PiiLevel::Medium, PiiLevel::High];

static BY_NAME: Lazy<HashMap<&'static str, PiiLevel>> =
    Lazy::new(|| LEVELS.iter().map(|level| (level.as_str(), *level)).collect());

impl PiiLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiLevel::None => "none",
            PiiLevel::Medium => "medium",
            PiiLevel::High => "high",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            PiiLevel::None => 0,
            PiiLevel::Medium => 1,
            PiiLevel::High => 2,
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        BY_NAME.get(value.trim().to_lowercase().as_str()).copied()
    }
}

impl fmt::Display for PiiLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sensitivity label attached to a chunk by the retrieval collaborator.
///
/// Labels are trusted as-is. Anything outside `none|medium|high` is kept
/// verbatim and ranks like `medium`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SensitivityLabel {
    Known(PiiLevel),
    Unrecognized(String),
}

impl SensitivityLabel {
    pub fn parse(value: &str) -> Self {
        match PiiLevel::from_label(value) {
            Some(level) => Self::Known(level),
            None => Self::Unrecognized(value.trim().to_string()),
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Known(level) => level.rank(),
            Self::Unrecognized(_) => PiiLevel::Medium.rank(),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(level) => level.as_str(),
            Self::Unrecognized(raw) => raw.as_str(),
        }
    }
}

impl From<PiiLevel> for SensitivityLabel {
    fn from(value: PiiLevel) -> Self {
        Self::Known(value)
    }
}

impl From<String> for SensitivityLabel {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<SensitivityLabel> for String {
    fn from(value: SensitivityLabel) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for SensitivityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub text: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pii_sensitivity: Option<SensitivityLabel>,
}

impl DocumentChunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source: source.into(),
            pii_sensitivity: None,
        }
    }

    pub fn with_sensitivity(mut self, label: impl Into<SensitivityLabel>) -> Self {
        self.pii_sensitivity = Some(label.into());
        self
    }
}

/// Chunks ordered by relevance, highest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub chunks: Vec<DocumentChunk>,
}

impl RetrievalResult {
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            chunks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer_text: String,
    pub used_chunk_ids: Vec<String>,
    pub citations: Vec<Citation>,
    pub max_pii_sensitivity: Option<SensitivityLabel>,
}

impl Answer {
    /// Answer without provenance: cache hits and the strict fallback.
    pub fn bare(answer_text: impl Into<String>) -> Self {
        Self {
            answer_text: answer_text.into(),
            used_chunk_ids: Vec::new(),
            citations: Vec::new(),
            max_pii_sensitivity: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DlpLevel {
    #[default]
    Standard,
    Privileged,
}

impl DlpLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DlpLevel::Standard => "standard",
            DlpLevel::Privileged => "privileged",
        }
    }
}

/// Validated caller identity supplied by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub allowed_subjects: Vec<String>,
    #[serde(default)]
    pub dlp_level: DlpLevel,
}

impl UserContext {
    /// Tenant scope for this request: always the first allowed subject.
    pub fn subject(&self) -> Option<&str> {
        self.allowed_subjects.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub query: String,
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_labels_rank_as_medium() {
        assert_eq!(SensitivityLabel::parse("none").rank(), 0);
        assert_eq!(SensitivityLabel::parse(" MEDIUM ").rank(), 1);
        assert_eq!(SensitivityLabel::parse("high").rank(), 2);
        let odd = SensitivityLabel::parse("confidential");
        assert_eq!(odd.rank(), 1);
        assert_eq!(odd.as_str(), "confidential");
    }

    #[test]
    fn chunk_label_deserializes_from_plain_string() {
        let chunk: DocumentChunk = serde_json::from_str(
            r#"{"id":"c1","text":"t","source":"s","pii_sensitivity":"high"}"#,
        )
        .unwrap();
        assert_eq!(
            chunk.pii_sensitivity,
            Some(SensitivityLabel::Known(PiiLevel::High))
        );
        let bare: DocumentChunk =
            serde_json::from_str(r#"{"id":"c2","text":"t","source":"s"}"#).unwrap();
        assert!(bare.pii_sensitivity.is_none());
    }

    #[test]
    fn subject_is_first_allowed() {
        let user = UserContext {
            user_id: "u".to_string(),
            allowed_subjects: vec!["A".to_string(), "B".to_string()],
            dlp_level: DlpLevel::Standard,
        };
        assert_eq!(user.subject(), Some("A"));
        let empty = UserContext {
            allowed_subjects: Vec::new(),
            ..user
        };
        assert_eq!(empty.subject(), None);
    }
}
