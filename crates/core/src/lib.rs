mod dlp;
mod embedding;
mod error;
mod eval;
mod model;
mod pii;
mod prompt;
mod tokens;

pub use dlp::enforce_dlp;
pub use embedding::{cosine_similarity, HashEmbedder, HashEmbedderConfig};
pub use error::{CoreError, Result};
pub use eval::{evaluate_redaction, load_pii_corpus, LeakStats, PiiEvaluation, PiiSample};
pub use model::{
    Answer, Citation, ConversationTurn, DlpLevel, DocumentChunk, PiiLevel, RetrievalResult,
    SensitivityLabel, UserContext,
};
pub use pii::{classify, evaluation_order, redact, scan, PiiClassification, PiiScan, PiiType};
pub use prompt::{
    history_block, merge_history, truncate_chars, PromptBuilder, DEFAULT_PROMPT_BUDGET_CHARS,
    PROMPT_HEADER, SAFETY_MARGIN_CHARS,
};
pub use tokens::{BpeEstimator, CharHeuristic, TokenEstimator, TokenizerKind, CHARS_PER_TOKEN};
