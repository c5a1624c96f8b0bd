use crate::model::ConversationTurn;

/// Emitted ahead of any caller-controlled text.
pub const PROMPT_HEADER: &str =
    "You are an internal knowledge assistant. Use ONLY the provided context to answer.\n\n";
pub const SAFETY_MARGIN_CHARS: usize = 64;
pub const DEFAULT_PROMPT_BUDGET_CHARS: usize = 4000;

const HISTORY_TITLE: &str = "Previous context (most recent first):";

#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    budget_chars: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_BUDGET_CHARS)
    }
}

impl PromptBuilder {
    pub fn new(budget_chars: usize) -> Self {
        Self { budget_chars }
    }

    pub fn budget_chars(&self) -> usize {
        self.budget_chars
    }

    /// Greedy packing in relevance order. Stops at the first chunk that would
    /// overflow the budget; chunks are never reordered or cut.
    ///
    /// `history` is oldest first, as returned by conversation memory.
    pub fn build<S: AsRef<str>>(
        &self,
        query: &str,
        chunk_texts: &[S],
        history: &[ConversationTurn],
    ) -> String {
        let hist = history_block(history);
        let fixed =
            char_len(PROMPT_HEADER) + char_len(&hist) + char_len(query) + SAFETY_MARGIN_CHARS;
        let mut bullets = Vec::new();
        let mut used = 0usize;
        for text in chunk_texts {
            let bullet = format!("- {}", text.as_ref());
            let len = char_len(&bullet);
            if used + len + fixed > self.budget_chars {
                break;
            }
            used += len;
            bullets.push(bullet);
        }
        let mut prompt = String::with_capacity(PROMPT_HEADER.len() + hist.len() + used + query.len());
        prompt.push_str(PROMPT_HEADER);
        prompt.push_str(&hist);
        prompt.push_str(&bullets.join("\n\n"));
        prompt.push_str("\n\nQuestion: ");
        prompt.push_str(query);
        prompt.push_str("\nAnswer in concise professional language.");
        prompt
    }
}

/// `Q/A` bullet pairs, most recent first. Empty when there is no history.
pub fn history_block(history: &[ConversationTurn]) -> String {
    if history.is_empty() {
        return String::new();
    }
    format!("{HISTORY_TITLE}\n{}\n\n", history_bullets(history))
}

/// Folds prior turns into the query text ahead of the current question.
pub fn merge_history(query: &str, history: &[ConversationTurn]) -> String {
    if history.is_empty() {
        return query.to_string();
    }
    format!(
        "{HISTORY_TITLE}\n{}\n\nCurrent question: {query}",
        history_bullets(history)
    )
}

fn history_bullets(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .rev()
        .map(|turn| format!("- Q: {}\n- A: {}", turn.query, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keeps the first `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
