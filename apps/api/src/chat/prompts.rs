use crate::llm_client::prompts::{truncate_chars, MAX_SOURCE_CHARS};
use crate::llm_client::{ChatMessage, Role};

/// Most recent history turns forwarded with a query.
pub const MAX_HISTORY_TURNS: usize = 10;

pub const MARKET_INTEL_SYSTEM: &str = "You are a recruiting market intelligence analyst. \
    You answer questions about hiring markets: compensation ranges, talent supply, \
    competitor hiring activity, skills in demand, and sourcing strategy. \
    Be concise and concrete. When figures are estimates, say so and give ranges. \
    If you do not know, say so instead of guessing. \
    Respond in plain text. Do NOT use markdown headings or code fences.";

/// Builds the conversation for a query: the tail of `history` followed by
/// the new user turn. The result always starts with a user turn.
pub fn build_conversation(history: &[ChatMessage], query: &str) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(MAX_HISTORY_TURNS);
    let mut messages: Vec<ChatMessage> = history[start..]
        .iter()
        .skip_while(|m| m.role != Role::User)
        .map(|m| ChatMessage {
            role: m.role,
            content: truncate_chars(&m.content, MAX_SOURCE_CHARS).to_string(),
        })
        .collect();

    messages.push(ChatMessage::user(truncate_chars(query.trim(), MAX_SOURCE_CHARS)));
    messages
}
