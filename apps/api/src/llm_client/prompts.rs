// Shared prompt fragments and prompt-building utilities.
// Each feature module keeps its own prompts.rs alongside its handlers.

/// Upper bound on source text forwarded to the model, in characters.
pub const MAX_SOURCE_CHARS: usize = 12_000;

/// Truncates `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Fills `{key}` placeholders in a template.
pub fn fill_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}
