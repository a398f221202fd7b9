// LLM prompt constants for the Outreach module.

use crate::llm_client::prompts::{fill_template, truncate_chars, MAX_SOURCE_CHARS};

/// System prompt for outreach generation.
pub const OUTREACH_SYSTEM: &str = "You are an experienced technical recruiter. \
    You write short, specific, respectful outreach messages to candidates. \
    Reference concrete details from the candidate's background. \
    Never invent facts that are not in the provided profile. \
    Respond in plain text. Do NOT use markdown headings or code fences. \
    Do NOT include explanations of what you are doing or apologies.";

/// Outreach prompt template.
/// Replace: {source_kind}, {sender_context}, {profile}
pub const OUTREACH_PROMPT_TEMPLATE: &str = r#"Write a recruiting outreach message for the candidate described below.

The profile was provided as {source_kind}.

ABOUT THE SENDER / ROLE:
{sender_context}

Guidelines:
- 80 to 150 words.
- Open with one specific detail from the candidate's background.
- Explain briefly why the role could be a fit.
- End with a low-pressure call to action.
- Include a subject line on the first line, prefixed with "Subject: ".

CANDIDATE PROFILE:
{profile}"#;

const DEFAULT_SENDER_CONTEXT: &str =
    "Not provided. Keep the role description generic and focus on the candidate.";

/// Where the candidate profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Text,
    Pdf,
    Url,
}

impl SourceKind {
    fn describe(self) -> &'static str {
        match self {
            SourceKind::Text => "pasted text",
            SourceKind::Pdf => "text extracted from a PDF resume",
            SourceKind::Url => "text scraped from a web page",
        }
    }
}

/// Builds the outreach prompt, truncating the profile to the model budget.
pub fn build_outreach_prompt(
    kind: SourceKind,
    profile: &str,
    sender_context: Option<&str>,
) -> String {
    let sender_context = sender_context
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SENDER_CONTEXT);

    fill_template(
        OUTREACH_PROMPT_TEMPLATE,
        &[
            ("source_kind", kind.describe()),
            ("sender_context", truncate_chars(sender_context, 2_000)),
            ("profile", truncate_chars(profile.trim(), MAX_SOURCE_CHARS)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_includes_profile_and_source_kind() {
        let prompt = build_outreach_prompt(
            SourceKind::Pdf,
            "Staff engineer, 8 years of Rust",
            Some("Series A infra startup hiring a platform lead"),
        );

        assert!(prompt.contains("text extracted from a PDF resume"));
        assert!(prompt.contains("Staff engineer, 8 years of Rust"));
        assert!(prompt.contains("Series A infra startup"));
        assert!(!prompt.contains("{profile}"));
    }

    #[test]
    fn test_blank_sender_context_uses_default() {
        let prompt = build_outreach_prompt(SourceKind::Text, "profile", Some("   "));
        assert!(prompt.contains(DEFAULT_SENDER_CONTEXT));
    }

    #[test]
    fn test_profile_is_truncated() {
        let long = "a".repeat(MAX_SOURCE_CHARS + 500);
        let prompt = build_outreach_prompt(SourceKind::Url, &long, None);
        assert!(!prompt.contains(&"a".repeat(MAX_SOURCE_CHARS + 1)));
        assert!(prompt.contains(&"a".repeat(MAX_SOURCE_CHARS)));
    }
}
