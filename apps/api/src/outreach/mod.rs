// Outreach generation: turns a candidate profile (pasted text, PDF resume, or
// a profile URL) into a recruiting outreach message.
// All LLM calls go through llm_client.

pub mod extract;
pub mod handlers;
pub mod prompts;
