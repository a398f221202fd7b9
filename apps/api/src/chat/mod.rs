// Market intelligence chat: free-text hiring-market questions answered by the LLM.

pub mod handlers;
pub mod prompts;
