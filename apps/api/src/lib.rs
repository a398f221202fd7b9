pub mod admission;
pub mod chat;
pub mod clock;
pub mod config;
pub mod errors;
pub mod llm_client;
pub mod outreach;
pub mod rate_limit;
pub mod request_lock;
pub mod routes;
pub mod state;
pub mod store;
pub mod verification;
