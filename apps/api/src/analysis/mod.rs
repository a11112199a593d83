// Handle analysis: scrape a handle's recent posts, infer design categories
// with a multimodal LLM, and persist the results per handle.
// All LLM calls go through llm_client.

pub mod analyzer;
pub mod handlers;
pub mod models;
pub mod prompts;
pub mod scraper;
pub mod store;
