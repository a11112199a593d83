// Canvas workflow: upload or generate an image, then refine it with
// successive natural-language edits. Per-session state is in memory.

pub mod handlers;
pub mod images;
pub mod prompts;
pub mod session;
pub mod storage;
