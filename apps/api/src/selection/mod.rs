// Category selection: matches free-text post content to one of the design
// categories inferred for a handle. Pure functions; the only I/O is in handlers.

pub mod handlers;
pub mod indicators;
pub mod keywords;
pub mod models;
pub mod scoring;
pub mod selector;
