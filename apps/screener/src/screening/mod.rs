pub mod guard;
pub mod handlers;
pub mod loader;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod scheduler;
pub mod scoring;

#[cfg(test)]
mod test_support;
