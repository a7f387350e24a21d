pub mod client;
pub mod prompts;
pub mod stream;
#[cfg(test)]
pub mod testing;
mod types;

pub use client::FridayAI;
pub use types::{ChatTurn, CompletionBackend, CompletionRequest, Role};
