pub mod engine;
pub mod prompts;
pub mod rollback;
pub mod tools;

pub use engine::{ChatReply, ChatRequest, ConversationEngine, EngineLimits};
