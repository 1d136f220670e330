//! Guarded conversation with the provider

mod history;
mod orchestrator;

pub use history::ConversationHistory;
pub use orchestrator::RequestOrchestrator;
