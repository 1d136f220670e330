//! deskbot core
//!
//! Guarded LLM access for a school device-management help desk:
//! - `vault`: API key encrypted at rest, with session/temporary/pinned lifetimes
//! - `rate`: sliding-window call budget shared by every instance on a store
//! - `guard`: prompt-injection analysis and sanitization
//! - `chat`: the request orchestrator and rolling history
//! - `desk`: the facade the chat surface calls

pub mod ai;
pub mod chat;
pub mod config;
pub mod constants;
pub mod desk;
pub mod error;
pub mod guard;
pub mod paths;
pub mod rate;
pub mod search;
pub mod storage;
pub mod vault;

pub use config::DeskConfig;
pub use desk::{DeskStores, HelpDesk};
pub use error::{DeskError, ErrorKind};
