//! Provider layer
//!
//! Builds Gemini-style `generateContent` requests and sends them over a
//! pluggable [`Transport`].

mod payload;
mod transport;
mod types;

pub use payload::{build_request, endpoint, error_message, extract_text, verification_request};
pub use transport::{ProviderRequest, ProviderResponse, ReqwestTransport, Transport, TransportError};
pub use types::{Role, Turn};
