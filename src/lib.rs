//! VoiceBridge - bridges phone calls to a conversational voice agent
//!
//! A Domain-Driven Design implementation of a real-time call bridge: the
//! telephony media stream and the voice-agent connection are relayed in both
//! directions, and function calls issued by the agent are dispatched to
//! typed domain handlers.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::{BridgeError, DispatchError};
pub use domain::shared::result::Result;
