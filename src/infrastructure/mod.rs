//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Transports (telephony WebSocket, voice-agent client, in-process pair)
//! - Wire protocol codecs for both transports
//! - Audio transcoding between the two sides
//! - Metrics recording

pub mod media;
pub mod metrics;
pub mod protocols;
pub mod transport;
