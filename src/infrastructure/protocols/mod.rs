//! Wire protocol codecs
//!
//! Each external transport speaks its own envelope format. Decoders turn raw
//! [`WireMessage`]s into [`RelayUnit`]s once, at the boundary; encoders do the
//! reverse for the destination side.

pub mod agent;
pub mod settings;
pub mod telephony;

pub use agent::{AgentDecoder, AgentEncoder};
pub use settings::AgentSettings;
pub use telephony::{TelephonyDecoder, TelephonyEncoder};

use crate::domain::event::RelayUnit;
use crate::domain::shared::Result;
use crate::infrastructure::transport::WireMessage;

/// Decodes raw messages arriving from one transport.
///
/// `Ok(None)` means the message was recognised but carries nothing to relay.
/// An `Err` is a [`ProtocolDecode`](crate::domain::shared::BridgeError::ProtocolDecode)
/// failure and ends the session.
pub trait InboundDecoder: Send {
    fn decode(&mut self, message: WireMessage) -> Result<Option<RelayUnit>>;
}

/// Encodes relay units for one transport.
///
/// Returns `None` for units that have no envelope on this side.
pub trait OutboundEncoder: Send + Sync {
    fn encode(&self, unit: &RelayUnit) -> Option<WireMessage>;
}
