//! Media processing implementations

pub mod adapter;
pub mod codec;

pub use adapter::AudioCodecAdapter;
pub use codec::PcmuCodec;
