//! Audio Codec Implementations

pub mod g711;

pub use g711::PcmuCodec;
