//! G.711 μ-law Codec
//!
//! Telephony media streams carry 8 kHz μ-law (PCMU). Voice agents that want
//! linear PCM get it by expanding each byte to a signed 16-bit sample.

use bytes::{BufMut, Bytes, BytesMut};

/// G.711 μ-law (PCMU) Codec
pub struct PcmuCodec;

impl PcmuCodec {
    const BIAS: i32 = 0x84;
    const CLIP: i32 = 32635;

    /// RTP payload type
    pub const PAYLOAD_TYPE: u8 = 0;

    /// Always 8000 Hz for G.711
    pub const CLOCK_RATE: u32 = 8000;

    /// Compress one 16-bit sample
    pub fn encode_sample(sample: i16) -> u8 {
        let mut magnitude = sample as i32;
        let sign = if magnitude < 0 {
            magnitude = -magnitude;
            0x80
        } else {
            0x00
        };

        let biased = magnitude.min(Self::CLIP) + Self::BIAS;

        // biased >= 0x84, so the shifted value is at least 1
        let exponent = (31 - ((biased >> 7) as u32).leading_zeros()).min(7);
        let mantissa = (biased >> (exponent + 3)) & 0x0F;

        !(sign | ((exponent as u8) << 4) | mantissa as u8)
    }

    /// Expand one μ-law byte
    pub fn decode_sample(byte: u8) -> i16 {
        let ulaw = !byte;
        let exponent = (ulaw >> 4) & 0x07;
        let mantissa = (ulaw & 0x0F) as i32;

        let magnitude = (((mantissa << 3) + Self::BIAS) << exponent) - Self::BIAS;
        if ulaw & 0x80 != 0 {
            -magnitude as i16
        } else {
            magnitude as i16
        }
    }

    /// Encode PCM samples to μ-law
    pub fn encode(pcm: &[i16]) -> Bytes {
        pcm.iter().map(|&s| Self::encode_sample(s)).collect::<Vec<u8>>().into()
    }

    /// Decode μ-law to PCM samples
    pub fn decode(ulaw: &[u8]) -> Vec<i16> {
        ulaw.iter().map(|&b| Self::decode_sample(b)).collect()
    }

    /// μ-law bytes to 16-bit little-endian PCM bytes
    pub fn decode_to_le_bytes(ulaw: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(ulaw.len() * 2);
        for &byte in ulaw {
            out.put_i16_le(Self::decode_sample(byte));
        }
        out.freeze()
    }

    /// 16-bit little-endian PCM bytes to μ-law bytes.
    ///
    /// A trailing odd byte is dropped.
    pub fn encode_from_le_bytes(pcm: &[u8]) -> Bytes {
        pcm.chunks_exact(2)
            .map(|pair| Self::encode_sample(i16::from_le_bytes([pair[0], pair[1]])))
            .collect::<Vec<u8>>()
            .into()
    }
}
