//! Audio codec adapter between the telephony and voice-agent transports
//!
//! Pure and stateless: a frame keeps its source and sequence number, only the
//! payload encoding changes.

use super::codec::PcmuCodec;
use crate::domain::event::{AudioEncoding, AudioFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioCodecAdapter {
    telephony: AudioEncoding,
    agent: AudioEncoding,
}

impl AudioCodecAdapter {
    /// Telephony audio is always μ-law; `agent` is what the voice agent expects
    pub fn new(agent: AudioEncoding) -> Self {
        Self {
            telephony: AudioEncoding::Mulaw,
            agent,
        }
    }

    pub fn agent_encoding(&self) -> AudioEncoding {
        self.agent
    }

    pub fn telephony_encoding(&self) -> AudioEncoding {
        self.telephony
    }

    /// Re-encode a caller frame for the voice agent
    pub fn to_agent(&self, frame: AudioFrame) -> AudioFrame {
        convert(frame, self.agent)
    }

    /// Re-encode an agent frame for the caller
    pub fn to_telephony(&self, frame: AudioFrame) -> AudioFrame {
        convert(frame, self.telephony)
    }
}

fn convert(frame: AudioFrame, target: AudioEncoding) -> AudioFrame {
    match (frame.encoding(), target) {
        (from, to) if from == to => frame,
        (AudioEncoding::Mulaw, AudioEncoding::Linear16) => {
            let payload = PcmuCodec::decode_to_le_bytes(frame.payload());
            frame.reencoded(AudioEncoding::Linear16, payload)
        }
        (AudioEncoding::Linear16, AudioEncoding::Mulaw) => {
            let payload = PcmuCodec::encode_from_le_bytes(frame.payload());
            frame.reencoded(AudioEncoding::Mulaw, payload)
        }
        _ => frame,
    }
}
