//! Transaction output references.

use basaltd_consensus::Hash256;

use crate::encoding::{DecodeError, Decoder, Encoder};

/// Reference to a single transaction output.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u32) -> Self {
        Self { txid, vout }
    }

    /// The prevout used by coinbase inputs.
    pub fn null() -> Self {
        Self {
            txid: [0u8; 32],
            vout: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.vout == u32::MAX && self.txid == [0u8; 32]
    }

    pub fn encode_to(&self, encoder: &mut Encoder) {
        encoder.write_hash(&self.txid);
        encoder.write_u32_le(self.vout);
    }

    pub fn decode_from(decoder: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        let txid = decoder.read_hash()?;
        let vout = decoder.read_u32_le()?;
        Ok(Self { txid, vout })
    }
}
