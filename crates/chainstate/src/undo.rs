//! Per-block undo data: the coins consumed by a block, in spend order,
//! so a disconnect can restore them exactly.

use basaltd_primitives::encoding::{DecodeError, Decoder, Encoder};
use basaltd_primitives::outpoint::OutPoint;

use crate::coins::Coin;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SpentCoin {
    pub outpoint: OutPoint,
    pub coin: Coin,
}

/// Every coin a connected block spent, ordered as the block spent them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockUndo {
    pub spent: Vec<SpentCoin>,
}

impl BlockUndo {
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_var_int(self.spent.len() as u64);
        for entry in &self.spent {
            entry.outpoint.encode_to(&mut encoder);
            encoder.write_i64_le(entry.coin.value);
            encoder.write_var_bytes(&entry.coin.script_pubkey);
            encoder.write_u32_le(entry.coin.height);
            encoder.write_u8(if entry.coin.is_coinbase { 1 } else { 0 });
        }
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let count = decoder.read_var_int()?;
        let mut spent = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let outpoint = OutPoint::decode_from(&mut decoder)?;
            let value = decoder.read_i64_le()?;
            let script_pubkey = decoder.read_var_bytes()?;
            let height = decoder.read_u32_le()?;
            let is_coinbase = decoder.read_u8()? != 0;
            spent.push(SpentCoin {
                outpoint,
                coin: Coin {
                    value,
                    script_pubkey,
                    height,
                    is_coinbase,
                },
            });
        }
        decoder.finish()?;
        Ok(Self { spent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_codec_round_trip() {
        let undo = BlockUndo {
            spent: vec![
                SpentCoin {
                    outpoint: OutPoint::new([1u8; 32], 0),
                    coin: Coin {
                        value: 5_000_000_000,
                        script_pubkey: vec![0x76, 0xa9, 0x14],
                        height: 10,
                        is_coinbase: true,
                    },
                },
                SpentCoin {
                    outpoint: OutPoint::new([2u8; 32], 7),
                    coin: Coin {
                        value: 1,
                        script_pubkey: Vec::new(),
                        height: 11,
                        is_coinbase: false,
                    },
                },
            ],
        };
        let decoded = BlockUndo::decode(&undo.encode()).expect("decode");
        assert_eq!(decoded, undo);
    }

    #[test]
    fn empty_undo_round_trip() {
        let undo = BlockUndo::default();
        assert_eq!(BlockUndo::decode(&undo.encode()).expect("decode"), undo);
    }
}
