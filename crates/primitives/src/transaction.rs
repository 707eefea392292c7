//! Transaction types and consensus serialization.

use basaltd_consensus::Hash256;

use crate::encoding::{var_int_size, DecodeError, Decoder, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    fn encode_to(&self, encoder: &mut Encoder) {
        self.prevout.encode_to(encoder);
        encoder.write_var_bytes(&self.script_sig);
        encoder.write_u32_le(self.sequence);
    }

    fn decode_from(decoder: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        let prevout = OutPoint::decode_from(decoder)?;
        let script_sig = decoder.read_var_bytes()?;
        let sequence = decoder.read_u32_le()?;
        Ok(Self {
            prevout,
            script_sig,
            sequence,
        })
    }

    fn serialized_size(&self) -> usize {
        36 + var_int_size(self.script_sig.len() as u64) + self.script_sig.len() + 4
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    fn encode_to(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
    }

    fn decode_from(decoder: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        let value = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }

    fn serialized_size(&self) -> usize {
        8 + var_int_size(self.script_pubkey.len() as u64) + self.script_pubkey.len()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    pub version: i32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(self.serialized_size());
        self.encode_to(&mut encoder);
        encoder.into_inner()
    }

    pub fn encode_to(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_var_int(self.vin.len() as u64);
        for input in &self.vin {
            input.encode_to(encoder);
        }
        encoder.write_var_int(self.vout.len() as u64);
        for output in &self.vout {
            output.encode_to(encoder);
        }
        encoder.write_u32_le(self.lock_time);
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let tx = Self::decode_from(&mut decoder)?;
        decoder.finish()?;
        Ok(tx)
    }

    pub fn decode_from(decoder: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        let version = decoder.read_i32_le()?;
        let vin_count = decoder.read_var_int()?;
        let mut vin = Vec::with_capacity(vin_count.min(1024) as usize);
        for _ in 0..vin_count {
            vin.push(TxIn::decode_from(decoder)?);
        }
        let vout_count = decoder.read_var_int()?;
        let mut vout = Vec::with_capacity(vout_count.min(1024) as usize);
        for _ in 0..vout_count {
            vout.push(TxOut::decode_from(decoder)?);
        }
        let lock_time = decoder.read_u32_le()?;
        Ok(Self {
            version,
            vin,
            vout,
            lock_time,
        })
    }

    pub fn txid(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    pub fn serialized_size(&self) -> usize {
        let mut size = 4 + 4;
        size += var_int_size(self.vin.len() as u64);
        for input in &self.vin {
            size += input.serialized_size();
        }
        size += var_int_size(self.vout.len() as u64);
        for output in &self.vout {
            size += output.serialized_size();
        }
        size
    }

    pub fn value_out(&self) -> Option<i64> {
        let mut total = 0i64;
        for output in &self.vout {
            total = total.checked_add(output.value)?;
        }
        Some(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint::new([7u8; 32], 3),
                script_sig: vec![0x51],
                sequence: 0xffff_ffff,
            }],
            vout: vec![
                TxOut {
                    value: 5_000,
                    script_pubkey: vec![0x76, 0xa9],
                },
                TxOut {
                    value: 1_234,
                    script_pubkey: Vec::new(),
                },
            ],
            lock_time: 0,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let tx = sample_tx();
        let bytes = tx.consensus_encode();
        assert_eq!(bytes.len(), tx.serialized_size());
        let decoded = Transaction::consensus_decode(&bytes).expect("decode");
        assert_eq!(decoded, tx);
        assert_eq!(decoded.txid(), tx.txid());
    }

    #[test]
    fn coinbase_detection() {
        let mut tx = sample_tx();
        assert!(!tx.is_coinbase());
        tx.vin[0].prevout = OutPoint::null();
        assert!(tx.is_coinbase());
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = sample_tx().consensus_encode();
        bytes.push(0x00);
        assert_eq!(
            Transaction::consensus_decode(&bytes),
            Err(DecodeError::TrailingBytes)
        );
    }
}
